use draftpub::{PublishReport, Record, RecordKey};
use serde::Serialize;

use crate::error::ExitStatus;

pub mod delete;
pub mod init;
pub mod publish;
pub mod records;
pub mod status;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    WorkspaceInitialized {
        root: String,
        dot_dir: String,
        created: bool,
        dry_run: bool,
    },
    Status {
        root: String,
        models: Vec<status::ModelStatus>,
    },
    RecordList {
        model: String,
        selection: String,
        records: Vec<records::RecordRow>,
    },
    RecordSaved {
        created: bool,
        record: records::RecordRow,
    },
    Published {
        report: PublishReport,
    },
    Unpublished {
        record: RecordKey,
        public: Option<Record>,
        dry_run: bool,
    },
    Deleted {
        dry_run: bool,
        marked: Vec<RecordKey>,
        removed: Vec<RecordKey>,
    },
    Undeleted {
        dry_run: bool,
        restored: Vec<RecordKey>,
        skipped: Vec<RecordKey>,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            // A dry-run unpublish of a record with nothing public reports a data error.
            CommandResult::Unpublished { public: None, .. } => ExitStatus::Data,
            _ => ExitStatus::Ok,
        }
    }
}
