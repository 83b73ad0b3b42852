use clap::{ArgMatches, Command};
use draftpub::{RecordStore, Selection};
use serde::Serialize;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::CliError;

#[derive(Clone, Debug, Serialize)]
pub struct ModelStatus {
    pub model: String,
    pub publishable: bool,
    pub drafts: usize,
    pub published: usize,
    pub changed: usize,
    pub deleted: usize,
}

pub fn command() -> Command {
    Command::new("status").about("Summarize draft and public records per model")
}

pub fn run(session: &CliSession, _matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let env = &session.env;
    let mut models = Vec::new();
    for model in env.registry.models() {
        let count = |selection: Selection| -> Result<usize, CliError> {
            Ok(env.store.select(model, selection)?.len())
        };
        models.push(ModelStatus {
            model: model.to_string(),
            publishable: env.registry.policy(model)?.is_publishable(),
            drafts: count(Selection::DraftAndDeleted)?,
            published: count(Selection::Published)?,
            changed: count(Selection::Changed)?,
            deleted: count(Selection::Deleted)?,
        });
    }

    Ok(CommandResult::Status {
        root: env.paths.root().display().to_string(),
        models,
    })
}
