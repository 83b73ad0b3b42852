//! Permission-gated batch operations for administrative front ends.
//!
//! Every action takes a `confirmed` flag. Unconfirmed calls only compute the report of
//! what would be touched; confirmed calls perform the operation in one transaction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deletion::DeleteOutcome;
use crate::error::PublishError;
use crate::publish::{PublishOptions, PublishReport, Publisher, describe};
use crate::record::{PublishState, Record, RecordKey};
use crate::store::RecordStore;
use crate::visited::VisitedSet;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Publish or unpublish records of a model.
    Publish,
    /// Delete or undelete drafts of a model.
    Delete,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Publish => "publish",
            Permission::Delete => "delete",
        }
    }
}

pub trait PermissionChecker {
    fn has_permission(&self, permission: Permission, model: &str) -> bool;
}

impl<F> PermissionChecker for F
where
    F: Fn(Permission, &str) -> bool,
{
    fn has_permission(&self, permission: Permission, model: &str) -> bool {
        self(permission, model)
    }
}

/// Grants everything; used by the command-line tool, which runs as the workspace owner.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_permission(&self, _permission: Permission, _model: &str) -> bool {
        true
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "report", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Nothing was written; the report lists what a confirmed call would touch.
    Confirm(PublishReport),
    Done(PublishReport),
}

impl ActionOutcome {
    pub fn report(&self) -> &PublishReport {
        match self {
            ActionOutcome::Confirm(report) | ActionOutcome::Done(report) => report,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, ActionOutcome::Done(_))
    }
}

fn require<'a>(
    checker: &dyn PermissionChecker,
    permission: Permission,
    models: impl IntoIterator<Item = &'a str>,
) -> Result<(), PublishError> {
    for model in models {
        if !checker.has_permission(permission, model) {
            return Err(PublishError::PermissionDenied(format!(
                "{} permission required on {model}",
                permission.as_str()
            )));
        }
    }
    Ok(())
}

fn flat_report<'a>(dry_run: bool, keys: impl IntoIterator<Item = &'a RecordKey>) -> PublishReport {
    let mut visited = VisitedSet::new();
    for key in keys {
        visited.add(key.clone(), None);
    }
    PublishReport::from_visited(dry_run, &visited)
}

fn keys_of(records: &[Record]) -> Result<Vec<RecordKey>, PublishError> {
    records
        .iter()
        .map(|record| {
            record.key().ok_or_else(|| {
                PublishError::PublishPrecondition(format!("unsaved {} draft", record.model))
            })
        })
        .collect()
}

/// Publishes the selected drafts. A dry run first collects every record the publish
/// would touch; publish permission is required on each of their models.
pub fn publish_selected<S: RecordStore>(
    publisher: &Publisher<S>,
    records: &[Record],
    checker: &dyn PermissionChecker,
    confirmed: bool,
) -> Result<ActionOutcome, PublishError> {
    let mut visited = VisitedSet::new();
    let preview = publisher.publish_all(records, PublishOptions::dry_run(), Some(&mut visited))?;

    let models: BTreeSet<&str> = visited
        .iter()
        .map(|key| key.model.as_str())
        .chain(records.iter().map(|record| record.model.as_str()))
        .collect();
    require(checker, Permission::Publish, models)?;

    if !confirmed {
        return Ok(ActionOutcome::Confirm(preview));
    }
    let report = publisher.publish_all(records, PublishOptions::default(), None)?;
    info!(visited = report.visited, "publish_selected");
    Ok(ActionOutcome::Done(report))
}

/// Unpublishes the selected drafts that have a public counterpart; the others are skipped.
pub fn unpublish_selected<S: RecordStore>(
    publisher: &Publisher<S>,
    records: &[Record],
    checker: &dyn PermissionChecker,
    confirmed: bool,
) -> Result<ActionOutcome, PublishError> {
    require(
        checker,
        Permission::Publish,
        records.iter().map(|record| record.model.as_str()),
    )?;

    let mut targets = Vec::new();
    for record in records {
        if publisher
            .unpublish(record, PublishOptions::dry_run())?
            .is_some()
        {
            targets.push(record.clone());
        }
    }
    let keys = keys_of(&targets)?;

    if !confirmed {
        return Ok(ActionOutcome::Confirm(flat_report(true, &keys)));
    }
    publisher.transaction(false, || {
        for record in &targets {
            publisher.unpublish(record, PublishOptions::default())?;
        }
        Ok(())
    })?;
    info!(records = keys.len(), "unpublish_selected");
    Ok(ActionOutcome::Done(flat_report(false, &keys)))
}

/// Deletes the selected drafts. Public records cannot be selected.
pub fn delete_selected<S: RecordStore>(
    publisher: &Publisher<S>,
    records: &[Record],
    checker: &dyn PermissionChecker,
    confirmed: bool,
) -> Result<ActionOutcome, PublishError> {
    if let Some(public) = records.iter().find(|record| record.is_public) {
        return Err(PublishError::PermissionDenied(format!(
            "{} is a public record and cannot be deleted",
            describe(public)
        )));
    }
    require(
        checker,
        Permission::Delete,
        records.iter().map(|record| record.model.as_str()),
    )?;
    let keys = keys_of(records)?;

    if !confirmed {
        return Ok(ActionOutcome::Confirm(flat_report(true, &keys)));
    }
    publisher.transaction(false, || {
        for record in records {
            // Already removed together with an earlier selected parent.
            if publisher.reload(record)?.is_none() {
                continue;
            }
            if let DeleteOutcome::Removed { key } = publisher.delete(record)? {
                debug!(record = %key, "removed unpublished draft");
            }
        }
        Ok(())
    })?;
    info!(records = keys.len(), "delete_selected");
    Ok(ActionOutcome::Done(flat_report(false, &keys)))
}

/// Clears pending deletions on the selected drafts. The report lists the drafts whose
/// marker is (or would be) cleared.
pub fn undelete_selected<S: RecordStore>(
    publisher: &Publisher<S>,
    records: &[Record],
    checker: &dyn PermissionChecker,
    confirmed: bool,
) -> Result<ActionOutcome, PublishError> {
    require(
        checker,
        Permission::Delete,
        records.iter().map(|record| record.model.as_str()),
    )?;

    let mut pending = Vec::new();
    for record in records {
        let stored = publisher.reload(record)?;
        if let Some(stored) = stored.filter(|stored| stored.publish_state == PublishState::Delete)
        {
            pending.push(stored);
        }
    }
    let keys = keys_of(&pending)?;

    if !confirmed {
        return Ok(ActionOutcome::Confirm(flat_report(true, &keys)));
    }
    publisher.transaction(false, || {
        for record in &pending {
            publisher.undelete(record)?;
        }
        Ok(())
    })?;
    info!(records = keys.len(), "undelete_selected");
    Ok(ActionOutcome::Done(flat_report(false, &keys)))
}
