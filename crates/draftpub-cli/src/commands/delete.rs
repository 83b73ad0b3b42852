use std::collections::BTreeSet;

use clap::{Arg, ArgMatches, Command};
use draftpub::{AllowAll, NestedItem, RecordKey};

use crate::commands::CommandResult;
use crate::commands::publish::{dry_run_arg, ids};
use crate::commands::records::required;
use crate::context::CliSession;
use crate::error::CliError;
use crate::util;

pub fn delete_command() -> Command {
    Command::new("delete")
        .about("Delete drafts; published ones are marked and removed on the next publish")
        .arg(Arg::new("model").required(true).value_name("MODEL"))
        .arg(Arg::new("ids").required(true).value_name("ID").num_args(1..))
        .arg(dry_run_arg())
}

pub fn undelete_command() -> Command {
    Command::new("undelete")
        .about("Clear pending deletions")
        .arg(Arg::new("model").required(true).value_name("MODEL"))
        .arg(Arg::new("ids").required(true).value_name("ID").num_args(1..))
        .arg(dry_run_arg())
}

pub fn run_delete(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let model = required(matches, "model")?;
    let dry_run = matches.get_flag("dry-run");
    let records = util::load_records(session, model, &ids(matches, "ids")?)?;

    let mut marked = Vec::new();
    let mut removed = Vec::new();
    for record in &records {
        let Some(key) = record.key() else { continue };
        if session.env.publisher.public_of(record)?.is_some() {
            marked.push(key);
        } else {
            removed.push(key);
        }
    }

    draftpub::delete_selected(&session.env.publisher, &records, &AllowAll, !dry_run)?;
    if !dry_run {
        session.persist()?;
    }
    Ok(CommandResult::Deleted {
        dry_run,
        marked,
        removed,
    })
}

pub fn run_undelete(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let model = required(matches, "model")?;
    let dry_run = matches.get_flag("dry-run");
    let records = util::load_records(session, model, &ids(matches, "ids")?)?;

    let outcome =
        draftpub::undelete_selected(&session.env.publisher, &records, &AllowAll, !dry_run)?;
    let mut restored = BTreeSet::new();
    collect_keys(&outcome.report().nested, &mut restored);
    let skipped = records
        .iter()
        .filter_map(|record| record.key())
        .filter(|key| !restored.contains(key))
        .collect();
    if !dry_run {
        session.persist()?;
    }
    Ok(CommandResult::Undeleted {
        dry_run,
        restored: restored.into_iter().collect(),
        skipped,
    })
}

fn collect_keys(items: &[NestedItem<RecordKey>], keys: &mut BTreeSet<RecordKey>) {
    for item in items {
        match item {
            NestedItem::Item(key) => {
                keys.insert(key.clone());
            }
            NestedItem::Children(children) => collect_keys(children, keys),
        }
    }
}
