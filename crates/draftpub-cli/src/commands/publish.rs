use clap::{Arg, ArgAction, ArgMatches, Command};
use draftpub::{
    AllowAll, PublishOptions, PublishState, Record, RecordId, RecordKey, RecordStore, Selection,
};

use crate::commands::CommandResult;
use crate::commands::records::required;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util::{self, parse_id};

pub fn publish_command() -> Command {
    Command::new("publish")
        .about("Publish drafts and everything they depend on")
        .arg(Arg::new("model").required(true).value_name("MODEL"))
        .arg(
            Arg::new("ids")
                .value_name("ID")
                .num_args(0..)
                .help("Drafts to publish."),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .action(ArgAction::SetTrue)
                .conflicts_with("ids")
                .help("Publish every changed or deleted draft of the model."),
        )
        .arg(dry_run_arg())
}

pub fn unpublish_command() -> Command {
    Command::new("unpublish")
        .about("Remove the public counterpart of a draft")
        .arg(Arg::new("model").required(true).value_name("MODEL"))
        .arg(Arg::new("id").required(true).value_name("ID"))
        .arg(dry_run_arg())
}

pub(crate) fn dry_run_arg() -> Arg {
    Arg::new("dry-run")
        .long("dry-run")
        .action(ArgAction::SetTrue)
        .help("Report what would change without writing.")
}

pub fn run_publish(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let model = required(matches, "model")?;
    let dry_run = matches.get_flag("dry-run");
    let records = if matches.get_flag("all") {
        pending_drafts(session, model)?
    } else {
        let ids = ids(matches, "ids")?;
        if ids.is_empty() {
            return Err(CliError::new(
                "publish needs at least one ID or --all",
                ExitStatus::Usage,
            ));
        }
        util::load_records(session, model, &ids)?
    };

    let outcome =
        draftpub::publish_selected(&session.env.publisher, &records, &AllowAll, !dry_run)?;
    if !dry_run {
        session.persist()?;
    }
    Ok(CommandResult::Published {
        report: outcome.report().clone(),
    })
}

pub fn run_unpublish(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let model = required(matches, "model")?;
    let dry_run = matches.get_flag("dry-run");
    let id = parse_id(required(matches, "id")?)?;
    let draft = util::load_record(session, model, id)?;

    let public = session
        .env
        .publisher
        .unpublish(&draft, PublishOptions { dry_run })?;
    if !dry_run {
        session.persist()?;
    }
    Ok(CommandResult::Unpublished {
        record: RecordKey::new(model, id),
        public,
        dry_run,
    })
}

/// Drafts of `model` with edits or a deletion waiting to be published.
fn pending_drafts(session: &CliSession, model: &str) -> Result<Vec<Record>, CliError> {
    session.env.registry.policy(model)?;
    Ok(session
        .env
        .store
        .select(model, Selection::DraftAndDeleted)?
        .into_iter()
        .filter(|record| record.publish_state != PublishState::Default)
        .collect())
}

pub(crate) fn ids(matches: &ArgMatches, name: &str) -> Result<Vec<RecordId>, CliError> {
    matches
        .get_many::<String>(name)
        .into_iter()
        .flatten()
        .map(|raw| parse_id(raw))
        .collect()
}
