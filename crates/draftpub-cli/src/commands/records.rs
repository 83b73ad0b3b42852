use clap::{Arg, ArgAction, ArgMatches, Command};
use draftpub::{FieldValue, PublishError, PublishStatus, Record, RecordStore, Selection};
use serde::Serialize;

use crate::commands::CommandResult;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::util::{self, parse_assignment, parse_id, parse_references};

/// A stored record plus its display status (drafts only).
#[derive(Clone, Debug, Serialize)]
pub struct RecordRow {
    #[serde(flatten)]
    pub record: Record,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PublishStatus>,
}

impl From<Record> for RecordRow {
    fn from(record: Record) -> Self {
        let status = (!record.is_public).then(|| record.status());
        Self { record, status }
    }
}

pub fn list_command() -> Command {
    Command::new("list")
        .about("List the records of a model")
        .arg(Arg::new("model").required(true).value_name("MODEL"))
        .arg(
            Arg::new("selection")
                .long("selection")
                .value_name("SELECTION")
                .default_value("all")
                .help("all, draft, published, deleted, changed or draft-and-deleted"),
        )
}

pub fn save_command() -> Command {
    Command::new("save")
        .about("Create or edit a draft record")
        .arg(Arg::new("model").required(true).value_name("MODEL"))
        .arg(
            Arg::new("id")
                .long("id")
                .value_name("ID")
                .help("Edit an existing draft instead of creating one."),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("NAME=TEXT")
                .action(ArgAction::Append)
                .help("Set a text field."),
        )
        .arg(
            Arg::new("ref")
                .long("ref")
                .value_name("NAME=ID")
                .action(ArgAction::Append)
                .help("Point a single-valued relation at a record."),
        )
        .arg(
            Arg::new("refs")
                .long("refs")
                .value_name("NAME=ID,ID")
                .action(ArgAction::Append)
                .help("Set the members of a many-valued relation, in order."),
        )
        .arg(
            Arg::new("null")
                .long("null")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Clear a field."),
        )
}

pub fn run_list(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let model = required(matches, "model")?;
    session.env.registry.policy(model)?;
    let selection = matches
        .get_one::<String>("selection")
        .map(String::as_str)
        .unwrap_or("all");
    let selection: Selection = selection
        .parse()
        .map_err(|err: PublishError| CliError::new(err.to_string(), ExitStatus::Usage))?;

    let records = session
        .env
        .store
        .select(model, selection)?
        .into_iter()
        .map(RecordRow::from)
        .collect();
    Ok(CommandResult::RecordList {
        model: model.to_string(),
        selection: selection.to_string(),
        records,
    })
}

pub fn run_save(session: &CliSession, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let model = required(matches, "model")?;
    let mut record = match matches.get_one::<String>("id") {
        Some(raw) => {
            util::load_record(session, model, parse_id(raw)?)?
        }
        None => {
            session.env.registry.policy(model)?;
            Record::draft(model)
        }
    };
    let created = !record.is_saved();

    for raw in values(matches, "set") {
        let (name, value) = parse_assignment(raw, "set")?;
        record.set(name, value);
    }
    for raw in values(matches, "ref") {
        let (name, value) = parse_assignment(raw, "ref")?;
        record.set(name, FieldValue::Reference(parse_id(value)?));
    }
    for raw in values(matches, "refs") {
        let (name, value) = parse_assignment(raw, "refs")?;
        record.set(name, parse_references(value)?);
    }
    for name in values(matches, "null") {
        record.set(name.as_str(), FieldValue::Null);
    }

    session.env.publisher.save_draft(&mut record, true)?;
    session.persist()?;
    Ok(CommandResult::RecordSaved {
        created,
        record: record.into(),
    })
}

pub(crate) fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, CliError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| CliError::new(format!("missing <{name}>"), ExitStatus::Usage))
}

fn values<'a>(matches: &'a ArgMatches, name: &str) -> impl Iterator<Item = &'a String> {
    matches.get_many::<String>(name).into_iter().flatten()
}
