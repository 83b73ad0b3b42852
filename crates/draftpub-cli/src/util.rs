use draftpub::{FieldValue, Record, RecordId, RecordStore};

use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

pub fn parse_id(value: &str) -> Result<RecordId, CliError> {
    value.trim().parse().map_err(|_| {
        CliError::new(
            format!("record id '{value}' must be a positive integer"),
            ExitStatus::Usage,
        )
    })
}

/// Splits a `name=value` argument.
pub fn parse_assignment<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str), CliError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(CliError::new(
            format!("--{flag} expects NAME=VALUE, got '{raw}'"),
            ExitStatus::Usage,
        )),
    }
}

/// Parses a comma-separated id list; an empty value clears the relation.
pub fn parse_references(value: &str) -> Result<FieldValue, CliError> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_id)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FieldValue::References(ids))
}

/// Loads a stored record, failing with a data error when it does not exist.
pub fn load_record(session: &CliSession, model: &str, id: RecordId) -> Result<Record, CliError> {
    session.env.registry.policy(model)?;
    session
        .env
        .store
        .get(model, id)?
        .ok_or_else(|| CliError::new(format!("{model}#{id} does not exist"), ExitStatus::Data))
}

pub fn load_records(
    session: &CliSession,
    model: &str,
    ids: &[RecordId],
) -> Result<Vec<Record>, CliError> {
    ids.iter().map(|id| load_record(session, model, *id)).collect()
}
