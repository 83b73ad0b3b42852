use std::process::ExitCode;

use draftpub::{FieldValue, NestedItem, Record, RecordKey};
use serde_json::json;

use crate::commands::CommandResult;
use crate::commands::records::RecordRow;
use crate::error::CliError;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as human-readable text or a single JSON document and maps
/// the outcome to its exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result)?,
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::WorkspaceInitialized {
            root,
            dot_dir,
            created,
            dry_run,
        } => {
            if *dry_run {
                if *created {
                    println!("Dry run: would initialize workspace at {root} (.draftpub at {dot_dir})");
                } else {
                    println!("Dry run: workspace already initialized at {root} (.draftpub at {dot_dir})");
                }
            } else if *created {
                println!("Initialized workspace at {root} (.draftpub: {dot_dir})");
            } else {
                println!("Workspace already initialized at {root} (.draftpub: {dot_dir})");
            }
        }
        CommandResult::Status { root, models } => {
            println!("Workspace {root} ({} models)", models.len());
            for status in models {
                if status.publishable {
                    println!(
                        "  {}: {} drafts, {} published, {} changed, {} to be deleted",
                        status.model, status.drafts, status.published, status.changed, status.deleted
                    );
                } else {
                    println!("  {}: {} records (not publishable)", status.model, status.drafts);
                }
            }
        }
        CommandResult::RecordList {
            model,
            selection,
            records,
        } => {
            println!("{model} records ({selection}): {}", records.len());
            for row in records {
                println!("  {}", row_line(row));
            }
        }
        CommandResult::RecordSaved { created, record } => {
            let verb = if *created { "Created" } else { "Saved" };
            println!("{verb} {}", row_line(record));
        }
        CommandResult::Published { report } => {
            if report.dry_run {
                println!("Dry run: would publish {} record(s):", report.visited);
            } else {
                println!("Published {} record(s):", report.visited);
            }
            print_nested(&report.nested, 1);
        }
        CommandResult::Unpublished {
            record,
            public,
            dry_run,
        } => match (public.as_ref().and_then(Record::key), *dry_run) {
            (Some(public), true) => println!("Dry run: would unpublish {record} (public {public})"),
            (Some(public), false) => println!("Unpublished {record} (removed public {public})"),
            (None, _) => println!("{record} has no public counterpart"),
        },
        CommandResult::Deleted {
            dry_run,
            marked,
            removed,
        } => {
            if *dry_run {
                print_keys("Dry run: would mark for deletion", marked);
                print_keys("Dry run: would remove", removed);
            } else {
                print_keys("Marked for deletion", marked);
                print_keys("Removed", removed);
            }
        }
        CommandResult::Undeleted {
            dry_run,
            restored,
            skipped,
        } => {
            let label = if *dry_run {
                "Dry run: would restore"
            } else {
                "Restored"
            };
            print_keys(label, restored);
            print_keys("Not marked for deletion", skipped);
        }
    }
}

fn print_json(result: &CommandResult) -> Result<(), CliError> {
    let payload = json!(result);
    println!("{payload}");
    Ok(())
}

fn print_keys(label: &str, keys: &[RecordKey]) {
    if keys.is_empty() {
        return;
    }
    let keys: Vec<String> = keys.iter().map(RecordKey::to_string).collect();
    println!("{label}: {}", keys.join(", "));
}

/// One item per line, children indented under the record that pulled them in.
fn print_nested(items: &[NestedItem<RecordKey>], depth: usize) {
    for item in items {
        match item {
            NestedItem::Item(key) => println!("{}- {key}", "  ".repeat(depth)),
            NestedItem::Children(children) => print_nested(children, depth + 1),
        }
    }
}

fn row_line(row: &RecordRow) -> String {
    let record = &row.record;
    let key = record
        .key()
        .map(|key| key.to_string())
        .unwrap_or_else(|| format!("{} (unsaved)", record.model));
    let mut line = key;
    if record.is_public {
        line.push_str(" [public]");
    } else if let Some(status) = row.status {
        line.push_str(&format!(" [{status}]"));
    }
    if let Some(public_id) = record.public_id {
        line.push_str(&format!(" -> #{public_id}"));
    }
    let fields: Vec<String> = record
        .fields
        .iter()
        .map(|(name, value)| format!("{name}={}", field_text(value)))
        .collect();
    if !fields.is_empty() {
        line.push(' ');
        line.push_str(&fields.join(" "));
    }
    line
}

fn field_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Bool(value) => value.to_string(),
        FieldValue::Integer(value) => value.to_string(),
        FieldValue::Float(value) => value.to_string(),
        FieldValue::Text(text) => format!("{text:?}"),
        FieldValue::Timestamp(at) => at.to_rfc3339(),
        FieldValue::Reference(id) => format!("#{id}"),
        FieldValue::References(ids) => {
            let ids: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
            format!("[{}]", ids.join(","))
        }
        FieldValue::Link(key) => key.to_string(),
        FieldValue::Links(keys) => {
            let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
            format!("[{}]", keys.join(","))
        }
    }
}
