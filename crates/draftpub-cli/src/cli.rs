use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::commands;
use crate::context::CliSession;
use crate::error::{CliError, ExitStatus};
use crate::formatter::{OutputFormat, emit_result};
use crate::util::Verbosity;

const NAME: &str = "draftpub";

pub fn run() -> ExitCode {
    init_tracing();
    match run_cli(std::env::args()) {
        Ok(code) => code,
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

/// Parses CLI arguments, resolves the workspace, and dispatches to the selected command.
/// Returns a `sysexits`-compatible `ExitCode` so scripts can react to failures.
pub fn run_cli<I, S>(args: I) -> Result<ExitCode, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let command = build_cli();
    let matches = command.try_get_matches_from(args)?;

    let verbosity = Verbosity {
        json: matches.get_flag("json"),
        verbose: matches.get_flag("verbose"),
    };
    let output = if verbosity.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let workspace_override = matches.get_one::<String>("workspace").cloned();
    if let Some(("init", sub)) = matches.subcommand() {
        let result = commands::init::run(workspace_override, sub)?;
        return emit_result(result, output);
    }

    let session = CliSession::bootstrap(workspace_override, verbosity)?;
    if session.verbosity.verbose {
        tracing::info!(
            workspace = %session.env.paths.root().display(),
            schema = %session.env.paths.schema_path().display(),
            store = %session.env.paths.store_path().display(),
            models = session.env.registry.models().count(),
            "resolved workspace context"
        );
    }

    let result = dispatch(&session, &matches)?;
    emit_result(result, output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .about("Draft/public record publishing")
        .arg(
            Arg::new("workspace")
                .long("workspace")
                .value_name("PATH")
                .global(true)
                .help("Specify the workspace root. Defaults to the nearest ancestor with a .draftpub folder."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit JSON instead of human-readable text."),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log the resolved workspace paths and loaded schema."),
        )
        .subcommand_required(true)
        .subcommand(commands::init::command())
        .subcommand(commands::status::command())
        .subcommand(commands::records::list_command())
        .subcommand(commands::records::save_command())
        .subcommand(commands::publish::publish_command())
        .subcommand(commands::publish::unpublish_command())
        .subcommand(commands::delete::delete_command())
        .subcommand(commands::delete::undelete_command())
}

fn dispatch(
    session: &CliSession,
    matches: &ArgMatches,
) -> Result<commands::CommandResult, CliError> {
    match matches.subcommand() {
        Some(("status", sub)) => commands::status::run(session, sub),
        Some(("list", sub)) => commands::records::run_list(session, sub),
        Some(("save", sub)) => commands::records::run_save(session, sub),
        Some(("publish", sub)) => commands::publish::run_publish(session, sub),
        Some(("unpublish", sub)) => commands::publish::run_unpublish(session, sub),
        Some(("delete", sub)) => commands::delete::run_delete(session, sub),
        Some(("undelete", sub)) => commands::delete::run_undelete(session, sub),
        _ => Err(CliError::new("missing command", ExitStatus::Usage)),
    }
}
