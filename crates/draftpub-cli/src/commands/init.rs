use std::env;
use std::path::{Component, Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command};
use draftpub::workspace::DOT_DIR;

use crate::commands::CommandResult;
use crate::error::{CliError, ExitStatus};

/// Schema written by `init`: a page tree with ordered blocks, shared authors and plain tags.
pub const STARTER_SCHEMA: &str = r#"models:
  page:
    fields: [slug, title]
    references:
      parent: page
    many_to_many:
      authors: author
      tags: tag
    functions:
      pub_date: now
    reverse:
      - name: blocks
        model: page_block
        field: page
  page_block:
    fields: [content, position]
    references:
      page: page
  author:
    fields: [name]
  tag:
    publishable: false
    fields: [name]
"#;

pub fn command() -> Command {
    Command::new("init")
        .about("Initialize a draftpub workspace")
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .help("Workspace root to initialize. Defaults to the current directory."),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Show the resolved workspace root without writing to disk."),
        )
}

pub fn run(
    workspace_override: Option<String>,
    matches: &ArgMatches,
) -> Result<CommandResult, CliError> {
    let positional = matches.get_one::<String>("path").cloned();
    let target = workspace_override
        .or(positional)
        .unwrap_or_else(|| ".".to_string());
    let dry_run = matches.get_flag("dry-run");

    let root = absolutize(&target)?;
    let plan = plan_workspace(&root)?;

    if dry_run {
        return Ok(CommandResult::WorkspaceInitialized {
            root: plan.root.display().to_string(),
            dot_dir: plan.dot_dir.display().to_string(),
            created: !plan.already_initialized,
            dry_run: true,
        });
    }

    let created = apply_init(&plan)?;
    Ok(CommandResult::WorkspaceInitialized {
        root: plan.root.display().to_string(),
        dot_dir: plan.dot_dir.display().to_string(),
        created,
        dry_run: false,
    })
}

struct InitPlan {
    root: PathBuf,
    dot_dir: PathBuf,
    already_initialized: bool,
}

fn plan_workspace(root: &Path) -> Result<InitPlan, CliError> {
    if root.exists() && !root.is_dir() {
        return Err(CliError::new(
            format!("workspace root {} is not a directory", root.display()),
            ExitStatus::Usage,
        ));
    }

    let dot_dir = root.join(DOT_DIR);
    let already_initialized = dot_dir.is_dir();
    for ancestor in root.ancestors().skip(1) {
        let existing = ancestor.join(DOT_DIR);
        if existing.is_dir() {
            return Err(CliError::new(
                format!(
                    "cannot initialize workspace at {}; ancestor workspace already exists at {}",
                    root.display(),
                    existing.display()
                ),
                ExitStatus::Usage,
            ));
        }
    }

    Ok(InitPlan {
        root: root.to_path_buf(),
        dot_dir,
        already_initialized,
    })
}

fn apply_init(plan: &InitPlan) -> Result<bool, CliError> {
    if plan.already_initialized {
        return Ok(false);
    }

    draftpub::create_workspace(&plan.root, STARTER_SCHEMA)?;
    Ok(true)
}

fn absolutize(raw: &str) -> Result<PathBuf, CliError> {
    let candidate = PathBuf::from(raw);
    let base = if candidate.is_absolute() {
        candidate
    } else {
        env::current_dir()?.join(candidate)
    };

    Ok(lexical_normalize(&base))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            // Absolute input: `..` above the root stays at the root.
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}
