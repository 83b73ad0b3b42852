use std::path::PathBuf;
use std::sync::Arc;

use draftpub::{
    DraftpubEnv, FilesystemWorkspaceLocator, PublishHooks, TracingHooks, WorkspaceLocator,
};

use crate::error::CliError;
use crate::util::Verbosity;

pub struct CliSession {
    pub env: DraftpubEnv,
    pub verbosity: Verbosity,
}

impl CliSession {
    pub fn bootstrap(
        workspace_override: Option<String>,
        verbosity: Verbosity,
    ) -> Result<Self, CliError> {
        let locator = match workspace_override {
            Some(path) => {
                let locator = FilesystemWorkspaceLocator::new(PathBuf::from(path));
                locator.workspace()?;
                locator
            }
            None => FilesystemWorkspaceLocator::from_current_dir()?,
        };

        let hooks: Arc<dyn PublishHooks> = Arc::new(TracingHooks);
        let env = DraftpubEnv::new(Arc::new(locator), Some(hooks))?;
        Ok(Self { env, verbosity })
    }

    /// Writes the record store back after a mutating command.
    pub fn persist(&self) -> Result<(), CliError> {
        self.env.save()?;
        Ok(())
    }
}
