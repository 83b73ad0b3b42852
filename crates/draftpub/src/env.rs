use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::PublishError;
use crate::hooks::PublishHooks;
use crate::policy::Registry;
use crate::publish::Publisher;
use crate::schema::SchemaConfig;
use crate::store::InMemoryStore;
use crate::workspace::{FilesystemWorkspaceLocator, WorkspaceLocator, WorkspacePaths};

pub type DefaultWorkspaceLocator = Arc<FilesystemWorkspaceLocator>;
pub type WorkspaceStore = Arc<InMemoryStore>;

/// Everything needed to operate on a workspace: its paths, the policy registry built
/// from the schema file, and a publisher over the loaded record store.
pub struct DraftpubEnv {
    pub paths: WorkspacePaths,
    pub registry: Arc<Registry>,
    pub store: WorkspaceStore,
    pub publisher: Publisher<WorkspaceStore>,
}

impl DraftpubEnv {
    /// Initialize the environment from the current working directory.
    pub fn from_current_dir() -> Result<Self, PublishError> {
        let locator = Arc::new(FilesystemWorkspaceLocator::from_current_dir()?);
        Self::new(locator, None)
    }

    /// Initialize the environment from a specific path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let locator = Arc::new(FilesystemWorkspaceLocator::new(path.as_ref().to_path_buf()));
        Self::new(locator, None)
    }

    /// Create a new environment with explicit locator and optional hooks.
    pub fn new(
        locator: DefaultWorkspaceLocator,
        hooks: Option<Arc<dyn PublishHooks>>,
    ) -> Result<Self, PublishError> {
        let paths = locator.workspace()?;

        let registry = Arc::new(SchemaConfig::load(paths.schema_path())?.into_registry()?);
        let store_path = paths.store_path();
        let store = if store_path.exists() {
            Arc::new(InMemoryStore::load(&store_path)?)
        } else {
            Arc::new(InMemoryStore::new())
        };
        debug!(
            root = %paths.root().display(),
            models = registry.models().count(),
            records = store.len(),
            "loaded workspace"
        );

        let mut publisher = Publisher::new(store.clone(), registry.clone());
        if let Some(hooks) = hooks {
            publisher = publisher.with_hooks(hooks);
        }

        Ok(Self {
            paths,
            registry,
            store,
            publisher,
        })
    }

    /// Writes the record store back to the workspace.
    pub fn save(&self) -> Result<(), PublishError> {
        self.store.save(self.paths.store_path())
    }
}
