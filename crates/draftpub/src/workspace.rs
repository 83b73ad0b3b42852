use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::PublishError;

/// Name of the directory marking a draftpub workspace root.
pub const DOT_DIR: &str = ".draftpub";
pub const SCHEMA_FILE: &str = "schema.yaml";
pub const STORE_FILE: &str = "store.json";

/// Canonical paths for a draftpub workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
    dot_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf, dot_dir: PathBuf) -> Self {
        Self { root, dot_dir }
    }

    /// Returns the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `.draftpub` folder for this workspace.
    pub fn dot_dir(&self) -> &Path {
        &self.dot_dir
    }

    /// Model schema (`{root}/.draftpub/schema.yaml`).
    pub fn schema_path(&self) -> PathBuf {
        self.dot_dir.join(SCHEMA_FILE)
    }

    /// Record store (`{root}/.draftpub/store.json`).
    pub fn store_path(&self) -> PathBuf {
        self.dot_dir.join(STORE_FILE)
    }
}

/// Trait describing a reusable workspace locator.
pub trait WorkspaceLocator: Send + Sync {
    fn workspace(&self) -> Result<WorkspacePaths, PublishError>;
}

/// Filesystem-backed workspace locator with lightweight caching.
pub struct FilesystemWorkspaceLocator {
    start: PathBuf,
    cache: Mutex<Option<WorkspacePaths>>,
}

impl FilesystemWorkspaceLocator {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            start: start.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn from_current_dir() -> Result<Self, PublishError> {
        Ok(Self::new(env::current_dir()?))
    }
}

impl WorkspaceLocator for FilesystemWorkspaceLocator {
    fn workspace(&self) -> Result<WorkspacePaths, PublishError> {
        if let Some(paths) = self.cache.lock().clone() {
            if paths.root().is_dir() && paths.dot_dir().is_dir() {
                return Ok(paths);
            }
        }

        let discovered = discover(&self.start)?;
        *self.cache.lock() = Some(discovered.clone());
        Ok(discovered)
    }
}

/// Performs one-off workspace discovery from an arbitrary starting path.
pub fn discover(start: impl AsRef<Path>) -> Result<WorkspacePaths, PublishError> {
    let canonical_start = normalize_start(start.as_ref())?;

    for ancestor in canonical_start.ancestors() {
        let candidate = ancestor.join(DOT_DIR);
        if candidate.is_dir() {
            return Ok(WorkspacePaths::new(ancestor.to_path_buf(), candidate));
        }
    }

    Err(PublishError::Workspace(format!(
        "no {DOT_DIR} directory found from {}",
        canonical_start.display()
    )))
}

/// Creates `.draftpub/` under `root` with the given schema and an empty store. Fails when
/// `root` already lies inside a workspace.
pub fn create(root: impl AsRef<Path>, schema: &str) -> Result<WorkspacePaths, PublishError> {
    let root = root.as_ref();
    if let Ok(existing) = discover(root) {
        return Err(PublishError::Workspace(format!(
            "{} is already inside the workspace at {}",
            root.display(),
            existing.root().display()
        )));
    }

    fs::create_dir_all(root)?;
    let root = fs::canonicalize(root)?;
    let paths = WorkspacePaths::new(root.clone(), root.join(DOT_DIR));
    fs::create_dir_all(paths.dot_dir())?;
    fs::write(paths.schema_path(), schema)?;
    fs::write(paths.store_path(), "{\n  \"next_ids\": {},\n  \"records\": []\n}\n")?;
    Ok(paths)
}

fn normalize_start(start: &Path) -> Result<PathBuf, PublishError> {
    let mut cursor = start.to_path_buf();

    // Walk up until a real path exists to avoid failures for not-yet-created paths.
    while !cursor.exists() {
        if !cursor.pop() {
            return Err(PublishError::Workspace(format!(
                "unable to find existing ancestor for {}",
                start.display()
            )));
        }
    }

    if cursor.is_file() {
        cursor = cursor.parent().map(Path::to_path_buf).ok_or_else(|| {
            PublishError::Workspace(format!(
                "file path {} has no parent directory",
                start.display()
            ))
        })?;
    }

    if !cursor.is_dir() {
        return Err(PublishError::Workspace(format!(
            "start path {} is not a directory",
            cursor.display()
        )));
    }

    Ok(fs::canonicalize(cursor)?)
}
