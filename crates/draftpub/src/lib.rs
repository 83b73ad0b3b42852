pub mod actions;
pub mod deletion;
pub mod env;
pub mod error;
pub mod hooks;
pub mod policy;
pub mod publish;
pub mod record;
pub mod schema;
pub mod store;
pub mod visited;
pub mod workspace;

pub use actions::{
    ActionOutcome, AllowAll, Permission, PermissionChecker, delete_selected, publish_selected,
    undelete_selected, unpublish_selected,
};
pub use deletion::DeleteOutcome;
pub use env::DraftpubEnv;
pub use error::PublishError;
pub use hooks::{HookChain, NoopHooks, PublishHooks, TracingHooks};
pub use policy::{
    FieldClass, FieldKind, ModelPolicy, PublishFunction, Registry, ReverseRelation,
    ThroughRelation, functions,
};
pub use publish::{PublishOptions, PublishReport, Publisher};
pub use record::{FieldValue, PublishState, PublishStatus, Record, RecordId, RecordKey};
pub use schema::{ModelConfig, RelationConfig, SchemaConfig, ThroughConfig};
pub use store::{InMemoryStore, RecordStore, Selection};
pub use visited::{NestedItem, VisitedSet};
pub use workspace::{
    FilesystemWorkspaceLocator, WorkspaceLocator, WorkspacePaths, create as create_workspace,
    discover as discover_workspace,
};
