use std::sync::Arc;

use tracing::info;

use crate::record::Record;

/// Lifecycle notifications fired around every non-dry-run state change of a draft.
///
/// `deleted` is true when the change realizes a pending deletion. Hooks observe only; their
/// return value cannot abort the traversal.
pub trait PublishHooks: Send + Sync {
    fn before_state_change(&self, _record: &Record, _deleted: bool) {}
    fn after_state_change(&self, _record: &Record, _deleted: bool) {}
}

impl<H: PublishHooks + ?Sized> PublishHooks for Arc<H> {
    fn before_state_change(&self, record: &Record, deleted: bool) {
        (**self).before_state_change(record, deleted);
    }

    fn after_state_change(&self, record: &Record, deleted: bool) {
        (**self).after_state_change(record, deleted);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl PublishHooks for NoopHooks {}

/// Audit trail written through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingHooks;

impl PublishHooks for TracingHooks {
    fn after_state_change(&self, record: &Record, deleted: bool) {
        let key = record
            .key()
            .map(|key| key.to_string())
            .unwrap_or_else(|| record.model.clone());
        if deleted {
            info!(record = %key, "deleted draft and public snapshot");
        } else {
            info!(record = %key, public_id = ?record.public_id, "published draft");
        }
    }
}

/// Fans notifications out to several hooks in registration order.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn PublishHooks>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hooks: Arc<dyn PublishHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl PublishHooks for HookChain {
    fn before_state_change(&self, record: &Record, deleted: bool) {
        for hooks in &self.hooks {
            hooks.before_state_change(record, deleted);
        }
    }

    fn after_state_change(&self, record: &Record, deleted: bool) {
        for hooks in &self.hooks {
            hooks.after_state_change(record, deleted);
        }
    }
}
