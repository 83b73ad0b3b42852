use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PublishError;
use crate::policy::Registry;
use crate::publish::{PublishOptions, Publisher, Traversal, describe, live_public};
use crate::record::{PublishState, Record, RecordKey};
use crate::store::RecordStore;

/// Result of [`Publisher::delete`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The draft has a public counterpart; it is marked and the next publish removes both.
    Marked { record: Record },
    /// The draft was never published and has been removed.
    Removed { key: RecordKey },
}

impl<S: RecordStore> Traversal<'_, S> {
    /// Realizes a pending deletion: the draft, its public counterpart and everything they
    /// own are removed. Owned children are deleted whatever their own state, including a
    /// child whose own publish is in progress further up the traversal.
    pub(crate) fn publish_deletion(
        &mut self,
        draft: Record,
        parent: Option<&RecordKey>,
    ) -> Result<(), PublishError> {
        let Some(key) = draft.key() else {
            return Ok(());
        };
        if !self.realized.insert(key.clone()) {
            return Ok(());
        }
        let first_visit = self.visited.add(key.clone(), parent);

        debug!(record = %key, dry_run = self.dry_run, "realizing deletion");
        if first_visit && !self.dry_run {
            self.hooks.before_state_change(&draft, true);
        }

        let registry = self.registry;
        let policy = registry.policy(&key.model)?;
        for relation in policy.reverse_relations() {
            let child_policy = registry.policy(&relation.child_model)?;
            let children = self
                .store
                .referencing(&relation.child_model, &relation.parent_field, key.id)?;
            for child in children.into_iter().filter(|child| !child.is_public) {
                if child_policy.is_publishable() {
                    self.publish_deletion(child, Some(&key))?;
                } else if let (false, Some(id)) = (self.dry_run, child.id) {
                    self.store.remove(&child.model, id)?;
                }
            }
        }

        if !self.dry_run {
            if let Some(public) = live_public(self.store, &draft)? {
                remove_public_tree(self.store, registry, &public)?;
            }
            self.store.remove(&key.model, key.id)?;
            self.hooks.after_state_change(&draft, true);
            info!(record = %key, "deleted draft and public counterpart");
        }
        Ok(())
    }
}

/// Removes a public record together with its owned public children and cascade
/// dependents. Drafts pointing at a removed public lose the link and become `Changed`
/// (drafts pending deletion keep their marker).
pub(crate) fn remove_public_tree<S: RecordStore + ?Sized>(
    store: &S,
    registry: &Registry,
    public: &Record,
) -> Result<(), PublishError> {
    let Some(public_id) = public.id else {
        return Ok(());
    };
    // Removed before its children so a cyclic ownership chain ends here.
    if !store.remove(&public.model, public_id)? {
        return Ok(());
    }

    if let Some(mut draft) = store.draft_of(&public.model, public_id)? {
        draft.public_id = None;
        if draft.publish_state != PublishState::Delete {
            draft.publish_state = PublishState::Changed;
        }
        store.update(&draft)?;
    }

    let policy = registry.policy(&public.model)?;
    for relation in policy.reverse_relations().chain(policy.cascade_relations()) {
        let child_policy = registry.policy(&relation.child_model)?;
        for child in store.referencing(&relation.child_model, &relation.parent_field, public_id)? {
            if child_policy.is_publishable() {
                if child.is_public {
                    remove_public_tree(store, registry, &child)?;
                }
            } else if let Some(id) = child.id {
                store.remove(&child.model, id)?;
            }
        }
    }
    debug!(record = %describe(public), "removed public record");
    Ok(())
}

/// Deletes a draft that has no live public counterpart, and its owned draft children
/// each according to its own state.
fn delete_draft<S: RecordStore + ?Sized>(
    store: &S,
    registry: &Registry,
    draft: Record,
) -> Result<DeleteOutcome, PublishError> {
    let key = draft.key().ok_or_else(|| {
        PublishError::PublishPrecondition(format!("unsaved {} draft", draft.model))
    })?;
    let policy = registry.policy(&key.model)?;

    if policy.is_publishable() && live_public(store, &draft)?.is_some() {
        let mut record = draft;
        record.publish_state = PublishState::Delete;
        store.update(&record)?;
        debug!(record = %key, "marked for deletion");
        return Ok(DeleteOutcome::Marked { record });
    }

    store.remove(&key.model, key.id)?;
    for relation in policy.reverse_relations() {
        let children = store.referencing(&relation.child_model, &relation.parent_field, key.id)?;
        for child in children.into_iter().filter(|child| !child.is_public) {
            delete_draft(store, registry, child)?;
        }
    }
    debug!(record = %key, "removed unpublished draft");
    Ok(DeleteOutcome::Removed { key })
}

impl<S: RecordStore> Publisher<S> {
    /// Deletes a draft. Published drafts are only marked; the next publish realizes the
    /// deletion. Never-published drafts are removed at once.
    pub fn delete(&self, record: &Record) -> Result<DeleteOutcome, PublishError> {
        if record.is_public {
            return Err(PublishError::PublishPrecondition(format!(
                "{} is a public record; delete its draft instead",
                describe(record)
            )));
        }
        let draft = self.saved_draft(record, PublishError::PublishPrecondition)?;

        let outcome = self.transaction(false, || {
            delete_draft(self.store(), self.registry(), draft)
        })?;
        info!(record = %describe(record), ?outcome, "delete");
        Ok(outcome)
    }

    /// Clears a pending deletion. Returns whether a marker was cleared; the public
    /// counterpart is left untouched.
    pub fn undelete(&self, record: &Record) -> Result<bool, PublishError> {
        if record.is_public {
            return Err(PublishError::PublishPrecondition(format!(
                "{} is a public record",
                describe(record)
            )));
        }
        let mut draft = self.saved_draft(record, PublishError::PublishPrecondition)?;
        if draft.publish_state != PublishState::Delete {
            return Ok(false);
        }

        draft.publish_state = PublishState::Changed;
        self.store().update(&draft)?;
        info!(record = %describe(&draft), "undeleted");
        Ok(true)
    }

    /// Removes the public counterpart of a draft and its owned public children; the draft
    /// becomes `Changed` with no public link. In dry-run, returns the public record that
    /// would be removed (or `None`) and writes nothing. Hooks are not fired.
    pub fn unpublish(
        &self,
        record: &Record,
        options: PublishOptions,
    ) -> Result<Option<Record>, PublishError> {
        if record.is_public {
            return Err(PublishError::UnpublishPrecondition(format!(
                "{} is a public record",
                describe(record)
            )));
        }
        let draft = self.saved_draft(record, PublishError::UnpublishPrecondition)?;
        if !self.registry().policy(&draft.model)?.is_publishable() {
            return Err(PublishError::UnpublishPrecondition(format!(
                "{} records have no public counterpart",
                draft.model
            )));
        }

        let Some(public) = live_public(self.store(), &draft)? else {
            if options.dry_run {
                return Ok(None);
            }
            return Err(PublishError::UnpublishPrecondition(format!(
                "{} has no public counterpart",
                describe(&draft)
            )));
        };
        if options.dry_run {
            return Ok(Some(public));
        }

        self.transaction(false, || {
            remove_public_tree(self.store(), self.registry(), &public)?;
            if let Some(mut draft) = self.reload(&draft)? {
                draft.public_id = None;
                draft.publish_state = PublishState::Changed;
                self.store().update(&draft)?;
            }
            Ok(())
        })?;
        info!(record = %describe(&draft), public_id = ?public.id, "unpublished");
        Ok(Some(public))
    }

    fn saved_draft(
        &self,
        record: &Record,
        precondition: fn(String) -> PublishError,
    ) -> Result<Record, PublishError> {
        let stored = match record.id {
            Some(id) => self.store().get(&record.model, id)?,
            None => None,
        };
        match stored {
            Some(draft) if draft.is_public => Err(precondition(format!(
                "{} is a public record",
                describe(&draft)
            ))),
            Some(draft) => Ok(draft),
            None => Err(precondition(format!("{} is not saved", describe(record)))),
        }
    }
}
