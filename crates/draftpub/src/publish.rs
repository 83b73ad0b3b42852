use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::deletion::remove_public_tree;
use crate::error::PublishError;
use crate::hooks::{NoopHooks, PublishHooks};
use crate::policy::{FieldClass, ModelPolicy, Registry, ReverseRelation};
use crate::record::{FieldValue, PublishState, Record, RecordId, RecordKey};
use crate::store::RecordStore;
use crate::visited::{NestedItem, VisitedSet};

/// Options shared by publish and unpublish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Run the full traversal without writing anything or firing hooks.
    pub dry_run: bool,
}

impl PublishOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Outcome of a batch operation: every record touched, nested under the record that
/// pulled it in.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PublishReport {
    pub dry_run: bool,
    pub visited: usize,
    pub nested: Vec<NestedItem<RecordKey>>,
}

impl PublishReport {
    pub fn from_visited(dry_run: bool, visited: &VisitedSet<RecordKey>) -> Self {
        Self {
            dry_run,
            visited: visited.len(),
            nested: visited.nested_report(),
        }
    }
}

/// Entry point for draft/public operations over a record store.
pub struct Publisher<S: RecordStore> {
    store: S,
    registry: Arc<Registry>,
    hooks: Arc<dyn PublishHooks>,
}

impl<S: RecordStore> Publisher<S> {
    pub fn new(store: S, registry: Arc<Registry>) -> Self {
        Self {
            store,
            registry,
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn PublishHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Creates or overwrites a draft. With `mark_changed` the draft moves to `Changed`;
    /// drafts pending deletion must be undeleted first.
    pub fn save_draft(&self, record: &mut Record, mark_changed: bool) -> Result<(), PublishError> {
        if record.is_public {
            return Err(PublishError::PublishPrecondition(format!(
                "{} is a public record and cannot be edited",
                describe(record)
            )));
        }
        let policy = self.registry.policy(&record.model)?;

        if mark_changed && policy.is_publishable() {
            if record.publish_state == PublishState::Delete {
                return Err(PublishError::PublishPrecondition(format!(
                    "{} is marked for deletion; undelete it before editing",
                    describe(record)
                )));
            }
            record.publish_state = PublishState::Changed;
        }

        if record.is_saved() {
            self.store.update(record)?;
        } else {
            *record = self.store.insert(record.clone())?;
        }
        debug!(record = %describe(record), state = record.publish_state.as_str(), "saved draft");
        Ok(())
    }

    /// Current stored version of `record`, if it is saved and still present.
    pub fn reload(&self, record: &Record) -> Result<Option<Record>, PublishError> {
        match record.id {
            Some(id) => self.store.get(&record.model, id),
            None => Ok(None),
        }
    }

    /// The live public counterpart of a draft.
    pub fn public_of(&self, record: &Record) -> Result<Option<Record>, PublishError> {
        live_public(&self.store, record)
    }

    /// Members of a many-to-many relation in order. Relations declared through an
    /// association model are read from the association records matching `record`'s side
    /// (draft or public), sorted by the order field when one is declared.
    pub fn members(&self, record: &Record, name: &str) -> Result<Vec<RecordId>, PublishError> {
        let policy = self.registry.policy(&record.model)?;

        if let Some(through) = policy.through_relation(name) {
            let Some(id) = record.id else {
                return Ok(Vec::new());
            };
            let mut links: Vec<Record> = self
                .store
                .referencing(&through.through_model, &through.source_field, id)?
                .into_iter()
                .filter(|link| link.is_public == record.is_public)
                .collect();
            if let Some(order) = &through.order_field {
                links.sort_by_key(|link| link.get(order).and_then(FieldValue::as_integer));
            }
            return Ok(links
                .iter()
                .filter_map(|link| link.reference(&through.target_field))
                .collect());
        }

        match policy.classify(name) {
            FieldClass::ManyToMany(_) => Ok(record
                .get(name)
                .and_then(FieldValue::as_references)
                .map(<[RecordId]>::to_vec)
                .unwrap_or_default()),
            _ => Err(PublishError::Schema(format!(
                "{}.{name} is not a many-to-many relation",
                record.model
            ))),
        }
    }

    /// Publishes a saved draft and everything it owns. Returns the public counterpart, or
    /// `None` when the draft was pending deletion and the deletion was realized.
    ///
    /// A caller-supplied `visited` set spans several calls; records already in it are not
    /// processed again.
    pub fn publish(
        &self,
        record: &Record,
        options: PublishOptions,
        visited: Option<&mut VisitedSet<RecordKey>>,
    ) -> Result<Option<Record>, PublishError> {
        let key = publishable_key(record)?;
        let mut local = VisitedSet::new();
        let visited = visited.unwrap_or(&mut local);

        self.transaction(options.dry_run, || {
            self.traversal(visited, options.dry_run)
                .publish_key(&key, None)
        })
    }

    /// Publishes several drafts sharing one visited set and one transaction.
    pub fn publish_all(
        &self,
        records: &[Record],
        options: PublishOptions,
        visited: Option<&mut VisitedSet<RecordKey>>,
    ) -> Result<PublishReport, PublishError> {
        let keys = records
            .iter()
            .map(publishable_key)
            .collect::<Result<Vec<_>, _>>()?;
        let mut local = VisitedSet::new();
        let visited = visited.unwrap_or(&mut local);

        self.transaction(options.dry_run, || {
            let mut traversal = self.traversal(visited, options.dry_run);
            for key in &keys {
                traversal.publish_key(key, None)?;
            }
            Ok(())
        })?;

        let report = PublishReport::from_visited(options.dry_run, visited);
        info!(
            records = records.len(),
            visited = report.visited,
            dry_run = options.dry_run,
            "batch publish finished"
        );
        Ok(report)
    }

    pub(crate) fn traversal<'a>(
        &'a self,
        visited: &'a mut VisitedSet<RecordKey>,
        dry_run: bool,
    ) -> Traversal<'a, S> {
        Traversal {
            store: &self.store,
            registry: &self.registry,
            hooks: self.hooks.as_ref(),
            visited,
            realized: HashSet::new(),
            dry_run,
        }
    }

    /// Runs `operation` inside a store transaction unless `dry_run`; errors roll back.
    pub(crate) fn transaction<T>(
        &self,
        dry_run: bool,
        operation: impl FnOnce() -> Result<T, PublishError>,
    ) -> Result<T, PublishError> {
        if dry_run {
            return operation();
        }

        self.store.begin()?;
        match operation() {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn publishable_key(record: &Record) -> Result<RecordKey, PublishError> {
    if record.is_public {
        return Err(PublishError::PublishPrecondition(format!(
            "{} is a public record",
            describe(record)
        )));
    }
    record.key().ok_or_else(|| {
        PublishError::PublishPrecondition(format!("unsaved {} draft", record.model))
    })
}

pub(crate) fn describe(record: &Record) -> String {
    record
        .key()
        .map(|key| key.to_string())
        .unwrap_or_else(|| format!("unsaved {}", record.model))
}

/// The public record a draft points at, if it still exists.
pub(crate) fn live_public<S: RecordStore + ?Sized>(
    store: &S,
    draft: &Record,
) -> Result<Option<Record>, PublishError> {
    match draft.public_id {
        Some(id) => Ok(store.get(&draft.model, id)?.filter(|record| record.is_public)),
        None => Ok(None),
    }
}

/// State of one publish call (or batch): the visited set plus the collaborators.
pub(crate) struct Traversal<'a, S: RecordStore> {
    pub(crate) store: &'a S,
    pub(crate) registry: &'a Registry,
    pub(crate) hooks: &'a dyn PublishHooks,
    pub(crate) visited: &'a mut VisitedSet<RecordKey>,
    /// Drafts whose deletion this traversal has realized (or, in dry-run, would realize).
    pub(crate) realized: HashSet<RecordKey>,
    pub(crate) dry_run: bool,
}

impl<S: RecordStore> Traversal<'_, S> {
    pub(crate) fn publish_key(
        &mut self,
        key: &RecordKey,
        parent: Option<&RecordKey>,
    ) -> Result<Option<Record>, PublishError> {
        if self.realized.contains(key) {
            return Ok(None);
        }
        if self.visited.contains(key) {
            return match self.store.get(&key.model, key.id)? {
                Some(draft) if !draft.is_public => live_public(self.store, &draft),
                _ => Ok(None),
            };
        }

        let mut draft = self.load_draft(key)?;
        if draft.publish_state == PublishState::Delete {
            self.publish_deletion(draft, parent)?;
            return Ok(None);
        }

        let registry = self.registry;
        let policy = registry.policy(&key.model)?;
        if !policy.is_publishable() {
            return Err(PublishError::PublishPrecondition(format!(
                "{} records have no public counterpart",
                key.model
            )));
        }

        self.visited.add(key.clone(), parent);
        debug!(record = %key, dry_run = self.dry_run, "publishing");
        if !self.dry_run {
            self.hooks.before_state_change(&draft, false);
        }

        let mut public = match live_public(self.store, &draft)? {
            Some(public) => public,
            None if self.dry_run => Record::public(key.model.as_str()),
            None => {
                // Linked before the copy so cycles back to this draft resolve to it.
                let public = self.store.insert(Record::public(key.model.as_str()))?;
                draft.public_id = public.id;
                self.store.update(&draft)?;
                public
            }
        };

        self.copy_fields(policy, &draft, &mut public, key)?;
        // A dependency's realized deletion took this draft and its public record with it.
        if self.realized.contains(key) {
            return Ok(None);
        }
        if !self.dry_run {
            self.store.update(&public)?;
        }
        self.publish_reverse(policy, key, &public)?;
        if self.realized.contains(key) {
            return Ok(None);
        }

        if !self.dry_run {
            let mut draft = self.load_draft(key)?;
            draft.public_id = public.id;
            draft.publish_state = PublishState::Default;
            self.store.update(&draft)?;
            self.hooks.after_state_change(&draft, false);
            info!(record = %key, public_id = ?public.id, "published");
        }
        Ok(Some(public))
    }

    pub(crate) fn load_draft(&self, key: &RecordKey) -> Result<Record, PublishError> {
        match self.store.get(&key.model, key.id)? {
            Some(record) if record.is_public => Err(PublishError::PublishPrecondition(format!(
                "{key} is a public record"
            ))),
            Some(record) => Ok(record),
            None => Err(PublishError::PublishPrecondition(format!(
                "{key} is not saved"
            ))),
        }
    }

    fn copy_fields(
        &mut self,
        policy: &ModelPolicy,
        draft: &Record,
        public: &mut Record,
        key: &RecordKey,
    ) -> Result<(), PublishError> {
        let mut names: BTreeSet<String> = policy
            .declared_fields()
            .map(|(name, _)| name.to_string())
            .collect();
        names.extend(policy.function_fields().map(str::to_string));
        names.extend(draft.fields.keys().cloned());

        for name in &names {
            match policy.classify(name) {
                FieldClass::Excluded => {}
                FieldClass::Function(function) => {
                    let value = function(draft, name);
                    public.set(name.as_str(), value);
                }
                FieldClass::Plain => {
                    let value = match draft.get(name) {
                        Some(value) if value.is_bare_relation() => {
                            return Err(PublishError::Schema(format!(
                                "{key}.{name} holds bare record ids but is not declared as a \
                                 relation; use a link value or declare its target"
                            )));
                        }
                        Some(FieldValue::Link(target)) => self
                            .resolve_reference(&target.model, target.id, key)?
                            .map(|id| FieldValue::Link(RecordKey::new(target.model.as_str(), id)))
                            .unwrap_or_default(),
                        Some(FieldValue::Links(targets)) => {
                            let mut resolved = Vec::with_capacity(targets.len());
                            for target in targets {
                                if let Some(id) =
                                    self.resolve_reference(&target.model, target.id, key)?
                                {
                                    let link = RecordKey::new(target.model.as_str(), id);
                                    if !resolved.contains(&link) {
                                        resolved.push(link);
                                    }
                                }
                            }
                            FieldValue::Links(resolved)
                        }
                        Some(value) => value.clone(),
                        None => FieldValue::Null,
                    };
                    public.set(name.as_str(), value);
                }
                FieldClass::Reference(target) => {
                    let value = match draft.get(name) {
                        Some(FieldValue::Reference(id)) => self
                            .resolve_reference(target, *id, key)?
                            .map(FieldValue::Reference)
                            .unwrap_or_default(),
                        Some(FieldValue::Null) | None => FieldValue::Null,
                        Some(other) => {
                            return Err(PublishError::Schema(format!(
                                "{key}.{name} must hold a reference, found {other:?}"
                            )));
                        }
                    };
                    public.set(name.as_str(), value);
                }
                FieldClass::ManyToMany(target) => {
                    let members = match draft.get(name) {
                        Some(FieldValue::References(ids)) => ids.clone(),
                        Some(FieldValue::Null) | None => Vec::new(),
                        Some(other) => {
                            return Err(PublishError::Schema(format!(
                                "{key}.{name} must hold references, found {other:?}"
                            )));
                        }
                    };
                    let mut resolved = Vec::with_capacity(members.len());
                    for member in members {
                        if let Some(id) = self.resolve_reference(target, member, key)? {
                            if !resolved.contains(&id) {
                                resolved.push(id);
                            }
                        }
                    }
                    public.set(name.as_str(), FieldValue::References(resolved));
                }
            }
        }
        Ok(())
    }

    /// Maps a draft-side reference to the id the public record should point at, publishing
    /// the dependency first when it has no live public counterpart.
    fn resolve_reference(
        &mut self,
        target: &str,
        id: RecordId,
        parent: &RecordKey,
    ) -> Result<Option<RecordId>, PublishError> {
        if !self.registry.policy(target)?.is_publishable() {
            return Ok(Some(id));
        }

        let Some(dependency) = self.store.get(target, id)? else {
            warn!(record = %parent, target, id, "dangling reference dropped");
            return Ok(None);
        };
        if dependency.is_public {
            return Ok(Some(id));
        }
        if dependency.publish_state != PublishState::Delete {
            if let Some(public) = live_public(self.store, &dependency)? {
                return Ok(public.id);
            }
        }

        let key = RecordKey::new(target, id);
        Ok(self.publish_key(&key, Some(parent))?.and_then(|public| public.id))
    }

    fn publish_reverse(
        &mut self,
        policy: &ModelPolicy,
        key: &RecordKey,
        public: &Record,
    ) -> Result<(), PublishError> {
        let registry = self.registry;
        for relation in policy.reverse_relations() {
            let child_policy = registry.policy(&relation.child_model)?;
            let children: Vec<Record> = self
                .store
                .referencing(&relation.child_model, &relation.parent_field, key.id)?
                .into_iter()
                .filter(|child| !child.is_public)
                .collect();

            if !child_policy.is_publishable() {
                if let (false, Some(public_id)) = (self.dry_run, public.id) {
                    self.sync_plain_children(relation, &children, public_id)?;
                }
                continue;
            }

            let mut kept = BTreeSet::new();
            for child in &children {
                let Some(child_key) = child.key() else {
                    continue;
                };
                if let Some(child_public) = self.publish_key(&child_key, Some(key))? {
                    kept.extend(child_public.id);
                }
            }

            let Some(public_id) = public.id else {
                continue;
            };
            if self.dry_run {
                continue;
            }
            for stale in self
                .store
                .referencing(&relation.child_model, &relation.parent_field, public_id)?
            {
                if stale.is_public && !stale.id.is_some_and(|id| kept.contains(&id)) {
                    debug!(record = %describe(&stale), "pruning orphaned public child");
                    remove_public_tree(self.store, registry, &stale)?;
                }
            }
        }
        Ok(())
    }

    /// Ensures the public parent owns one copy of every plain draft child, matched on
    /// content, and drops copies whose draft child is gone.
    fn sync_plain_children(
        &self,
        relation: &ReverseRelation,
        children: &[Record],
        public_id: RecordId,
    ) -> Result<(), PublishError> {
        let parent_field = relation.parent_field.as_str();
        let mut copies =
            self.store
                .referencing(&relation.child_model, parent_field, public_id)?;

        for child in children {
            let content = child.content_without(parent_field);
            match copies
                .iter()
                .position(|copy| copy.content_without(parent_field) == content)
            {
                Some(index) => {
                    copies.remove(index);
                }
                None => {
                    let mut copy = child.clone();
                    copy.id = None;
                    copy.set(parent_field, FieldValue::Reference(public_id));
                    self.store.insert(copy)?;
                }
            }
        }

        for copy in copies {
            if let Some(id) = copy.id {
                self.store.remove(&copy.model, id)?;
            }
        }
        Ok(())
    }
}
