use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::record::{FieldValue, PublishState, Record, RecordId};

/// Predefined record selections offered by the storage layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    All,
    /// Drafts that are not pending deletion.
    Draft,
    Published,
    /// Drafts pending deletion.
    Deleted,
    /// Drafts edited since their last publish.
    Changed,
    /// Every draft, pending deletion or not.
    DraftAndDeleted,
}

impl Selection {
    pub const ALL: [Selection; 6] = [
        Selection::All,
        Selection::Draft,
        Selection::Published,
        Selection::Deleted,
        Selection::Changed,
        Selection::DraftAndDeleted,
    ];

    pub fn matches(self, record: &Record) -> bool {
        match self {
            Selection::All => true,
            Selection::Draft => !record.is_public && record.publish_state != PublishState::Delete,
            Selection::Published => record.is_public,
            Selection::Deleted => {
                !record.is_public && record.publish_state == PublishState::Delete
            }
            Selection::Changed => {
                !record.is_public && record.publish_state == PublishState::Changed
            }
            Selection::DraftAndDeleted => !record.is_public,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Selection::All => "all",
            Selection::Draft => "draft",
            Selection::Published => "published",
            Selection::Deleted => "deleted",
            Selection::Changed => "changed",
            Selection::DraftAndDeleted => "draft-and-deleted",
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Selection {
    type Err = PublishError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Selection::ALL
            .into_iter()
            .find(|selection| selection.as_str() == value)
            .ok_or_else(|| PublishError::Storage(format!("unknown selection `{value}`")))
    }
}

/// Query layer consumed by the publisher. Implementations are responsible for serializing
/// concurrent writers; all methods take `&self`.
pub trait RecordStore: Send + Sync {
    fn get(&self, model: &str, id: RecordId) -> Result<Option<Record>, PublishError>;

    /// Persists a new record and returns it with its assigned id.
    fn insert(&self, record: Record) -> Result<Record, PublishError>;

    /// Overwrites an existing record.
    fn update(&self, record: &Record) -> Result<(), PublishError>;

    /// Removes a record, returning whether it existed.
    fn remove(&self, model: &str, id: RecordId) -> Result<bool, PublishError>;

    /// Records of `model` matching `selection`, ordered by id.
    fn select(&self, model: &str, selection: Selection) -> Result<Vec<Record>, PublishError>;

    /// Records of `model` whose `field` references `id`, ordered by id.
    fn referencing(
        &self,
        model: &str,
        field: &str,
        id: RecordId,
    ) -> Result<Vec<Record>, PublishError>;

    /// The draft whose public counterpart is `public_id`.
    fn draft_of(&self, model: &str, public_id: RecordId) -> Result<Option<Record>, PublishError> {
        Ok(self
            .select(model, Selection::DraftAndDeleted)?
            .into_iter()
            .find(|record| record.public_id == Some(public_id)))
    }

    fn begin(&self) -> Result<(), PublishError>;
    fn commit(&self) -> Result<(), PublishError>;
    fn rollback(&self) -> Result<(), PublishError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn get(&self, model: &str, id: RecordId) -> Result<Option<Record>, PublishError> {
        (**self).get(model, id)
    }

    fn insert(&self, record: Record) -> Result<Record, PublishError> {
        (**self).insert(record)
    }

    fn update(&self, record: &Record) -> Result<(), PublishError> {
        (**self).update(record)
    }

    fn remove(&self, model: &str, id: RecordId) -> Result<bool, PublishError> {
        (**self).remove(model, id)
    }

    fn select(&self, model: &str, selection: Selection) -> Result<Vec<Record>, PublishError> {
        (**self).select(model, selection)
    }

    fn referencing(
        &self,
        model: &str,
        field: &str,
        id: RecordId,
    ) -> Result<Vec<Record>, PublishError> {
        (**self).referencing(model, field, id)
    }

    fn draft_of(&self, model: &str, public_id: RecordId) -> Result<Option<Record>, PublishError> {
        (**self).draft_of(model, public_id)
    }

    fn begin(&self) -> Result<(), PublishError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), PublishError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), PublishError> {
        (**self).rollback()
    }
}

#[derive(Clone, Debug, Default)]
struct Table {
    next_id: RecordId,
    rows: BTreeMap<RecordId, Record>,
}

impl Table {
    fn allocate(&mut self) -> RecordId {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Default)]
struct StoreState {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    depth: usize,
    /// Set when a nested transaction rolled back; the outermost one can no longer commit.
    rollback_only: bool,
}

/// On-disk layout used by [`InMemoryStore::load`] and [`InMemoryStore::save`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    next_ids: BTreeMap<String, RecordId>,
    #[serde(default)]
    records: Vec<Record>,
}

/// Map-backed reference store with snapshot transactions.
///
/// The outermost `begin` snapshots every table. A nested `rollback` only leaves its level
/// and dooms the enclosing transaction: the outermost `rollback` restores the snapshot, and
/// the outermost `commit` restores it too and fails.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store file; `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let file: StoreFile = if is_yaml(path) {
            serde_yaml::from_str(&text).map_err(|err| PublishError::from(err).context(path.display()))?
        } else if text.trim().is_empty() {
            StoreFile::default()
        } else {
            serde_json::from_str(&text).map_err(|err| PublishError::from(err).context(path.display()))?
        };

        let store = Self::new();
        {
            let mut state = store.state.lock();
            for record in file.records {
                let id = record.id.ok_or_else(|| {
                    PublishError::Storage(format!(
                        "{}: stored {} record has no id",
                        path.display(),
                        record.model
                    ))
                })?;
                let table = state.tables.entry(record.model.clone()).or_default();
                table.next_id = table.next_id.max(id + 1);
                table.rows.insert(id, record);
            }
            for (model, next_id) in file.next_ids {
                let table = state.tables.entry(model).or_default();
                table.next_id = table.next_id.max(next_id);
            }
        }
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PublishError> {
        let path = path.as_ref();
        let file = {
            let state = self.state.lock();
            StoreFile {
                next_ids: state
                    .tables
                    .iter()
                    .map(|(model, table)| (model.clone(), table.next_id))
                    .collect(),
                records: state
                    .tables
                    .values()
                    .flat_map(|table| table.rows.values().cloned())
                    .collect(),
            }
        };
        let text = if is_yaml(path) {
            serde_yaml::to_string(&file)?
        } else {
            let mut text = serde_json::to_string_pretty(&file)?;
            text.push('\n');
            text
        };
        fs::write(path, text)?;
        Ok(())
    }

    /// Every stored record, ordered by model then id.
    pub fn records(&self) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .values()
            .flat_map(|table| table.rows.values().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .tables
            .values()
            .map(|table| table.rows.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn models(&self) -> Vec<String> {
        self.state.lock().tables.keys().cloned().collect()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().depth > 0
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

impl RecordStore for InMemoryStore {
    fn get(&self, model: &str, id: RecordId) -> Result<Option<Record>, PublishError> {
        Ok(self
            .state
            .lock()
            .tables
            .get(model)
            .and_then(|table| table.rows.get(&id))
            .cloned())
    }

    fn insert(&self, mut record: Record) -> Result<Record, PublishError> {
        let mut state = self.state.lock();
        let table = state.tables.entry(record.model.clone()).or_default();
        let id = match record.id {
            Some(id) if table.rows.contains_key(&id) => {
                return Err(PublishError::Storage(format!(
                    "{}#{id} already exists",
                    record.model
                )));
            }
            Some(id) => {
                table.next_id = table.next_id.max(id + 1);
                id
            }
            None => table.allocate(),
        };
        record.id = Some(id);
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, record: &Record) -> Result<(), PublishError> {
        let id = record.id.ok_or_else(|| {
            PublishError::Storage(format!("cannot update unsaved {} record", record.model))
        })?;
        let mut state = self.state.lock();
        let row = state
            .tables
            .get_mut(&record.model)
            .and_then(|table| table.rows.get_mut(&id))
            .ok_or_else(|| {
                PublishError::Storage(format!("{}#{id} does not exist", record.model))
            })?;
        *row = record.clone();
        Ok(())
    }

    fn remove(&self, model: &str, id: RecordId) -> Result<bool, PublishError> {
        Ok(self
            .state
            .lock()
            .tables
            .get_mut(model)
            .and_then(|table| table.rows.remove(&id))
            .is_some())
    }

    fn select(&self, model: &str, selection: Selection) -> Result<Vec<Record>, PublishError> {
        Ok(self
            .state
            .lock()
            .tables
            .get(model)
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter(|record| selection.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn referencing(
        &self,
        model: &str,
        field: &str,
        id: RecordId,
    ) -> Result<Vec<Record>, PublishError> {
        let target = FieldValue::Reference(id);
        Ok(self
            .state
            .lock()
            .tables
            .get(model)
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter(|record| record.get(field) == Some(&target))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn begin(&self) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        if state.depth == 0 {
            state.snapshot = Some(state.tables.clone());
        }
        state.depth += 1;
        Ok(())
    }

    fn commit(&self) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        if state.depth == 0 {
            return Err(PublishError::Storage("commit without transaction".into()));
        }
        state.depth -= 1;
        if state.depth > 0 {
            return Ok(());
        }

        let snapshot = state.snapshot.take();
        if std::mem::take(&mut state.rollback_only) {
            if let Some(snapshot) = snapshot {
                state.tables = snapshot;
            }
            return Err(PublishError::Storage(
                "transaction was rolled back by a nested operation".into(),
            ));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), PublishError> {
        let mut state = self.state.lock();
        if state.depth == 0 {
            return Err(PublishError::Storage("rollback without transaction".into()));
        }
        state.depth -= 1;
        if state.depth > 0 {
            state.rollback_only = true;
            return Ok(());
        }

        if let Some(snapshot) = state.snapshot.take() {
            state.tables = snapshot;
        }
        state.rollback_only = false;
        Ok(())
    }
}
