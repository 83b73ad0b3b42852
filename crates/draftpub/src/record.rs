use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Store-assigned identifier, scoped to a model.
pub type RecordId = u64;

/// Stable identity of a saved record: its model plus its id.
#[derive(
    Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct RecordKey {
    pub model: String,
    pub id: RecordId,
}

impl RecordKey {
    pub fn new(model: impl Into<String>, id: RecordId) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model, self.id)
    }
}

/// Publication lifecycle of a draft record.
#[derive(
    Clone,
    Copy,
    Debug,
    Serialize,
    Deserialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    /// In sync with the public snapshot, or never published.
    #[default]
    Default,
    /// Edited since the last publish.
    Changed,
    /// Marked for deletion; realized by the next publish.
    Delete,
}

impl PublishState {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishState::Default => "default",
            PublishState::Changed => "changed",
            PublishState::Delete => "delete",
        }
    }
}

/// Human-facing status shown next to a draft in listings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    NotYetPublished,
    Published,
    Changed,
    ToBeDeleted,
}

impl PublishStatus {
    pub fn label(self) -> &'static str {
        match self {
            PublishStatus::NotYetPublished => "Changed - not yet published",
            PublishStatus::Published => "Published",
            PublishStatus::Changed => "Changed",
            PublishStatus::ToBeDeleted => "To be deleted",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Value stored in a record field.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Single-valued relation to another record of the field's declared target model.
    Reference(RecordId),
    /// Ordered many-valued relation to records of the field's declared target model.
    References(Vec<RecordId>),
    /// Self-describing relation to one record; needs no declaration in the model policy.
    Link(RecordKey),
    /// Self-describing ordered collection of record references; needs no declaration.
    Links(Vec<RecordKey>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Relation holding bare ids, which only a declared field can resolve.
    pub fn is_bare_relation(&self) -> bool {
        matches!(self, FieldValue::Reference(_) | FieldValue::References(_))
    }

    pub fn as_links(&self) -> Option<&[RecordKey]> {
        match self {
            FieldValue::Links(keys) => Some(keys),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<RecordId> {
        match self {
            FieldValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_references(&self) -> Option<&[RecordId]> {
        match self {
            FieldValue::References(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<RecordKey> for FieldValue {
    fn from(value: RecordKey) -> Self {
        FieldValue::Link(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// A unit of publication. Drafts carry an optional link to their public snapshot; public
/// snapshots carry `is_public = true` and never link anywhere.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Record {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub publish_state: PublishState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<RecordId>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Unsaved draft of the given model.
    pub fn draft(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: None,
            is_public: false,
            publish_state: PublishState::Default,
            public_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Unsaved public snapshot of the given model.
    pub fn public(model: impl Into<String>) -> Self {
        Self {
            is_public: true,
            ..Self::draft(model)
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn key(&self) -> Option<RecordKey> {
        self.id.map(|id| RecordKey::new(self.model.clone(), id))
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn reference(&self, name: &str) -> Option<RecordId> {
        self.get(name).and_then(FieldValue::as_reference)
    }

    pub fn status(&self) -> PublishStatus {
        match (self.publish_state, self.public_id) {
            (PublishState::Delete, _) => PublishStatus::ToBeDeleted,
            (_, None) => PublishStatus::NotYetPublished,
            (PublishState::Changed, Some(_)) => PublishStatus::Changed,
            (PublishState::Default, Some(_)) => PublishStatus::Published,
        }
    }

    /// Field values with `exclude` removed, used to match plain dependents by content.
    pub(crate) fn content_without(&self, exclude: &str) -> BTreeMap<&str, &FieldValue> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != exclude)
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }
}
