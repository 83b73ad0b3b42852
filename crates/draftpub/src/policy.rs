use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::record::{FieldValue, Record};

/// Computes the public value of a function-mapped field from the draft and the field name.
pub type PublishFunction = Arc<dyn Fn(&Record, &str) -> FieldValue + Send + Sync>;

/// Declared class of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Plain,
    Reference { target: String },
    ManyToMany { target: String },
}

/// Children of `child_model` whose `parent_field` references the owning record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseRelation {
    pub name: String,
    pub child_model: String,
    pub parent_field: String,
}

impl ReverseRelation {
    pub fn new(
        name: impl Into<String>,
        child_model: impl Into<String>,
        parent_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            child_model: child_model.into(),
            parent_field: parent_field.into(),
        }
    }
}

/// Many-to-many relation carried by an intermediate association model, optionally ordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughRelation {
    pub name: String,
    pub target: String,
    pub through_model: String,
    pub source_field: String,
    pub target_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_field: Option<String>,
}

/// How the copy step treats a single field.
pub enum FieldClass<'a> {
    Excluded,
    Function(&'a PublishFunction),
    Plain,
    Reference(&'a str),
    ManyToMany(&'a str),
}

/// Static copy policy of one model.
#[derive(Clone)]
pub struct ModelPolicy {
    model: String,
    publishable: bool,
    fields: BTreeMap<String, FieldKind>,
    excluded: BTreeSet<String>,
    functions: BTreeMap<String, PublishFunction>,
    reverse: Vec<ReverseRelation>,
    cascade: Vec<ReverseRelation>,
    through: Vec<ThroughRelation>,
}

impl fmt::Debug for ModelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelPolicy")
            .field("model", &self.model)
            .field("publishable", &self.publishable)
            .field("fields", &self.fields)
            .field("excluded", &self.excluded)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("reverse", &self.reverse)
            .field("cascade", &self.cascade)
            .field("through", &self.through)
            .finish()
    }
}

impl ModelPolicy {
    /// Policy for a model with a draft/public duality.
    pub fn publishable(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            publishable: true,
            fields: BTreeMap::new(),
            excluded: BTreeSet::new(),
            functions: BTreeMap::new(),
            reverse: Vec::new(),
            cascade: Vec::new(),
            through: Vec::new(),
        }
    }

    /// Policy for a plain model; references to it are copied as-is.
    pub fn plain(model: impl Into<String>) -> Self {
        Self {
            publishable: false,
            ..Self::publishable(model)
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldKind::Plain);
        self
    }

    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldKind::Reference {
                target: target.into(),
            },
        );
        self
    }

    pub fn many_to_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldKind::ManyToMany {
                target: target.into(),
            },
        );
        self
    }

    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded.insert(name.into());
        self
    }

    pub fn function(mut self, name: impl Into<String>, function: PublishFunction) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    /// Declares owned children, published and pruned together with this record.
    pub fn reverse(
        mut self,
        name: impl Into<String>,
        child_model: impl Into<String>,
        parent_field: impl Into<String>,
    ) -> Self {
        self.reverse
            .push(ReverseRelation::new(name, child_model, parent_field));
        self
    }

    /// Declares dependents that are never published but are removed with the public record.
    pub fn cascade(
        mut self,
        name: impl Into<String>,
        child_model: impl Into<String>,
        parent_field: impl Into<String>,
    ) -> Self {
        self.cascade
            .push(ReverseRelation::new(name, child_model, parent_field));
        self
    }

    /// Declares a many-to-many relation stored in `relation.through_model`. The association
    /// records are owned children of this record.
    pub fn through(mut self, relation: ThroughRelation) -> Self {
        self.reverse.push(ReverseRelation::new(
            relation.name.clone(),
            relation.through_model.clone(),
            relation.source_field.clone(),
        ));
        self.through.push(relation);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_publishable(&self) -> bool {
        self.publishable
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }

    pub fn declared_fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), kind))
    }

    pub fn kind(&self, name: &str) -> Option<&FieldKind> {
        self.fields.get(name)
    }

    pub fn function_fields(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn function_for(&self, name: &str) -> Option<&PublishFunction> {
        self.functions.get(name)
    }

    /// Owned reverse relations taking part in publication, through-model associations included.
    pub fn reverse_relations(&self) -> impl Iterator<Item = &ReverseRelation> {
        self.reverse
            .iter()
            .filter(|relation| !self.excluded.contains(&relation.name))
    }

    pub fn cascade_relations(&self) -> impl Iterator<Item = &ReverseRelation> {
        self.cascade.iter()
    }

    pub fn through_relation(&self, name: &str) -> Option<&ThroughRelation> {
        self.through.iter().find(|relation| relation.name == name)
    }

    pub fn classify(&self, name: &str) -> FieldClass<'_> {
        if self.is_excluded(name) {
            return FieldClass::Excluded;
        }
        if let Some(function) = self.function_for(name) {
            return FieldClass::Function(function);
        }
        match self.kind(name) {
            Some(FieldKind::Reference { target }) => FieldClass::Reference(target),
            Some(FieldKind::ManyToMany { target }) => FieldClass::ManyToMany(target),
            Some(FieldKind::Plain) | None => FieldClass::Plain,
        }
    }
}

/// Copy policies keyed by model name.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    policies: BTreeMap<String, ModelPolicy>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, policy: ModelPolicy) -> &mut Self {
        self.policies.insert(policy.model.clone(), policy);
        self
    }

    pub fn with(mut self, policy: ModelPolicy) -> Self {
        self.register(policy);
        self
    }

    pub fn policy(&self, model: &str) -> Result<&ModelPolicy, PublishError> {
        self.policies
            .get(model)
            .ok_or_else(|| PublishError::UnknownModel(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.policies.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Checks that every relation points at a registered model and that reverse relations
    /// are backed by a reference field on the child pointing back at the owner.
    pub fn validate(&self) -> Result<(), PublishError> {
        for policy in self.policies.values() {
            for (name, kind) in policy.declared_fields() {
                if let FieldKind::Reference { target } | FieldKind::ManyToMany { target } = kind {
                    if !self.contains(target) {
                        return Err(PublishError::Schema(format!(
                            "{}.{name} targets unregistered model {target}",
                            policy.model
                        )));
                    }
                }
            }

            for relation in policy.reverse.iter().chain(policy.cascade.iter()) {
                let child = self.policy(&relation.child_model).map_err(|_| {
                    PublishError::Schema(format!(
                        "{}.{} refers to unregistered model {}",
                        policy.model, relation.name, relation.child_model
                    ))
                })?;
                match child.kind(&relation.parent_field) {
                    Some(FieldKind::Reference { target }) if *target == policy.model => {}
                    _ => {
                        return Err(PublishError::Schema(format!(
                            "{}.{} must be a reference to {}",
                            relation.child_model, relation.parent_field, policy.model
                        )));
                    }
                }
            }

            for relation in &policy.through {
                let through = self.policy(&relation.through_model)?;
                if !through.is_publishable() && policy.is_publishable() {
                    return Err(PublishError::Schema(format!(
                        "association model {} of {}.{} must be publishable",
                        relation.through_model, policy.model, relation.name
                    )));
                }
                match through.kind(&relation.target_field) {
                    Some(FieldKind::Reference { target }) if *target == relation.target => {}
                    _ => {
                        return Err(PublishError::Schema(format!(
                            "{}.{} must be a reference to {}",
                            relation.through_model, relation.target_field, relation.target
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Built-in transform functions.
pub mod functions {
    use chrono::Utc;

    use super::PublishFunction;
    use crate::record::FieldValue;
    use std::sync::Arc;

    /// Freezes the field at the moment of publication.
    pub fn now() -> PublishFunction {
        Arc::new(|_, _| FieldValue::Timestamp(Utc::now()))
    }

    /// Always publishes `value`, whatever the draft holds.
    pub fn constant(value: FieldValue) -> PublishFunction {
        Arc::new(move |_, _| value.clone())
    }

    pub fn null() -> PublishFunction {
        constant(FieldValue::Null)
    }

    /// Resolves a function by the name used in schema files.
    pub fn builtin(name: &str) -> Option<PublishFunction> {
        match name {
            "now" => Some(now()),
            "null" => Some(null()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_policy() -> ModelPolicy {
        ModelPolicy::publishable("page")
            .field("slug")
            .reference("parent", "page")
            .many_to_many("authors", "author")
            .many_to_many("log", "change_log")
            .exclude("log")
            .function("pub_date", functions::null())
            .reverse("blocks", "page_block", "page")
    }

    fn registry() -> Registry {
        Registry::new()
            .with(page_policy())
            .with(ModelPolicy::publishable("author").field("name"))
            .with(ModelPolicy::plain("change_log").field("message"))
            .with(
                ModelPolicy::publishable("page_block")
                    .reference("page", "page")
                    .field("content"),
            )
    }

    #[test]
    fn classify_prefers_exclusion_then_function() {
        let policy = page_policy();
        assert!(matches!(policy.classify("log"), FieldClass::Excluded));
        assert!(matches!(policy.classify("pub_date"), FieldClass::Function(_)));
        assert!(matches!(policy.classify("parent"), FieldClass::Reference("page")));
        assert!(matches!(
            policy.classify("authors"),
            FieldClass::ManyToMany("author")
        ));
        assert!(matches!(policy.classify("slug"), FieldClass::Plain));
        assert!(matches!(policy.classify("undeclared"), FieldClass::Plain));
    }

    #[test]
    fn excluded_relation_keeps_its_declared_kind() {
        let policy = page_policy();
        assert!(policy.is_excluded("log"));
        assert!(matches!(
            policy.kind("log"),
            Some(FieldKind::ManyToMany { target }) if target == "change_log"
        ));
        assert!(policy.function_for("pub_date").is_some());
        assert!(policy.function_for("slug").is_none());
    }

    #[test]
    fn validate_accepts_consistent_registry() {
        registry().validate().expect("registry should validate");
    }

    #[test]
    fn validate_rejects_unregistered_targets() {
        let registry = Registry::new().with(page_policy());
        let err = registry.validate().expect_err("author is not registered");
        assert!(matches!(err, PublishError::Schema(_)), "{err}");
    }

    #[test]
    fn validate_rejects_reverse_without_back_reference() {
        let registry = registry().with(ModelPolicy::publishable("page_block").field("content"));
        let err = registry.validate().expect_err("page_block.page missing");
        assert!(err.to_string().contains("page_block.page"), "{err}");
    }

    #[test]
    fn through_relation_registers_owned_children() {
        let policy = ModelPolicy::publishable("page").through(ThroughRelation {
            name: "tags".into(),
            target: "tag".into(),
            through_model: "page_tag_order".into(),
            source_field: "tagged_page".into(),
            target_field: "page_tag".into(),
            order_field: Some("tag_order".into()),
        });
        let reverse: Vec<_> = policy.reverse_relations().collect();
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].child_model, "page_tag_order");
        assert_eq!(reverse[0].parent_field, "tagged_page");
        assert!(policy.through_relation("tags").is_some());
    }

    #[test]
    fn unknown_builtin_function_is_none() {
        assert!(functions::builtin("now").is_some());
        assert!(functions::builtin("tomorrow").is_none());
    }
}
