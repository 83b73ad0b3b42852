use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::policy::{ModelPolicy, Registry, ThroughRelation, functions};

/// Top-level layout of `.draftpub/schema.yaml`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaConfig {
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

/// Copy policy of one model as written in the schema file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default = "default_publishable")]
    pub publishable: bool,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    #[serde(default)]
    pub many_to_many: BTreeMap<String, String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Field name to built-in function name (`now`, `null`).
    #[serde(default)]
    pub functions: BTreeMap<String, String>,
    #[serde(default)]
    pub reverse: Vec<RelationConfig>,
    #[serde(default)]
    pub cascade: Vec<RelationConfig>,
    #[serde(default)]
    pub through: BTreeMap<String, ThroughConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            publishable: true,
            fields: Vec::new(),
            references: BTreeMap::new(),
            many_to_many: BTreeMap::new(),
            exclude: Vec::new(),
            functions: BTreeMap::new(),
            reverse: Vec::new(),
            cascade: Vec::new(),
            through: BTreeMap::new(),
        }
    }
}

fn default_publishable() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RelationConfig {
    pub name: String,
    pub model: String,
    pub field: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ThroughConfig {
    pub target: String,
    pub model: String,
    pub source: String,
    pub target_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

impl SchemaConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, PublishError> {
        serde_yaml::from_str(text).map_err(|err| PublishError::Schema(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|err| err.context(path.display()))
    }

    /// Builds and validates the policy registry described by this schema.
    pub fn into_registry(self) -> Result<Registry, PublishError> {
        let mut registry = Registry::new();
        for (model, config) in self.models {
            registry.register(config.into_policy(&model)?);
        }
        registry.validate()?;
        Ok(registry)
    }
}

impl ModelConfig {
    fn into_policy(self, model: &str) -> Result<ModelPolicy, PublishError> {
        let mut policy = if self.publishable {
            ModelPolicy::publishable(model)
        } else {
            ModelPolicy::plain(model)
        };

        for field in self.fields {
            policy = policy.field(field);
        }
        for (field, target) in self.references {
            policy = policy.reference(field, target);
        }
        for (field, target) in self.many_to_many {
            policy = policy.many_to_many(field, target);
        }
        for field in self.exclude {
            policy = policy.exclude(field);
        }
        for (field, name) in self.functions {
            let function = functions::builtin(&name).ok_or_else(|| {
                PublishError::Schema(format!("{model}.{field}: unknown function `{name}`"))
            })?;
            policy = policy.function(field, function);
        }
        for relation in self.reverse {
            policy = policy.reverse(relation.name, relation.model, relation.field);
        }
        for relation in self.cascade {
            policy = policy.cascade(relation.name, relation.model, relation.field);
        }
        for (name, through) in self.through {
            policy = policy.through(ThroughRelation {
                name,
                target: through.target,
                through_model: through.model,
                source_field: through.source,
                target_field: through.target_field,
                order_field: through.order,
            });
        }
        Ok(policy)
    }
}
