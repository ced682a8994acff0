//! The feature definition and everything nested under it: variations, traffic,
//! allocations, force entries, and variable schemas.

use super::condition::Predicate;
use crate::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the bucket-key is assembled from context attributes for a given feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BucketBy {
    Single(String),
    And { and: Vec<String> },
    Or { or: Vec<String> },
}

impl Default for BucketBy {
    fn default() -> Self {
        BucketBy::Single("targetingKey".to_string())
    }
}

/// A half-open `[start, end)` interval over the bucket space `[0, 100000)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    pub fn contains(&self, bucket_value: u32) -> bool {
        bucket_value >= self.start && bucket_value < self.end
    }
}

/// One entry of a feature's `required` list: either a bare feature key, or a key plus
/// the specific variation the dependency must resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredFeature {
    Key(String),
    WithVariation {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        variation: Option<String>,
    },
}

impl RequiredFeature {
    pub fn key(&self) -> &str {
        match self {
            RequiredFeature::Key(k) => k,
            RequiredFeature::WithVariation { key, .. } => key,
        }
    }

    pub fn variation(&self) -> Option<&str> {
        match self {
            RequiredFeature::Key(_) => None,
            RequiredFeature::WithVariation { variation, .. } => variation.as_deref(),
        }
    }
}

/// A condition/segment-gated override of a single variable's value within a variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableOverride {
    #[serde(flatten)]
    pub predicate: Predicate,
    pub value: AttributeValue,
}

/// A per-variation override entry for a single variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationVariable {
    pub value: AttributeValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<VariableOverride>,
}

/// One possible outcome of a feature: its identifying value, plus any per-variable
/// overrides that apply when this variation is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub value: String,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, VariationVariable>,
}

/// A declared variable's type and fallback value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableType {
    Boolean,
    String,
    Integer,
    Double,
    Array,
    Object,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSchema {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub default_value: AttributeValue,
}

/// One allocation slice within a traffic rule: a variation plus the bucket range that
/// selects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub variation: String,
    pub range: Range,
}

/// A traffic rule: a predicate gate, optional direct overrides, a percentage, and the
/// allocation list it distributes across when the bucket value passes the percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
    pub key: String,
    #[serde(flatten)]
    pub predicate: Predicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, AttributeValue>,
    pub percentage: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocation: Vec<Allocation>,
}

/// A forced entry: the first entry whose predicate matches wins (§4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceEntry {
    #[serde(flatten)]
    pub predicate: Predicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, AttributeValue>,
}

/// A feature definition: everything needed to resolve enabled/variation/variable
/// decisions for a single feature key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub key: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, rename = "bucketBy")]
    pub bucket_by: BucketBy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<RequiredFeature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variations: Vec<Variation>,
    #[serde(default, rename = "variablesSchema", skip_serializing_if = "Vec::is_empty")]
    pub variables_schema: Vec<VariableSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traffic: Vec<Traffic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub force: Vec<ForceEntry>,
}

impl Feature {
    pub fn variation(&self, value: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.value == value)
    }

    pub fn variable_schema(&self, key: &str) -> Option<&VariableSchema> {
        self.variables_schema.iter().find(|v| v.key == key)
    }
}
