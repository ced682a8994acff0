//! Shared value types: the tagged attribute/variable value union and the evaluation context.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A single attribute or variable value.
///
/// This is the tagged union referenced throughout the evaluation pipeline: context
/// attributes, forced/sticky/initial override values, and resolved variable values
/// are all expressed with it. Typed accessors (`as_bool`, `as_str`, ...) pattern-match
/// rather than coercing, per the evaluation pipeline's typing rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<String>),
    Object(serde_json::Map<String, JsonValue>),
}

/// `#[serde(untagged)]` picks the first variant that parses, so a derived
/// `Deserialize` would never reach `Date` — every JSON string already parses as
/// `String` first. An RFC-3339 string must be recognized as a date before the
/// `String` fallback, which declaration order alone can't express.
impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(match value {
            JsonValue::Bool(b) => AttributeValue::Boolean(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    AttributeValue::Double(f)
                } else {
                    return Err(de::Error::custom("attribute value number out of range"));
                }
            }
            JsonValue::String(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => AttributeValue::Date(dt.with_timezone(&Utc)),
                Err(_) => AttributeValue::String(s),
            },
            JsonValue::Array(items) => {
                let strings = items
                    .into_iter()
                    .map(|item| match item {
                        JsonValue::String(s) => Ok(s),
                        other => Err(de::Error::custom(format!(
                            "expected string array element, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                AttributeValue::Array(strings)
            }
            JsonValue::Object(map) => AttributeValue::Object(map),
            JsonValue::Null => return Err(de::Error::custom("attribute value cannot be null")),
        })
    }
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Renders the value in its canonical bucket-key string form (see `bucket::build_key`).
    pub fn to_bucket_string(&self) -> String {
        match self {
            AttributeValue::Boolean(b) => b.to_string(),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Double(d) => format!("{d}"),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Date(d) => d.to_rfc3339(),
            AttributeValue::Array(items) => items.join(","),
            AttributeValue::Object(_) => String::new(),
        }
    }
}

/// Caller-supplied evaluation context: a mapping of attribute key to value.
///
/// Not retained beyond a single evaluation call; cheap to clone since it only ever
/// holds the handful of attributes a single decision depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context(pub HashMap<String, AttributeValue>);

impl Context {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AttributeValue) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    /// The `targetingKey`/attribute conventionally used as the bucketing identity.
    pub fn targeting_key(&self) -> Option<&str> {
        self.get("targetingKey").and_then(AttributeValue::as_str)
    }
}

impl From<HashMap<String, AttributeValue>> for Context {
    fn from(map: HashMap<String, AttributeValue>) -> Self {
        Self(map)
    }
}

/// A per-feature override entry, shared shape for both sticky and initial tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideFeature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, AttributeValue>,
}

/// A table of per-feature overrides, keyed by feature key. Used for both `stickyFeatures`
/// and `initialFeatures`.
pub type OverrideTable = HashMap<String, OverrideFeature>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_string_rendering() {
        assert_eq!(AttributeValue::Boolean(true).to_bucket_string(), "true");
        assert_eq!(AttributeValue::Integer(42).to_bucket_string(), "42");
        assert_eq!(
            AttributeValue::String("abc".into()).to_bucket_string(),
            "abc"
        );
    }

    #[test]
    fn context_targeting_key() {
        let mut ctx = Context::new();
        ctx.insert("targetingKey", AttributeValue::String("user-1".into()));
        assert_eq!(ctx.targeting_key(), Some("user-1"));
    }

    #[test]
    fn typed_accessors_mismatch_returns_none() {
        let v = AttributeValue::String("x".into());
        assert_eq!(v.as_bool(), None);
        assert_eq!(v.as_i64(), None);
    }

    #[test]
    fn rfc3339_string_deserializes_as_date() {
        let v: AttributeValue = serde_json::from_str(r#""2024-01-15T00:00:00Z""#).unwrap();
        assert!(matches!(v, AttributeValue::Date(_)));
        assert!(v.as_date().is_some());
    }

    #[test]
    fn non_date_string_deserializes_as_string() {
        let v: AttributeValue = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(v.as_str(), Some("admin"));
    }
}
