//! The recursive condition tree and the predicate shapes built on top of it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single leaf comparison: `attribute <operator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionLeaf {
    pub attribute: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

/// The fixed operator set. Spellings are part of the wire contract (§6) and must not
/// be renamed independently of the datafile format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    SemverEquals,
    SemverNotEquals,
    SemverGreaterThan,
    SemverGreaterThanOrEqual,
    SemverLessThan,
    SemverLessThanOrEqual,
    Before,
    After,
    Matches,
    Exists,
    NotExists,
}

/// A recursive condition tree: a leaf, or a boolean combinator over child trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Leaf(ConditionLeaf),
    And { and: Vec<Condition> },
    Or { or: Vec<Condition> },
    Not { not: Vec<Condition> },
}

/// A predicate used by traffic rules, force entries, and variable overrides: either a
/// direct condition tree under `conditions`, or a reference to one or more named
/// segments under `segments`. Wrapped in named-field variants (rather than newtypes)
/// so `#[serde(flatten)]` on the owning struct reproduces the wire key exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Conditions { conditions: Condition },
    Segments { segments: SegmentRef },
}

impl Predicate {
    pub fn conditions(condition: Condition) -> Self {
        Predicate::Conditions { conditions: condition }
    }

    pub fn segments(segment: SegmentRef) -> Self {
        Predicate::Segments { segments: segment }
    }
}

/// Segment references may themselves be combined with `and`/`or`/`not`, or be a bare
/// list (implicitly conjunctive). The key `"*"` means "always matches".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentRef {
    Key(String),
    List(Vec<SegmentRef>),
    And { and: Vec<SegmentRef> },
    Or { or: Vec<SegmentRef> },
    Not { not: Vec<SegmentRef> },
}

impl SegmentRef {
    pub const WILDCARD: &'static str = "*";
}
