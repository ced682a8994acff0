//! The top-level datafile: attributes, segments, and features.

use super::condition::Condition;
use super::feature::Feature;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub capture: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub key: String,
    pub conditions: Condition,
}

/// The full, parsed datafile: the unit that gets atomically swapped into an
/// [`crate::instance::Instance`] on construction and on every successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    pub schema_version: String,
    pub revision: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Datafile {
    /// An empty datafile used before the first successful fetch, so instance
    /// construction never has to hold an `Option<Datafile>` internally.
    pub fn empty() -> Self {
        Self {
            schema_version: String::new(),
            revision: String::new(),
            attributes: Vec::new(),
            segments: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn feature(&self, key: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.key == key)
    }

    pub fn segment(&self, key: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.key == key)
    }

    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    /// Structural (non-schema) consistency check: segment references from any
    /// feature's force/traffic predicates, and required-feature keys, must exist.
    /// Returns human-readable warnings; never rejects the datafile (§4.9).
    pub fn structural_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let feature_keys: std::collections::HashSet<&str> =
            self.features.iter().map(|f| f.key.as_str()).collect();
        let segment_keys: std::collections::HashSet<&str> =
            self.segments.iter().map(|s| s.key.as_str()).collect();

        for feature in &self.features {
            for required in &feature.required {
                if !feature_keys.contains(required.key()) {
                    warnings.push(format!(
                        "feature '{}' requires unknown feature '{}'",
                        feature.key,
                        required.key()
                    ));
                }
            }
            for traffic in &feature.traffic {
                collect_segment_warnings(
                    &feature.key,
                    &traffic.predicate,
                    &segment_keys,
                    &mut warnings,
                );
            }
            for force in &feature.force {
                collect_segment_warnings(
                    &feature.key,
                    &force.predicate,
                    &segment_keys,
                    &mut warnings,
                );
            }
        }
        warnings
    }
}

fn collect_segment_warnings(
    feature_key: &str,
    predicate: &super::condition::Predicate,
    segment_keys: &std::collections::HashSet<&str>,
    warnings: &mut Vec<String>,
) {
    use super::condition::{Predicate, SegmentRef};

    fn walk(
        feature_key: &str,
        seg: &SegmentRef,
        segment_keys: &std::collections::HashSet<&str>,
        warnings: &mut Vec<String>,
    ) {
        match seg {
            SegmentRef::Key(k) => {
                if k != SegmentRef::WILDCARD && !segment_keys.contains(k.as_str()) {
                    warnings.push(format!(
                        "feature '{feature_key}' references unknown segment '{k}'"
                    ));
                }
            }
            SegmentRef::List(list) => {
                for s in list {
                    walk(feature_key, s, segment_keys, warnings);
                }
            }
            SegmentRef::And { and } | SegmentRef::Or { or: and } | SegmentRef::Not { not: and } => {
                for s in and {
                    walk(feature_key, s, segment_keys, warnings);
                }
            }
        }
    }

    if let Predicate::Segments { segments: seg } = predicate {
        walk(feature_key, seg, segment_keys, warnings);
    }
}
