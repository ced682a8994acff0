//! Sticky and initial override tables (§3, §4.6). Same shape, different precedence:
//! sticky always wins; initial only applies per the asymmetric rule documented in
//! DESIGN.md.

use crate::types::{AttributeValue, OverrideFeature, OverrideTable};

/// A thin read-only view over an override table, used identically for both the
/// sticky and the initial tables by the evaluation pipeline.
#[derive(Debug, Clone, Default)]
pub struct Overrides(pub OverrideTable);

impl Overrides {
    pub fn new() -> Self {
        Self(OverrideTable::new())
    }

    pub fn feature(&self, key: &str) -> Option<&OverrideFeature> {
        self.0.get(key)
    }

    pub fn enabled(&self, key: &str) -> Option<bool> {
        self.feature(key).and_then(|f| f.enabled)
    }

    pub fn variation(&self, key: &str) -> Option<&str> {
        self.feature(key).and_then(|f| f.variation.as_deref())
    }

    pub fn variable(&self, key: &str, variable_key: &str) -> Option<&AttributeValue> {
        self.feature(key).and_then(|f| f.variables.get(variable_key))
    }
}

impl From<OverrideTable> for Overrides {
    fn from(table: OverrideTable) -> Self {
        Self(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_feature_has_no_overrides() {
        let overrides = Overrides::new();
        assert_eq!(overrides.enabled("foo"), None);
        assert_eq!(overrides.variation("foo"), None);
    }

    #[test]
    fn present_feature_exposes_fields() {
        let mut table = OverrideTable::new();
        table.insert(
            "foo".to_string(),
            OverrideFeature {
                enabled: Some(true),
                variation: Some("A".into()),
                variables: Default::default(),
            },
        );
        let overrides = Overrides::from(table);
        assert_eq!(overrides.enabled("foo"), Some(true));
        assert_eq!(overrides.variation("foo"), Some("A"));
    }
}
