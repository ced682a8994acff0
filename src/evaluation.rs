//! The evaluation pipeline (§4.6): three entry points, each with its own precedence
//! ladder, all expressed as a single `reason`-tagged sum type. Never throws — every
//! failure mode is encoded in `reason`.

use crate::bucket;
use crate::force;
use crate::model::Datafile;
use crate::overrides::Overrides;
use crate::targeting;
use crate::traffic;
use crate::types::{AttributeValue, Context};
use serde::{Deserialize, Serialize};

/// Why an evaluation resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reason {
    NotFound,
    NoVariations,
    Disabled,
    Required,
    OutOfRange,
    Forced,
    Initial,
    Sticky,
    Rule,
    Allocated,
    Defaulted,
    Override,
    /// The source's "no match" terminal reason; preserved for wire compatibility
    /// though `noMatch` would read more clearly (see DESIGN.md).
    Error,
}

/// The result of `evaluateFlag`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagEvaluation {
    pub feature_key: String,
    pub reason: Reason,
    pub enabled: bool,
}

/// The result of `evaluateVariation`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationEvaluation {
    pub feature_key: String,
    pub reason: Reason,
    pub variation: Option<String>,
}

/// The result of `evaluateVariable`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableEvaluation {
    pub feature_key: String,
    pub variable_key: String,
    pub reason: Reason,
    pub value: Option<AttributeValue>,
}

/// Inputs shared by all three evaluation entries.
pub struct EvaluationInputs<'a> {
    pub datafile: &'a Datafile,
    pub sticky: &'a Overrides,
    pub initial: &'a Overrides,
    pub is_ready: bool,
    pub bucket_key_separator: &'a str,
}

/// `evaluateFlag`: resolves whether `feature_key` is enabled.
///
/// `original_context` and `final_context` may be the same value when no
/// `interceptContext` hook is configured. Forced-entry matching (§4.6 step 6)
/// intentionally uses `original_context`; bucketing and traffic matching use
/// `final_context` — see DESIGN.md.
pub fn evaluate_flag(
    feature_key: &str,
    original_context: &Context,
    final_context: &Context,
    inputs: &EvaluationInputs,
) -> FlagEvaluation {
    let mk = |reason, enabled| FlagEvaluation {
        feature_key: feature_key.to_string(),
        reason,
        enabled,
    };

    if let Some(enabled) = inputs.sticky.enabled(feature_key) {
        return mk(Reason::Sticky, enabled);
    }

    // Flag-path `initial` fires when the instance IS ready; this mirrors the
    // asymmetry against variation/variable evaluation documented in DESIGN.md.
    if inputs.is_ready {
        if let Some(enabled) = inputs.initial.enabled(feature_key) {
            return mk(Reason::Initial, enabled);
        }
    }

    let feature = match inputs.datafile.feature(feature_key) {
        Some(f) => f,
        None => return mk(Reason::NotFound, false),
    };

    if feature.deprecated {
        tracing::warn!(feature = feature_key, "evaluating deprecated feature");
    }

    if let Some(forced) = force::match_force(feature, original_context, inputs.datafile) {
        if let Some(enabled) = forced.enabled {
            return mk(Reason::Forced, enabled);
        }
    }

    for required in &feature.required {
        let dep = evaluate_flag(required.key(), original_context, final_context, inputs);
        if !dep.enabled {
            return mk(Reason::Required, false);
        }
        if let Some(expected_variation) = required.variation() {
            let dep_variation =
                evaluate_variation(required.key(), original_context, final_context, inputs);
            if dep_variation.variation.as_deref() != Some(expected_variation) {
                return mk(Reason::Required, false);
            }
        }
    }

    let bucket_value = bucket::bucket_value(
        feature,
        final_context,
        inputs.bucket_key_separator,
        None,
        None,
    );

    if !feature.ranges.is_empty() {
        return match traffic::match_range(feature, bucket_value) {
            Some(_) => mk(Reason::Allocated, true),
            None => mk(Reason::OutOfRange, false),
        };
    }

    let matched = match traffic::match_traffic(feature, final_context, inputs.datafile) {
        Some(m) => m,
        None => return mk(Reason::Error, false),
    };

    if let Some(enabled) = matched.traffic.enabled {
        return mk(Reason::Override, enabled);
    }

    if bucket_value < matched.traffic.percentage {
        mk(Reason::Rule, true)
    } else {
        mk(Reason::Error, false)
    }
}

/// `evaluateVariation`: resolves which variation applies to `feature_key`.
///
/// See [`evaluate_flag`] for the `original_context`/`final_context` split.
pub fn evaluate_variation(
    feature_key: &str,
    original_context: &Context,
    final_context: &Context,
    inputs: &EvaluationInputs,
) -> VariationEvaluation {
    let mk = |reason, variation: Option<String>| VariationEvaluation {
        feature_key: feature_key.to_string(),
        reason,
        variation,
    };

    let flag_eval = evaluate_flag(feature_key, original_context, final_context, inputs);
    if !flag_eval.enabled {
        return mk(Reason::Disabled, None);
    }

    if let Some(variation) = inputs.sticky.variation(feature_key) {
        return mk(Reason::Sticky, Some(variation.to_string()));
    }

    if !inputs.is_ready {
        if let Some(variation) = inputs.initial.variation(feature_key) {
            return mk(Reason::Initial, Some(variation.to_string()));
        }
    }

    let feature = match inputs.datafile.feature(feature_key) {
        Some(f) => f,
        None => return mk(Reason::NotFound, None),
    };

    if feature.variations.is_empty() {
        return mk(Reason::NoVariations, None);
    }

    if let Some(forced) = force::match_force(feature, original_context, inputs.datafile) {
        if let Some(variation) = &forced.variation {
            if feature.variation(variation).is_some() {
                return mk(Reason::Forced, Some(variation.clone()));
            }
        }
    }

    let bucket_value = bucket::bucket_value(
        feature,
        final_context,
        inputs.bucket_key_separator,
        None,
        None,
    );

    let matched = match traffic::match_traffic(feature, final_context, inputs.datafile) {
        Some(m) => m,
        None => return mk(Reason::Error, None),
    };

    if let Some(variation) = &matched.traffic.variation {
        if feature.variation(variation).is_some() {
            return mk(Reason::Rule, Some(variation.clone()));
        }
    }

    if let Some(allocation) = traffic::match_allocation(matched.traffic, bucket_value) {
        if feature.variation(&allocation.variation).is_some() {
            return mk(Reason::Allocated, Some(allocation.variation.clone()));
        }
    }

    mk(Reason::Error, None)
}

/// `evaluateVariable`: resolves the value of `variable_key` within `feature_key`,
/// falling back to the variable's schema default.
///
/// See [`evaluate_flag`] for the `original_context`/`final_context` split.
pub fn evaluate_variable(
    feature_key: &str,
    variable_key: &str,
    original_context: &Context,
    final_context: &Context,
    inputs: &EvaluationInputs,
) -> VariableEvaluation {
    let mk = |reason, value: Option<AttributeValue>| VariableEvaluation {
        feature_key: feature_key.to_string(),
        variable_key: variable_key.to_string(),
        reason,
        value,
    };

    let flag_eval = evaluate_flag(feature_key, original_context, final_context, inputs);
    if !flag_eval.enabled {
        return mk(Reason::Disabled, None);
    }

    if let Some(value) = inputs.sticky.variable(feature_key, variable_key) {
        return mk(Reason::Sticky, Some(value.clone()));
    }

    if !inputs.is_ready {
        if let Some(value) = inputs.initial.variable(feature_key, variable_key) {
            return mk(Reason::Initial, Some(value.clone()));
        }
    }

    let feature = match inputs.datafile.feature(feature_key) {
        Some(f) => f,
        None => return mk(Reason::NotFound, None),
    };

    let schema = match feature.variable_schema(variable_key) {
        Some(s) => s,
        None => return mk(Reason::NotFound, None),
    };

    if let Some(forced) = force::match_force(feature, original_context, inputs.datafile) {
        if let Some(value) = forced.variables.get(variable_key) {
            return mk(Reason::Forced, Some(value.clone()));
        }
    }

    let bucket_value = bucket::bucket_value(
        feature,
        final_context,
        inputs.bucket_key_separator,
        None,
        None,
    );

    if let Some(matched) = traffic::match_traffic(feature, final_context, inputs.datafile) {
        if let Some(value) = matched.traffic.variables.get(variable_key) {
            return mk(Reason::Rule, Some(value.clone()));
        }

        if let Some(allocation) = traffic::match_allocation(matched.traffic, bucket_value) {
            if let Some(variation) = feature.variation(&allocation.variation) {
                if let Some(variable) = variation.variables.get(variable_key) {
                    for ovr in &variable.overrides {
                        if targeting::matches(&ovr.predicate, final_context, inputs.datafile) {
                            return mk(Reason::Override, Some(ovr.value.clone()));
                        }
                    }
                    return mk(Reason::Allocated, Some(variable.value.clone()));
                }
            }
        }
    }

    mk(Reason::Defaulted, Some(schema.default_value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Allocation, BucketBy, Condition, ConditionLeaf, Feature, ForceEntry, Operator, Predicate,
        Range, RequiredFeature, SegmentRef, Traffic, VariableSchema, VariableType, Variation,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn always_true() -> Predicate {
        Predicate::segments(SegmentRef::Key("*".into()))
    }

    fn base_feature(key: &str) -> Feature {
        Feature {
            key: key.to_string(),
            deprecated: false,
            bucket_by: BucketBy::Single("userId".into()),
            ranges: Vec::new(),
            required: Vec::new(),
            variations: Vec::new(),
            variables_schema: Vec::new(),
            traffic: Vec::new(),
            force: Vec::new(),
        }
    }

    fn inputs<'a>(
        datafile: &'a Datafile,
        sticky: &'a Overrides,
        initial: &'a Overrides,
        is_ready: bool,
    ) -> EvaluationInputs<'a> {
        EvaluationInputs {
            datafile,
            sticky,
            initial,
            is_ready,
            bucket_key_separator: ".",
        }
    }

    #[test]
    fn not_found_for_missing_feature() {
        let datafile = Datafile::empty();
        let sticky = Overrides::new();
        let initial = Overrides::new();
        let eval = evaluate_flag(
            "missing",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::NotFound);
        assert!(!eval.enabled);
    }

    #[test]
    fn range_allocation_splits_population() {
        let mut feature = base_feature("foo");
        feature.ranges = vec![Range { start: 0, end: 100_000 }];
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);
        let sticky = Overrides::new();
        let initial = Overrides::new();
        let eval = evaluate_flag(
            "foo",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Allocated);
        assert!(eval.enabled);
    }

    #[test]
    fn out_of_range_disables() {
        let mut feature = base_feature("foo");
        feature.ranges = vec![Range { start: 0, end: 1 }];
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);
        let sticky = Overrides::new();
        let initial = Overrides::new();
        let mut ctx = Context::new();
        ctx.insert("userId", AttributeValue::String("user-does-not-hash-to-zero".into()));
        let eval = evaluate_flag(
            "foo",
            &ctx,
            &ctx,
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::OutOfRange);
        assert!(!eval.enabled);
    }

    #[test]
    fn forced_override_wins_before_traffic() {
        let mut feature = base_feature("foo");
        feature.force.push(ForceEntry {
            predicate: Predicate::conditions(Condition::Leaf(ConditionLeaf {
                attribute: "userId".into(),
                operator: Operator::Equals,
                value: Some(json!("admin")),
            })),
            enabled: Some(false),
            variation: Some("A".into()),
            variables: HashMap::new(),
        });
        feature.traffic.push(Traffic {
            key: "rule".into(),
            predicate: always_true(),
            enabled: None,
            variation: None,
            variables: HashMap::new(),
            percentage: 100_000,
            allocation: vec![],
        });
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);
        let sticky = Overrides::new();
        let initial = Overrides::new();
        let mut ctx = Context::new();
        ctx.insert("userId", AttributeValue::String("admin".into()));
        let eval = evaluate_flag(
            "foo",
            &ctx,
            &ctx,
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Forced);
        assert!(!eval.enabled);
    }

    #[test]
    fn required_dependency_disables_dependent() {
        let mut foo = base_feature("foo");
        foo.variations = vec![
            Variation {
                value: "A".into(),
                weight: None,
                variables: HashMap::new(),
            },
            Variation {
                value: "B".into(),
                weight: None,
                variables: HashMap::new(),
            },
        ];
        foo.traffic.push(Traffic {
            key: "rule".into(),
            predicate: always_true(),
            enabled: None,
            variation: Some("A".into()),
            variables: HashMap::new(),
            percentage: 100_000,
            allocation: vec![],
        });

        let mut bar = base_feature("bar");
        bar.required = vec![RequiredFeature::WithVariation {
            key: "foo".into(),
            variation: Some("B".into()),
        }];
        bar.traffic.push(Traffic {
            key: "rule".into(),
            predicate: always_true(),
            enabled: None,
            variation: None,
            variables: HashMap::new(),
            percentage: 100_000,
            allocation: vec![],
        });

        let mut datafile = Datafile::empty();
        datafile.features.push(foo);
        datafile.features.push(bar);

        let sticky = Overrides::new();
        let initial = Overrides::new();
        let eval = evaluate_flag(
            "bar",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Required);
        assert!(!eval.enabled);
    }

    #[test]
    fn sticky_beats_everything() {
        let datafile = Datafile::empty();
        let mut table = HashMap::new();
        table.insert(
            "foo".to_string(),
            crate::types::OverrideFeature {
                enabled: Some(true),
                variation: Some("Z".into()),
                variables: HashMap::new(),
            },
        );
        let sticky = Overrides::from(table);
        let initial = Overrides::new();
        let eval = evaluate_flag(
            "foo",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Sticky);
        assert!(eval.enabled);

        let var_eval = evaluate_variation(
            "foo",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(var_eval.reason, Reason::Sticky);
        assert_eq!(var_eval.variation.as_deref(), Some("Z"));
    }

    #[test]
    fn variable_falls_back_to_schema_default() {
        let mut feature = base_feature("foo");
        feature.ranges = vec![Range { start: 0, end: 100_000 }];
        feature.variables_schema.push(VariableSchema {
            key: "color".into(),
            kind: VariableType::String,
            default_value: AttributeValue::String("blue".into()),
        });
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);

        let sticky = Overrides::new();
        let initial = Overrides::new();
        let eval = evaluate_variable(
            "foo",
            "color",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Defaulted);
        assert_eq!(eval.value, Some(AttributeValue::String("blue".into())));
    }

    #[test]
    fn variable_not_found_for_unknown_key() {
        let feature = base_feature("foo");
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);
        let sticky = Overrides::new();
        let initial = Overrides::new();
        let eval = evaluate_variable(
            "foo",
            "missing",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::NotFound);
    }

    #[test]
    fn allocation_variation_used_when_traffic_has_none() {
        let mut feature = base_feature("foo");
        feature.variations = vec![
            Variation {
                value: "A".into(),
                weight: None,
                variables: HashMap::new(),
            },
            Variation {
                value: "B".into(),
                weight: None,
                variables: HashMap::new(),
            },
        ];
        feature.traffic.push(Traffic {
            key: "rule".into(),
            predicate: always_true(),
            enabled: None,
            variation: None,
            variables: HashMap::new(),
            percentage: 100_000,
            allocation: vec![Allocation {
                variation: "B".into(),
                range: Range { start: 0, end: 100_000 },
            }],
        });
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);
        let sticky = Overrides::new();
        let initial = Overrides::new();
        let eval = evaluate_variation(
            "foo",
            &Context::new(),
            &Context::new(),
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Allocated);
        assert_eq!(eval.variation.as_deref(), Some("B"));
    }

    #[test]
    fn forced_entry_matches_on_original_context_not_final() {
        let mut feature = base_feature("foo");
        feature.force.push(ForceEntry {
            predicate: Predicate::conditions(Condition::Leaf(ConditionLeaf {
                attribute: "userId".into(),
                operator: Operator::Equals,
                value: Some(json!("admin")),
            })),
            enabled: Some(false),
            variation: None,
            variables: HashMap::new(),
        });
        feature.ranges = vec![Range { start: 0, end: 100_000 }];
        let mut datafile = Datafile::empty();
        datafile.features.push(feature);
        let sticky = Overrides::new();
        let initial = Overrides::new();

        let mut original_ctx = Context::new();
        original_ctx.insert("userId", AttributeValue::String("admin".into()));
        // A differing final context (as `interceptContext` might produce) must not
        // affect forced-entry matching.
        let mut final_ctx = Context::new();
        final_ctx.insert("userId", AttributeValue::String("anonymized".into()));

        let eval = evaluate_flag(
            "foo",
            &original_ctx,
            &final_ctx,
            &inputs(&datafile, &sticky, &initial, true),
        );
        assert_eq!(eval.reason, Reason::Forced);
        assert!(!eval.enabled);
    }
}
