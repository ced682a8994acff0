//! Condition and segment matching (§4.3). Pure: no I/O, no mutation.

use crate::model::{Condition, ConditionLeaf, Datafile, Operator, Predicate, SegmentRef};
use crate::types::{AttributeValue, Context};
use serde_json::Value as JsonValue;

/// Evaluates `predicate` (conditions or segment references) against `context`.
pub fn matches(predicate: &Predicate, context: &Context, datafile: &Datafile) -> bool {
    match predicate {
        Predicate::Conditions { conditions } => matches_condition(conditions, context),
        Predicate::Segments { segments } => matches_segment_ref(segments, context, datafile),
    }
}

fn matches_segment_ref(seg: &SegmentRef, context: &Context, datafile: &Datafile) -> bool {
    match seg {
        SegmentRef::Key(key) => {
            if key == SegmentRef::WILDCARD {
                return true;
            }
            match datafile.segment(key) {
                Some(segment) => matches_condition(&segment.conditions, context),
                None => false,
            }
        }
        SegmentRef::List(items) => items.iter().all(|s| matches_segment_ref(s, context, datafile)),
        SegmentRef::And { and } => and.iter().all(|s| matches_segment_ref(s, context, datafile)),
        SegmentRef::Or { or } => or.iter().any(|s| matches_segment_ref(s, context, datafile)),
        SegmentRef::Not { not } => !not.iter().all(|s| matches_segment_ref(s, context, datafile)),
    }
}

fn matches_condition(condition: &Condition, context: &Context) -> bool {
    match condition {
        Condition::Leaf(leaf) => matches_leaf(leaf, context),
        Condition::And { and } => and.iter().all(|c| matches_condition(c, context)),
        Condition::Or { or } => or.iter().any(|c| matches_condition(c, context)),
        Condition::Not { not } => !not.iter().all(|c| matches_condition(c, context)),
    }
}

fn matches_leaf(leaf: &ConditionLeaf, context: &Context) -> bool {
    let actual = context.get(&leaf.attribute);

    match leaf.operator {
        Operator::Exists => return actual.is_some(),
        Operator::NotExists => return actual.is_none(),
        _ => {}
    }

    let actual = match actual {
        Some(v) => v,
        None => return false,
    };

    let expected = match &leaf.value {
        Some(v) => v,
        None => return false,
    };

    match leaf.operator {
        Operator::Equals => values_equal(actual, expected),
        Operator::NotEquals => !values_equal(actual, expected),
        Operator::GreaterThan => numeric_cmp(actual, expected, |a, b| a > b),
        Operator::GreaterThanOrEqual => numeric_cmp(actual, expected, |a, b| a >= b),
        Operator::LessThan => numeric_cmp(actual, expected, |a, b| a < b),
        Operator::LessThanOrEqual => numeric_cmp(actual, expected, |a, b| a <= b),
        Operator::Contains => string_op(actual, expected, |a, b| a.contains(b)),
        Operator::NotContains => !string_op(actual, expected, |a, b| a.contains(b)),
        Operator::StartsWith => string_op(actual, expected, |a, b| a.starts_with(b)),
        Operator::EndsWith => string_op(actual, expected, |a, b| a.ends_with(b)),
        Operator::In => membership(actual, expected, true),
        Operator::NotIn => membership(actual, expected, false),
        Operator::SemverEquals => semver_cmp(actual, expected, |a, b| a == b),
        Operator::SemverNotEquals => semver_cmp(actual, expected, |a, b| a != b),
        Operator::SemverGreaterThan => semver_cmp(actual, expected, |a, b| a > b),
        Operator::SemverGreaterThanOrEqual => semver_cmp(actual, expected, |a, b| a >= b),
        Operator::SemverLessThan => semver_cmp(actual, expected, |a, b| a < b),
        Operator::SemverLessThanOrEqual => semver_cmp(actual, expected, |a, b| a <= b),
        Operator::Before => date_cmp(actual, expected, |a, b| a < b),
        Operator::After => date_cmp(actual, expected, |a, b| a > b),
        Operator::Matches => regex_match(actual, expected),
        Operator::Exists | Operator::NotExists => unreachable!("handled above"),
    }
}

fn values_equal(actual: &AttributeValue, expected: &JsonValue) -> bool {
    match (actual, expected) {
        (AttributeValue::Boolean(a), JsonValue::Bool(b)) => a == b,
        (AttributeValue::Integer(a), JsonValue::Number(b)) => b.as_i64() == Some(*a),
        (AttributeValue::Double(a), JsonValue::Number(b)) => b.as_f64() == Some(*a),
        (AttributeValue::String(a), JsonValue::String(b)) => a == b,
        _ => false,
    }
}

fn numeric_cmp(actual: &AttributeValue, expected: &JsonValue, op: impl Fn(f64, f64) -> bool) -> bool {
    let a = match actual.as_f64() {
        Some(v) => v,
        None => return false,
    };
    let b = match expected.as_f64() {
        Some(v) => v,
        None => return false,
    };
    op(a, b)
}

fn string_op(actual: &AttributeValue, expected: &JsonValue, op: impl Fn(&str, &str) -> bool) -> bool {
    let a = match actual.as_str() {
        Some(v) => v,
        None => return false,
    };
    let b = match expected.as_str() {
        Some(v) => v,
        None => return false,
    };
    op(a, b)
}

fn membership(actual: &AttributeValue, expected: &JsonValue, want_member: bool) -> bool {
    let a = match actual.as_str() {
        Some(v) => v,
        None => return false,
    };
    let list = match expected.as_array() {
        Some(v) => v,
        None => return false,
    };
    let is_member = list.iter().any(|v| v.as_str() == Some(a));
    is_member == want_member
}

fn semver_cmp(
    actual: &AttributeValue,
    expected: &JsonValue,
    op: impl Fn(&semver::Version, &semver::Version) -> bool,
) -> bool {
    let a_str = match actual.as_str() {
        Some(v) => v,
        None => return false,
    };
    let b_str = match expected.as_str() {
        Some(v) => v,
        None => return false,
    };
    let (a, b) = match (semver::Version::parse(a_str), semver::Version::parse(b_str)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => return false,
    };
    op(&a, &b)
}

fn date_cmp(
    actual: &AttributeValue,
    expected: &JsonValue,
    op: impl Fn(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) -> bool,
) -> bool {
    let a = match actual.as_date() {
        Some(v) => v,
        None => return false,
    };
    let b_str = match expected.as_str() {
        Some(v) => v,
        None => return false,
    };
    let b = match chrono::DateTime::parse_from_rfc3339(b_str) {
        Ok(v) => v.with_timezone(&chrono::Utc),
        Err(_) => return false,
    };
    op(a, b)
}

fn regex_match(actual: &AttributeValue, expected: &JsonValue) -> bool {
    let a = match actual.as_str() {
        Some(v) => v,
        None => return false,
    };
    let pattern = match expected.as_str() {
        Some(v) => v,
        None => return false,
    };
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(a),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;
    use serde_json::json;

    fn leaf(attribute: &str, operator: Operator, value: JsonValue) -> Condition {
        Condition::Leaf(ConditionLeaf {
            attribute: attribute.to_string(),
            operator,
            value: Some(value),
        })
    }

    #[test]
    fn equals_matches_same_string() {
        let cond = leaf("country", Operator::Equals, json!("US"));
        let mut ctx = Context::new();
        ctx.insert("country", AttributeValue::String("US".into()));
        assert!(matches_condition(&cond, &ctx));
    }

    #[test]
    fn equals_fails_on_missing_attribute() {
        let cond = leaf("country", Operator::Equals, json!("US"));
        let ctx = Context::new();
        assert!(!matches_condition(&cond, &ctx));
    }

    #[test]
    fn and_requires_all() {
        let cond = Condition::And {
            and: vec![
                leaf("country", Operator::Equals, json!("US")),
                leaf("plan", Operator::Equals, json!("pro")),
            ],
        };
        let mut ctx = Context::new();
        ctx.insert("country", AttributeValue::String("US".into()));
        ctx.insert("plan", AttributeValue::String("free".into()));
        assert!(!matches_condition(&cond, &ctx));
    }

    #[test]
    fn or_requires_any() {
        let cond = Condition::Or {
            or: vec![
                leaf("country", Operator::Equals, json!("US")),
                leaf("plan", Operator::Equals, json!("pro")),
            ],
        };
        let mut ctx = Context::new();
        ctx.insert("plan", AttributeValue::String("pro".into()));
        assert!(matches_condition(&cond, &ctx));
    }

    #[test]
    fn not_negates_conjunction() {
        let cond = Condition::Not {
            not: vec![leaf("country", Operator::Equals, json!("US"))],
        };
        let mut ctx = Context::new();
        ctx.insert("country", AttributeValue::String("CA".into()));
        assert!(matches_condition(&cond, &ctx));
    }

    #[test]
    fn semver_greater_than_or_equal() {
        let cond = leaf(
            "appVersion",
            Operator::SemverGreaterThanOrEqual,
            json!("2.0.0"),
        );
        let mut ctx = Context::new();
        ctx.insert("appVersion", AttributeValue::String("2.1.0".into()));
        assert!(matches_condition(&cond, &ctx));
    }

    #[test]
    fn semver_parse_failure_is_false() {
        let cond = leaf("appVersion", Operator::SemverEquals, json!("not-a-version"));
        let mut ctx = Context::new();
        ctx.insert("appVersion", AttributeValue::String("1.0.0".into()));
        assert!(!matches_condition(&cond, &ctx));
    }

    #[test]
    fn regex_matches() {
        let cond = leaf("email", Operator::Matches, json!(r"^[^@]+@example\.com$"));
        let mut ctx = Context::new();
        ctx.insert("email", AttributeValue::String("a@example.com".into()));
        assert!(matches_condition(&cond, &ctx));
    }

    #[test]
    fn wildcard_segment_always_matches() {
        let datafile = Datafile::empty();
        let mut ctx = Context::new();
        ctx.insert("anything", AttributeValue::Boolean(true));
        assert!(matches_segment_ref(
            &SegmentRef::Key("*".into()),
            &ctx,
            &datafile
        ));
    }

    #[test]
    fn named_segment_resolves_its_conditions() {
        let mut datafile = Datafile::empty();
        datafile.segments.push(Segment {
            key: "admins".into(),
            conditions: leaf("role", Operator::Equals, json!("admin")),
        });
        let mut ctx = Context::new();
        ctx.insert("role", AttributeValue::String("admin".into()));
        assert!(matches_segment_ref(
            &SegmentRef::Key("admins".into()),
            &ctx,
            &datafile
        ));
    }

    #[test]
    fn unknown_segment_never_matches() {
        let datafile = Datafile::empty();
        let ctx = Context::new();
        assert!(!matches_segment_ref(
            &SegmentRef::Key("ghost".into()),
            &ctx,
            &datafile
        ));
    }
}
