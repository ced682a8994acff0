//! Traffic and allocation selection (§4.4): first-match-wins rule, then first
//! containing-range allocation.

use crate::model::{Allocation, Datafile, Feature, Traffic};
use crate::targeting;
use crate::types::Context;

/// The traffic rule matched for a given context, if any.
pub struct MatchedTraffic<'a> {
    pub traffic: &'a Traffic,
}

/// Iterates `feature`'s traffic rules in declared order and returns the first whose
/// predicate matches.
pub fn match_traffic<'a>(
    feature: &'a Feature,
    context: &Context,
    datafile: &Datafile,
) -> Option<MatchedTraffic<'a>> {
    feature
        .traffic
        .iter()
        .find(|t| targeting::matches(&t.predicate, context, datafile))
        .map(|traffic| MatchedTraffic { traffic })
}

/// Within `traffic`'s allocation list, returns the first entry whose range contains
/// `bucket_value`.
pub fn match_allocation(traffic: &Traffic, bucket_value: u32) -> Option<&Allocation> {
    traffic
        .allocation
        .iter()
        .find(|a| a.range.contains(bucket_value))
}

/// Returns the first of `feature.ranges` that contains `bucket_value` — used by
/// features with a flat `ranges` list rather than allocation-bearing traffic rules.
pub fn match_range(feature: &Feature, bucket_value: u32) -> Option<crate::model::Range> {
    feature
        .ranges
        .iter()
        .copied()
        .find(|r| r.contains(bucket_value))
}
