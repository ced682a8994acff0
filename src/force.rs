//! Force/override resolution (§4.5): first matching forced entry wins.

use crate::model::{Datafile, Feature, ForceEntry};
use crate::targeting;
use crate::types::Context;

/// Returns the first forced entry whose predicate matches `context`, if any.
pub fn match_force<'a>(
    feature: &'a Feature,
    context: &Context,
    datafile: &Datafile,
) -> Option<&'a ForceEntry> {
    feature
        .force
        .iter()
        .find(|f| targeting::matches(&f.predicate, context, datafile))
}
