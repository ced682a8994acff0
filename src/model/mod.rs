//! Typed datafile model: the parsed shape of the wire JSON described in §3/§6.

mod condition;
mod datafile;
mod feature;

pub use condition::{Condition, ConditionLeaf, Operator, Predicate, SegmentRef};
pub use datafile::{Attribute, Datafile, Segment};
pub use feature::{
    Allocation, BucketBy, Feature, ForceEntry, Range, RequiredFeature, Traffic, VariableOverride,
    VariableSchema, VariableType, Variation, VariationVariable,
};
