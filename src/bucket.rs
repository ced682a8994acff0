//! Bucketing: mapping a context to a stable integer in `[0, 100000)` (§4.1, §4.2).

use crate::model::{BucketBy, Feature};
use crate::types::Context;

pub const BUCKET_MAX: u32 = 100_000;

/// MurmurHash v3 (32-bit, seed 1) of `key`, rescaled to `[0, 100000)`.
///
/// This exact formula is the wire-compatible bucketing function shared across client
/// implementations — changing it silently reassigns every user, so it is pinned here
/// rather than exposed as configurable.
pub fn hash(key: &str) -> u32 {
    let raw = murmurhash3::murmurhash3_x86_32(key.as_bytes(), 1);
    ((raw as u64 * BUCKET_MAX as u64) / (u32::MAX as u64 + 1)) as u32
}

/// Hook signature for `configureBucketKey`: receives the raw joined key, returns the
/// (possibly rewritten) key that is actually hashed.
pub type ConfigureBucketKey = dyn Fn(&Feature, &Context, &str) -> String + Send + Sync;

/// Hook signature for `configureBucketValue`: post-adjusts the integer C1 returned.
pub type ConfigureBucketValue = dyn Fn(&Feature, &Context, u32) -> u32 + Send + Sync;

/// Assembles the bucket-key string for `feature` and `context` per the feature's
/// `bucketBy` policy (§4.2), then hands it to [`hash`].
pub fn bucket_value(
    feature: &Feature,
    context: &Context,
    separator: &str,
    configure_key: Option<&ConfigureBucketKey>,
    configure_value: Option<&ConfigureBucketValue>,
) -> u32 {
    let key = build_key(feature, context, separator);
    let key = match configure_key {
        Some(hook) => hook(feature, context, &key),
        None => key,
    };
    let value = hash(&key);
    match configure_value {
        Some(hook) => hook(feature, context, value),
        None => value,
    }
}

/// Builds the raw (pre-hook) bucket-key string: ordered attribute values, joined by
/// `separator`, with the feature key appended last.
pub fn build_key(feature: &Feature, context: &Context, separator: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    match &feature.bucket_by {
        BucketBy::Single(key) => {
            if let Some(v) = context.get(key) {
                parts.push(v.to_bucket_string());
            }
        }
        BucketBy::And { and } => {
            for key in and {
                if let Some(v) = context.get(key) {
                    parts.push(v.to_bucket_string());
                }
            }
        }
        BucketBy::Or { or } => {
            for key in or {
                if let Some(v) = context.get(key) {
                    parts.push(v.to_bucket_string());
                    break;
                }
            }
        }
    }

    parts.push(feature.key.clone());
    parts.join(separator)
}
