//! Data type representations for stored values.
//!
//! Each variant maps to one of the typed shapes a key can hold. A key
//! holds exactly one variant at a time; operations that expect a
//! different variant fail with a type error at the keyspace layer.

pub mod geo;
pub mod hyperloglog;
pub mod skiplist;
pub mod stream;
pub mod timeseries;

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use geo::GeoSet;
use hyperloglog::HyperLogLog;
use skiplist::SortedSet;
use stream::Stream;
use timeseries::TimeSeries;

/// A stored value in the keyspace.
///
/// Serde derives back the JSON snapshot format: every variant
/// round-trips through `{"store": ...}` with an external tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string data.
    Str(String),

    /// Raw bytes addressed by SETBIT/GETBIT/BITCOUNT/BITOP/BITFIELD.
    /// Same physical shape as a string, distinguished by the
    /// operations used against it.
    Bytes(Vec<u8>),

    /// Ordered list of elements. `VecDeque` gives O(1) push/pop at
    /// both ends.
    List(VecDeque<String>),

    /// Field → value mapping.
    Hash(HashMap<String, String>),

    /// Unordered set of unique members.
    Set(HashSet<String>),

    /// Sorted set of unique members ordered by (score, member).
    ZSet(SortedSet),

    /// Named geographic points with a sorted-by-name view.
    Geo(GeoSet),

    /// Dense-register cardinality estimator.
    Hll(HyperLogLog),

    /// Append-only entry log with consumer groups.
    Stream(Stream),

    /// Timestamped float samples with an aggregation tag.
    TimeSeries(TimeSeries),

    /// Fixed-dimension float vector for similarity search.
    Vector(Vec<f64>),

    /// Decoded JSON document, serialized on read.
    Json(serde_json::Value),
}

/// Returns the type name for a value, matching the TYPE command output.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Str(_) => "string",
        Value::Bytes(_) => "string",
        Value::List(_) => "list",
        Value::Hash(_) => "hash",
        Value::Set(_) => "set",
        Value::ZSet(_) => "zset",
        Value::Geo(_) => "geo",
        Value::Hll(_) => "hyperloglog",
        Value::Stream(_) => "stream",
        Value::TimeSeries(_) => "timeseries",
        Value::Vector(_) => "vector",
        Value::Json(_) => "json",
    }
}

/// Converts range indices (supporting negative values) to a clamped
/// `(start, stop)` pair.
///
/// Negative indices count back from `len` (e.g. -1 = last element).
/// Out-of-bounds stop is clamped to `len - 1`; out-of-bounds negative
/// stop clamps to -1 so the caller sees `start > stop` (empty range).
/// Returns `(0, -1)` for empty collections.
pub fn normalize_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    if len == 0 {
        return (0, -1);
    }

    // resolve negative indices, clamp floor to 0
    let s = if start < 0 {
        (len + start).max(0)
    } else {
        start
    };

    // resolve negative indices, clamp floor to -1 so that a
    // hugely-negative stop produces an empty range
    let e = if stop < 0 {
        (len + stop).max(-1)
    } else {
        stop.min(len - 1)
    };

    (s, e)
}
