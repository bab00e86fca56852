//! The keyspace: cinder's core key-value store.
//!
//! A `Keyspace` owns a flat `AHashMap<String, Entry>` mapping each key
//! to one typed [`Value`] plus optional expiry metadata. Expired keys
//! are removed lazily on access; a background sweep catches the rest.
//!
//! Callers serialize access with a process-wide reader-writer lock.
//! Nothing in here takes another lock, so there is no ordering to get
//! wrong in the data path.
//!
//! Per-type operations live in sibling modules (`string`, `list`,
//! `zset`, ...), each implemented as another `impl Keyspace` block with
//! its tests alongside.

use std::collections::HashMap;
use std::time::Duration;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::WrongType;
use crate::glob::glob_match;
use crate::types::Value;

mod bitfield;
mod bitmap;
mod geo;
mod hash;
mod hll;
mod json;
mod list;
mod set;
mod string;
mod stream;
mod timeseries;
mod vector;
mod zset;

pub use bitfield::{BitfieldError, BitfieldType};
pub use bitmap::{BitOp, BitmapError};
pub use geo::GeoError;
pub use hll::PfError;
pub use json::JsonError;
pub use stream::XError;
pub use timeseries::TsOpError;

/// Result of a TTL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists and has a TTL: remaining whole seconds.
    Seconds(i64),
    /// Key exists but has no expiration set.
    NoExpiry,
    /// Key does not exist (or has already expired).
    NotFound,
}

/// A single entry: a typed value plus an optional absolute deadline.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    pub(crate) expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

/// The core key-value store.
pub struct Keyspace {
    entries: AHashMap<String, Entry>,
}

impl Keyspace {
    /// Creates a new, empty keyspace.
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// Removes the key if its deadline has passed. Returns `true` when
    /// an expired entry was removed.
    pub(crate) fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| e.is_expired(Utc::now()));
        if expired {
            self.entries.remove(key);
        }
        expired
    }

    /// Live value for a key, reaping it first if expired.
    pub(crate) fn value(&mut self, key: &str) -> Option<&Value> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    /// Mutable live value for a key, reaping it first if expired.
    pub(crate) fn value_mut(&mut self, key: &str) -> Option<&mut Value> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.entries.get_mut(key).map(|e| &mut e.value)
    }

    /// Fetches-or-creates the entry for a collection write. The default
    /// value is only constructed when the key is new; an existing entry
    /// keeps its expiry. The caller still has to match the variant.
    pub(crate) fn entry_for_write(&mut self, key: &str, default: impl FnOnce() -> Value) -> &mut Value {
        self.remove_if_expired(key);
        &mut self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Entry::new(default()))
            .value
    }

    /// Iterates live `(key, value)` pairs without reaping. Used by
    /// whole-keyspace scans (vector search).
    pub(crate) fn entries_for_scan(
        &self,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter(move |(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.as_str(), &entry.value))
    }

    /// Replaces the value for a key, preserving any live expiry.
    /// Inserts when the key is missing.
    pub(crate) fn set_value(&mut self, key: &str, value: Value) {
        self.remove_if_expired(key);
        match self.entries.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                self.entries.insert(key.to_owned(), Entry::new(value));
            }
        }
    }

    /// Stores a string value. A `ttl` sets a fresh deadline; `None`
    /// clears any prior one.
    pub fn set(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Utc::now() + d);
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: Value::Str(value),
                expires_at,
            },
        );
    }

    /// Fetches a string value. Expired keys are reaped and read as
    /// absent; non-string values are a type error.
    pub fn get(&mut self, key: &str) -> Result<Option<String>, WrongType> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(WrongType),
        }
    }

    /// Removes a key. Returns `true` if a live key was present.
    pub fn del(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        self.entries.remove(key).is_some()
    }

    /// Returns `true` if the key is present. Does not reap expired
    /// entries — the lazy path in `get` and the background sweep own
    /// that.
    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Sets an absolute deadline `seconds` from now on an existing key.
    /// Returns `false` when the key doesn't exist.
    pub fn expire(&mut self, key: &str, seconds: u64) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Utc::now() + Duration::from_secs(seconds));
                true
            }
            None => false,
        }
    }

    /// TTL status for a key: remaining whole seconds, no-expiry, or
    /// not-found.
    pub fn ttl(&mut self, key: &str) -> TtlResult {
        if self.remove_if_expired(key) {
            return TtlResult::NotFound;
        }
        match self.entries.get(key) {
            Some(entry) => match entry.expires_at {
                Some(deadline) => TtlResult::Seconds((deadline - Utc::now()).num_seconds()),
                None => TtlResult::NoExpiry,
            },
            None => TtlResult::NotFound,
        }
    }

    /// Drops the expiry from a key. Returns `true` only when the key
    /// existed with a deadline to remove.
    pub fn persist(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        }
    }

    /// Returns all live keys matching a glob pattern. O(n) scan; order
    /// unspecified.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        if self.entries.len() > 10_000 {
            warn!(key_count = self.entries.len(), "KEYS on large keyspace");
        }
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Removes every entry whose deadline has passed. Returns the
    /// number of keys removed. Driven by the background expirer tick;
    /// semantically identical to `del` per key.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Number of keys, counting not-yet-reaped expired entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the keyspace has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over live entries as `(key, value, deadline)`. Used by
    /// snapshot save and AOF rewrite.
    pub fn iter_entries(&self) -> impl Iterator<Item = (&str, &Value, Option<DateTime<Utc>>)> {
        let now = Utc::now();
        self.entries.iter().filter_map(move |(key, entry)| {
            if entry.is_expired(now) {
                return None;
            }
            Some((key.as_str(), &entry.value, entry.expires_at))
        })
    }

    /// Clones the live state into plain maps for serialization.
    pub fn export_state(&self) -> (HashMap<String, Value>, HashMap<String, DateTime<Utc>>) {
        let mut store = HashMap::new();
        let mut expiries = HashMap::new();
        for (key, value, deadline) in self.iter_entries() {
            store.insert(key.to_owned(), value.clone());
            if let Some(deadline) = deadline {
                expiries.insert(key.to_owned(), deadline);
            }
        }
        (store, expiries)
    }

    /// Replaces the in-memory state wholesale, e.g. after loading a
    /// snapshot. Deadlines without a matching key are dropped.
    pub fn replace_state(
        &mut self,
        store: HashMap<String, Value>,
        expiries: HashMap<String, DateTime<Utc>>,
    ) {
        self.entries = store
            .into_iter()
            .map(|(key, value)| {
                let expires_at = expiries.get(&key).copied();
                (key, Entry { value, expires_at })
            })
            .collect();
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}
