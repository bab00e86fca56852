//! Append-only streams with consumer groups.
//!
//! A stream is an ordered vector of `(id, field map)` entries plus a
//! table of consumer groups. Entry ids are `(timestamp, sequence)`
//! pairs compared numerically; generated ids use unix nanoseconds for
//! the timestamp component.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// An entry id did not parse as `<ts>` or `<ts>-<seq>`.
    #[error("invalid stream ID specified as stream command argument")]
    InvalidId,
    /// XADD with an id not greater than the last entry.
    #[error("the ID specified in XADD is equal or smaller than the target stream top item")]
    IdNotGreater,
    /// A group operation referenced a group that doesn't exist.
    #[error("no such consumer group")]
    NoSuchGroup,
    /// XGROUP CREATE on a name that already exists.
    #[error("consumer group name already exists")]
    GroupExists,
}

/// A stream entry id: timestamp plus a per-timestamp sequence number.
///
/// Ordering is numeric on `(ts, seq)`, which stays correct regardless
/// of digit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    /// Timestamp component; unix nanoseconds for generated ids.
    pub ts: u64,
    /// Sequence number disambiguating ids in the same timestamp.
    pub seq: u64,
}

impl EntryId {
    /// The id immediately after this one.
    pub fn next(self) -> EntryId {
        EntryId {
            ts: self.ts,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ts, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, StreamError> {
        let (ts, seq) = match s.split_once('-') {
            Some((ts, seq)) => (ts, Some(seq)),
            None => (s, None),
        };
        let ts = ts.parse().map_err(|_| StreamError::InvalidId)?;
        let seq = match seq {
            Some(seq) => seq.parse().map_err(|_| StreamError::InvalidId)?,
            None => 0,
        };
        Ok(EntryId { ts, seq })
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry: an id and its field map. Fields are kept sorted so
/// replies and snapshots are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: EntryId,
    pub fields: BTreeMap<String, String>,
}

/// Per-consumer state inside a group: ids delivered to this consumer
/// and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Consumer {
    pub pending: Vec<EntryId>,
}

/// A consumer group: its consumers and the group-wide pending table of
/// delivered-but-unacknowledged entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsumerGroup {
    pub consumers: HashMap<String, Consumer>,
    pub pending: BTreeMap<EntryId, StreamEntry>,
}

/// An append-only log of entries plus its consumer-group table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    groups: HashMap<String, ConsumerGroup>,
}

impl Stream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    fn last_id(&self) -> Option<EntryId> {
        self.entries.last().map(|e| e.id)
    }

    /// Appends an entry with an explicit id. Ids must be strictly
    /// greater than the current last entry.
    pub fn append(
        &mut self,
        id: EntryId,
        fields: BTreeMap<String, String>,
    ) -> Result<EntryId, StreamError> {
        if let Some(last) = self.last_id() {
            if id <= last {
                return Err(StreamError::IdNotGreater);
            }
        }
        self.entries.push(StreamEntry { id, fields });
        Ok(id)
    }

    /// Appends an entry with a generated id based on `now_nanos`. When
    /// the clock hasn't advanced past the last entry, the sequence
    /// number is bumped instead.
    pub fn append_auto(&mut self, now_nanos: u64, fields: BTreeMap<String, String>) -> EntryId {
        let candidate = EntryId {
            ts: now_nanos,
            seq: 0,
        };
        let id = match self.last_id() {
            Some(last) if candidate <= last => last.next(),
            _ => candidate,
        };
        self.entries.push(StreamEntry { id, fields });
        id
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Returns `true` when the stream holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with ids in the closed interval `[from, to]`.
    pub fn range(&self, from: EntryId, to: EntryId) -> Vec<StreamEntry> {
        self.entries
            .iter()
            .filter(|e| e.id >= from && e.id <= to)
            .cloned()
            .collect()
    }

    /// Entries with ids strictly greater than `after`, at most `count`
    /// (0 = unlimited).
    pub fn read_after(&self, after: EntryId, count: usize) -> Vec<StreamEntry> {
        let it = self.entries.iter().filter(|e| e.id > after).cloned();
        if count == 0 {
            it.collect()
        } else {
            it.take(count).collect()
        }
    }

    /// Creates a consumer group. Fails if the name is taken.
    pub fn create_group(&mut self, name: &str) -> Result<(), StreamError> {
        if self.groups.contains_key(name) {
            return Err(StreamError::GroupExists);
        }
        self.groups.insert(name.to_owned(), ConsumerGroup::default());
        Ok(())
    }

    /// Reads entries after `after` on behalf of `consumer` in `group`.
    /// Every delivered entry lands in the group's pending table and on
    /// the consumer's pending list until acknowledged.
    pub fn read_group(
        &mut self,
        group: &str,
        consumer: &str,
        after: EntryId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let delivered: Vec<StreamEntry> = {
            let it = self.entries.iter().filter(|e| e.id > after).cloned();
            if count == 0 {
                it.collect()
            } else {
                it.take(count).collect()
            }
        };

        let group = self.groups.get_mut(group).ok_or(StreamError::NoSuchGroup)?;
        let consumer = group.consumers.entry(consumer.to_owned()).or_default();
        for entry in &delivered {
            group.pending.insert(entry.id, entry.clone());
            consumer.pending.push(entry.id);
        }
        Ok(delivered)
    }

    /// Acknowledges entries in a group. Returns how many pending ids
    /// were actually removed.
    pub fn ack(&mut self, group: &str, ids: &[EntryId]) -> Result<usize, StreamError> {
        let group = self.groups.get_mut(group).ok_or(StreamError::NoSuchGroup)?;
        let mut removed = 0;
        for id in ids {
            if group.pending.remove(id).is_some() {
                removed += 1;
            }
        }
        for consumer in group.consumers.values_mut() {
            consumer.pending.retain(|id| group.pending.contains_key(id));
        }
        Ok(removed)
    }

    /// The pending table of a group, if it exists.
    pub fn group_pending(&self, group: &str) -> Option<&BTreeMap<EntryId, StreamEntry>> {
        self.groups.get(group).map(|g| &g.pending)
    }
}
