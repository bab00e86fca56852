//! Stream operations: XADD, XRANGE, XREAD, XLEN, consumer groups.

use std::collections::BTreeMap;

use chrono::Utc;
use thiserror::Error;

use crate::types::stream::{EntryId, Stream, StreamEntry, StreamError};
use crate::types::Value;

use super::Keyspace;

/// Errors from keyspace-level stream operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XError {
    /// Key holds a non-stream type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// Anything the stream itself rejects (bad id, id ordering,
    /// unknown group, duplicate group).
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl Keyspace {
    fn stream_mut(&mut self, key: &str) -> Result<&mut Stream, XError> {
        match self.entry_for_write(key, || Value::Stream(Stream::new())) {
            Value::Stream(stream) => Ok(stream),
            _ => Err(XError::WrongType),
        }
    }

    fn stream_ref(&mut self, key: &str) -> Result<Option<&Stream>, XError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Stream(stream)) => Ok(Some(stream)),
            Some(_) => Err(XError::WrongType),
        }
    }

    /// Appends an entry. `id_spec` is `*` for a generated id or an
    /// explicit `<ts>[-<seq>]` that must exceed the last entry's id.
    pub fn xadd(
        &mut self,
        key: &str,
        id_spec: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<EntryId, XError> {
        let stream = self.stream_mut(key)?;
        if id_spec == "*" {
            let now_nanos = Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .max(0) as u64;
            Ok(stream.append_auto(now_nanos, fields))
        } else {
            let id: EntryId = id_spec.parse().map_err(StreamError::from)?;
            Ok(stream.append(id, fields)?)
        }
    }

    /// Entries with ids in `[from, to]`, inclusive.
    pub fn xrange(&mut self, key: &str, from: &str, to: &str) -> Result<Vec<StreamEntry>, XError> {
        let from: EntryId = from.parse().map_err(StreamError::from)?;
        let to: EntryId = to.parse().map_err(StreamError::from)?;
        match self.stream_ref(key)? {
            None => Ok(Vec::new()),
            Some(stream) => Ok(stream.range(from, to)),
        }
    }

    /// Entries strictly after `from`, at most `count` (0 = unlimited).
    pub fn xread(
        &mut self,
        key: &str,
        from: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, XError> {
        let from: EntryId = from.parse().map_err(StreamError::from)?;
        match self.stream_ref(key)? {
            None => Ok(Vec::new()),
            Some(stream) => Ok(stream.read_after(from, count)),
        }
    }

    /// Number of entries; 0 when the key is missing.
    pub fn xlen(&mut self, key: &str) -> Result<usize, XError> {
        match self.stream_ref(key)? {
            None => Ok(0),
            Some(stream) => Ok(stream.len()),
        }
    }

    /// Creates a consumer group on an existing stream.
    pub fn xgroup_create(&mut self, key: &str, group: &str) -> Result<(), XError> {
        match self.value_mut(key) {
            None => Err(XError::Stream(StreamError::NoSuchGroup)),
            Some(Value::Stream(stream)) => Ok(stream.create_group(group)?),
            Some(_) => Err(XError::WrongType),
        }
    }

    /// Group read: delivers entries after `from` to `consumer`,
    /// tracking each in the group's pending table.
    pub fn xreadgroup(
        &mut self,
        key: &str,
        group: &str,
        consumer: &str,
        from: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, XError> {
        let from: EntryId = from.parse().map_err(StreamError::from)?;
        match self.value_mut(key) {
            None => Err(XError::Stream(StreamError::NoSuchGroup)),
            Some(Value::Stream(stream)) => Ok(stream.read_group(group, consumer, from, count)?),
            Some(_) => Err(XError::WrongType),
        }
    }

    /// Acknowledges delivered entries. Returns how many pending ids
    /// were removed.
    pub fn xack(&mut self, key: &str, group: &str, ids: &[String]) -> Result<usize, XError> {
        let parsed: Vec<EntryId> = ids
            .iter()
            .map(|s| s.parse().map_err(StreamError::from))
            .collect::<Result<_, _>>()?;
        match self.value_mut(key) {
            None => Ok(0),
            Some(Value::Stream(stream)) => Ok(stream.ack(group, &parsed)?),
            Some(_) => Err(XError::WrongType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn xadd_auto_ids_are_increasing() {
        let mut ks = Keyspace::new();
        let a = ks.xadd("s", "*", fields(&[("f", "1")])).unwrap();
        let b = ks.xadd("s", "*", fields(&[("f", "2")])).unwrap();
        assert!(b > a);
        assert_eq!(ks.xlen("s").unwrap(), 2);
    }

    #[test]
    fn xadd_explicit_id_must_increase() {
        let mut ks = Keyspace::new();
        ks.xadd("s", "5-0", fields(&[("f", "1")])).unwrap();
        let err = ks.xadd("s", "5-0", fields(&[("f", "2")])).unwrap_err();
        assert_eq!(err, XError::Stream(StreamError::IdNotGreater));
        // xlen counts only the successful adds
        assert_eq!(ks.xlen("s").unwrap(), 1);
    }

    #[test]
    fn xrange_and_xread_windows() {
        let mut ks = Keyspace::new();
        for i in 1..=4 {
            ks.xadd("s", &format!("{i}-0"), fields(&[("n", "x")])).unwrap();
        }

        let range = ks.xrange("s", "2-0", "3-0").unwrap();
        assert_eq!(range.len(), 2);

        let read = ks.xread("s", "2-0", 0).unwrap();
        let ids: Vec<_> = read.iter().map(|e| e.id.ts).collect();
        assert_eq!(ids, vec![3, 4]);

        let capped = ks.xread("s", "0", 1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn group_lifecycle() {
        let mut ks = Keyspace::new();
        let id = ks.xadd("s", "*", fields(&[("f1", "v1")])).unwrap();
        ks.xgroup_create("s", "g").unwrap();

        // duplicate create fails
        assert!(matches!(
            ks.xgroup_create("s", "g"),
            Err(XError::Stream(StreamError::GroupExists))
        ));

        let got = ks.xreadgroup("s", "g", "c1", "0", 10).unwrap();
        assert_eq!(got.len(), 1);

        assert_eq!(ks.xack("s", "g", &[id.to_string()]).unwrap(), 1);
        assert_eq!(ks.xack("s", "g", &[id.to_string()]).unwrap(), 0);
    }

    #[test]
    fn group_create_requires_stream() {
        let mut ks = Keyspace::new();
        assert!(ks.xgroup_create("missing", "g").is_err());
    }

    #[test]
    fn wrong_type_errors() {
        let mut ks = Keyspace::new();
        ks.set("s", "v".into(), None);
        assert_eq!(
            ks.xadd("s", "*", fields(&[("f", "v")])),
            Err(XError::WrongType)
        );
        assert_eq!(ks.xlen("s"), Err(XError::WrongType));
    }
}
