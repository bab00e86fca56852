//! Point-in-time JSON snapshots.
//!
//! A snapshot is a single JSON object `{"store": ..., "expiries": ...}`
//! where `store` maps keys to their tagged values and `expiries` maps
//! keys to RFC3339 deadlines. Writes go to a `.tmp` file in the same
//! directory and are atomically renamed on completion, so a crash
//! mid-write never corrupts the previous snapshot.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cinder_core::types::Value;

/// Errors from snapshot save/load.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The snapshot file wasn't a valid state document.
    #[error("snapshot decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The serialized form of the whole keyspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub store: HashMap<String, Value>,
    pub expiries: HashMap<String, DateTime<Utc>>,
}

/// Writes a snapshot, creating parent directories as needed. Temp file
/// plus atomic rename.
pub fn save(path: impl AsRef<Path>, state: &SnapshotState) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("snap.tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, state)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads a snapshot back.
pub fn load(path: impl AsRef<Path>) -> Result<SnapshotState, SnapshotError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::Keyspace;
    use std::time::Duration;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn state_of(ks: &Keyspace) -> SnapshotState {
        let (store, expiries) = ks.export_state();
        SnapshotState { store, expiries }
    }

    #[test]
    fn save_load_round_trip_across_types() {
        let mut ks = Keyspace::new();
        ks.set("s", "hello".into(), None);
        ks.rpush("l", vec!["a".into(), "b".into()]).unwrap();
        ks.hset("h", "f", "v".into()).unwrap();
        ks.sadd("set", vec!["m".into()]).unwrap();
        ks.zadd("z", 1.5, "member").unwrap();
        ks.setbit("bits", 3, true).unwrap();
        ks.geoadd("g", 2.35, 48.85, "paris").unwrap();
        ks.pfadd("hll", &["x".to_owned(), "y".to_owned()]).unwrap();
        ks.vector_set("v", vec![1.0, 2.0]);
        ks.json_set("doc", ".", r#"{"a":[1,2]}"#).unwrap();

        let dir = temp_dir();
        let path = dir.path().join("dump.json");
        save(&path, &state_of(&ks)).unwrap();

        let loaded = load(&path).unwrap();
        let mut fresh = Keyspace::new();
        fresh.replace_state(loaded.store, loaded.expiries);

        assert_eq!(fresh.get("s").unwrap(), Some("hello".into()));
        assert_eq!(fresh.lrange("l", 0, -1).unwrap(), vec!["a", "b"]);
        assert_eq!(fresh.hget("h", "f").unwrap(), Some("v".into()));
        assert!(fresh.sismember("set", "m").unwrap());
        assert_eq!(fresh.zrange("z", 0, -1).unwrap(), vec!["member".to_owned()]);
        assert_eq!(fresh.getbit("bits", 3).unwrap(), 1);
        assert!(fresh.geodist("g", "paris", "paris").unwrap() < 1e-9);
        assert_eq!(fresh.pfcount("hll").unwrap(), 2);
        assert_eq!(fresh.vector_get("v").unwrap(), Some(vec![1.0, 2.0]));
        assert_eq!(fresh.json_get("doc", ".a").unwrap(), "[1,2]");
    }

    #[test]
    fn expiries_survive_as_rfc3339() {
        let mut ks = Keyspace::new();
        ks.set("t", "v".into(), Some(Duration::from_secs(3600)));

        let dir = temp_dir();
        let path = dir.path().join("dump.json");
        save(&path, &state_of(&ks)).unwrap();

        // the on-disk form holds an RFC3339 timestamp string
        let raw = fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let stamp = doc["expiries"]["t"].as_str().expect("expiry is a string");
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok(), "stamp {stamp}");

        let loaded = load(&path).unwrap();
        let mut fresh = Keyspace::new();
        fresh.replace_state(loaded.store, loaded.expiries);
        match fresh.ttl("t") {
            cinder_core::TtlResult::Seconds(s) => assert!((3500..=3600).contains(&s)),
            other => panic!("expected ttl seconds, got {other:?}"),
        }
    }

    #[test]
    fn save_restores_previous_state_after_mutation() {
        let mut ks = Keyspace::new();
        ks.set("k", "before".into(), None);

        let dir = temp_dir();
        let path = dir.path().join("dump.json");
        save(&path, &state_of(&ks)).unwrap();

        ks.set("k", "after".into(), None);
        ks.set("extra", "x".into(), None);

        let loaded = load(&path).unwrap();
        ks.replace_state(loaded.store, loaded.expiries);
        assert_eq!(ks.get("k").unwrap(), Some("before".into()));
        assert!(!ks.exists("extra"));
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = temp_dir();
        assert!(load(dir.path().join("none.json")).is_err());
    }

    #[test]
    fn corrupt_snapshot_is_a_decode_error() {
        let dir = temp_dir();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(load(&path), Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let mut ks = Keyspace::new();
        ks.set("k", "v".into(), None);

        let dir = temp_dir();
        let path = dir.path().join("dump.json");
        save(&path, &state_of(&ks)).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
