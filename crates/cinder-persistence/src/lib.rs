//! cinder-persistence: durability for the keyspace.
//!
//! Two mechanisms, both flat files:
//!
//! - **AOF** — an append-only log with one executed mutating command
//!   per line, exactly as tokenized off the wire. Replaying the file
//!   through the dispatcher reconstructs the state.
//! - **Snapshot** — a point-in-time JSON document
//!   `{"store": ..., "expiries": ...}` with RFC3339 expiry deadlines.
//!
//! Both rewrite paths (AOF rewrite, snapshot save) write to a
//! temporary file and atomically rename over the live one, so a crash
//! mid-write never corrupts the previous copy.

pub mod aof;
pub mod snapshot;

pub use aof::{AofError, AofLog};
pub use snapshot::{SnapshotError, SnapshotState};
