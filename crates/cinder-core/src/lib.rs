//! cinder-core: the storage engine.
//!
//! Owns the keyspace, data types, and expiration. A single `Keyspace`
//! holds every key behind one map; callers serialize access with a
//! process-wide reader-writer lock and reach the per-type operations
//! through the methods on [`Keyspace`].

pub mod error;
pub mod glob;
pub mod keyspace;
pub mod types;

pub use error::{IncrError, WrongType};
pub use keyspace::{
    BitOp, BitfieldError, BitfieldType, BitmapError, GeoError, JsonError, Keyspace, PfError,
    TsOpError, TtlResult, XError,
};
pub use types::Value;
