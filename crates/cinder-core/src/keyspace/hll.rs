//! HyperLogLog operations: PFADD, PFCOUNT, PFMERGE.

use thiserror::Error;

use crate::types::hyperloglog::{HllError, HyperLogLog};
use crate::types::Value;

use super::Keyspace;

/// Errors from keyspace-level HyperLogLog operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PfError {
    /// Key holds a non-HLL type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// PFCOUNT/PFMERGE on a key that doesn't exist.
    #[error("key does not exist")]
    KeyNotFound,
    /// Merge between estimators of different register counts.
    #[error("cannot merge estimators with different register counts")]
    RegisterCountMismatch,
}

impl From<HllError> for PfError {
    fn from(e: HllError) -> Self {
        match e {
            HllError::RegisterCountMismatch => PfError::RegisterCountMismatch,
            HllError::PrecisionOutOfRange => PfError::WrongType,
        }
    }
}

impl Keyspace {
    /// Observes values, creating the estimator at default precision
    /// when the key is missing. Returns `true` when any register
    /// changed.
    pub fn pfadd(&mut self, key: &str, values: &[String]) -> Result<bool, PfError> {
        let hll = match self.entry_for_write(key, || Value::Hll(HyperLogLog::default())) {
            Value::Hll(hll) => hll,
            _ => return Err(PfError::WrongType),
        };
        let mut changed = false;
        for v in values {
            changed |= hll.add(v);
        }
        Ok(changed)
    }

    /// Estimated cardinality of one key.
    pub fn pfcount(&mut self, key: &str) -> Result<u64, PfError> {
        match self.value(key) {
            None => Err(PfError::KeyNotFound),
            Some(Value::Hll(hll)) => Ok(hll.count()),
            Some(_) => Err(PfError::WrongType),
        }
    }

    /// Merges source estimators into `dest`. An existing destination
    /// participates as one of the sources; every source must exist and
    /// share the destination's register count.
    pub fn pfmerge(&mut self, dest: &str, sources: &[String]) -> Result<(), PfError> {
        let mut merged = match self.value(dest) {
            None => HyperLogLog::default(),
            Some(Value::Hll(hll)) => hll.clone(),
            Some(_) => return Err(PfError::WrongType),
        };

        for source in sources {
            match self.value(source) {
                None => return Err(PfError::KeyNotFound),
                Some(Value::Hll(hll)) => merged.merge(hll)?,
                Some(_) => return Err(PfError::WrongType),
            }
        }

        self.set_value(dest, Value::Hll(merged));
        Ok(())
    }
}
