//! String operations: APPEND, STRLEN, INCRBY/DECRBY, GETRANGE, SETRANGE.

use crate::error::{IncrError, WrongType};
use crate::types::Value;

use super::Keyspace;

impl Keyspace {
    /// Appends to a string, creating it when missing. Returns the new
    /// length in bytes.
    pub fn append(&mut self, key: &str, suffix: &str) -> Result<usize, WrongType> {
        let value = self.entry_for_write(key, || Value::Str(String::new()));
        match value {
            Value::Str(s) => {
                s.push_str(suffix);
                Ok(s.len())
            }
            _ => Err(WrongType),
        }
    }

    /// Byte length of a string value; 0 when the key is missing.
    pub fn strlen(&mut self, key: &str) -> Result<usize, WrongType> {
        match self.value(key) {
            None => Ok(0),
            Some(Value::Str(s)) => Ok(s.len()),
            Some(_) => Err(WrongType),
        }
    }

    /// Adds `delta` to an integer-valued string, creating the key at
    /// `delta` when missing. Returns the new value.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64, IncrError> {
        let value = self.entry_for_write(key, || Value::Str("0".into()));
        match value {
            Value::Str(s) => {
                let current: i64 = s.trim().parse().map_err(|_| IncrError::NotAnInteger)?;
                let next = current.checked_add(delta).ok_or(IncrError::Overflow)?;
                *s = next.to_string();
                Ok(next)
            }
            _ => Err(IncrError::WrongType),
        }
    }

    /// Substring between `start` and `end` (inclusive), with negative
    /// indices counting from the end. Missing keys read as "".
    pub fn getrange(&mut self, key: &str, start: i64, end: i64) -> Result<String, WrongType> {
        let s = match self.value(key) {
            None => return Ok(String::new()),
            Some(Value::Str(s)) => s,
            Some(_) => return Err(WrongType),
        };

        let len = s.len() as i64;
        let (from, to) = crate::types::normalize_range(start, end, len);
        if from > to {
            return Ok(String::new());
        }
        // byte-indexed; a range splitting a multibyte character reads
        // as empty rather than panicking
        Ok(s.get(from as usize..=to as usize).unwrap_or("").to_owned())
    }

    /// Overwrites the string from `offset`, padding with spaces up to
    /// the offset when the current value is shorter. Returns the new
    /// length.
    pub fn setrange(&mut self, key: &str, offset: usize, patch: &str) -> Result<usize, WrongType> {
        let value = self.entry_for_write(key, || Value::Str(String::new()));
        match value {
            Value::Str(s) => {
                // splice at the byte level: pad with spaces up to the
                // offset, overwrite the patched region, keep any tail
                let mut bytes = std::mem::take(s).into_bytes();
                if offset > bytes.len() {
                    bytes.resize(offset, b' ');
                }
                let end = offset + patch.len();
                if end > bytes.len() {
                    bytes.resize(end, 0);
                }
                bytes[offset..end].copy_from_slice(patch.as_bytes());
                *s = String::from_utf8_lossy(&bytes).into_owned();
                Ok(s.len())
            }
            _ => Err(WrongType),
        }
    }
}
