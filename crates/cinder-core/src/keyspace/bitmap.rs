//! Bitmap operations: SETBIT, GETBIT, BITCOUNT, BITOP.
//!
//! Bits are addressed MSB-first within each byte: offset 0 is the
//! most significant bit of byte 0. The bitfield module uses the same
//! ordering so both views of a value agree.

use std::str::FromStr;

use thiserror::Error;

use crate::error::WrongType;
use crate::types::Value;

use super::Keyspace;

/// Errors from bitmap operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BitmapError {
    /// Key holds a non-bytes type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// BITOP NOT with more than one source key.
    #[error("BITOP NOT must be called with a single source key")]
    NotTakesOneKey,
}

impl From<WrongType> for BitmapError {
    fn from(_: WrongType) -> Self {
        BitmapError::WrongType
    }
}

/// A BITOP operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

impl FromStr for BitOp {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(BitOp::And),
            "OR" => Ok(BitOp::Or),
            "XOR" => Ok(BitOp::Xor),
            "NOT" => Ok(BitOp::Not),
            _ => Err(()),
        }
    }
}

impl Keyspace {
    pub(crate) fn bytes_mut(&mut self, key: &str) -> Result<&mut Vec<u8>, WrongType> {
        match self.entry_for_write(key, || Value::Bytes(Vec::new())) {
            Value::Bytes(bytes) => Ok(bytes),
            _ => Err(WrongType),
        }
    }

    /// Bytes for a key; absent keys read as empty (all zero).
    fn bytes_ref(&mut self, key: &str) -> Result<&[u8], WrongType> {
        match self.value(key) {
            None => Ok(&[]),
            Some(Value::Bytes(bytes)) => Ok(bytes),
            Some(_) => Err(WrongType),
        }
    }

    /// Sets the bit at `offset`, growing the backing bytes as needed.
    /// Returns the prior bit.
    pub fn setbit(&mut self, key: &str, offset: usize, bit: bool) -> Result<u8, WrongType> {
        let bytes = self.bytes_mut(key)?;
        let byte_index = offset / 8;
        if bytes.len() <= byte_index {
            bytes.resize(byte_index + 1, 0);
        }

        let mask = 1u8 << (7 - offset % 8);
        let prev = u8::from(bytes[byte_index] & mask != 0);
        if bit {
            bytes[byte_index] |= mask;
        } else {
            bytes[byte_index] &= !mask;
        }
        Ok(prev)
    }

    /// Bit at `offset`; 0 when out of range or the key is missing.
    pub fn getbit(&mut self, key: &str, offset: usize) -> Result<u8, WrongType> {
        let bytes = self.bytes_ref(key)?;
        let byte_index = offset / 8;
        if byte_index >= bytes.len() {
            return Ok(0);
        }
        Ok((bytes[byte_index] >> (7 - offset % 8)) & 1)
    }

    /// Population count over all bytes.
    pub fn bitcount(&mut self, key: &str) -> Result<u32, WrongType> {
        let bytes = self.bytes_ref(key)?;
        Ok(bytes.iter().map(|b| b.count_ones()).sum())
    }

    /// Applies a bitwise operation over the source keys and stores the
    /// result at `dest`. Shorter operands are zero-padded; absent keys
    /// read as all-zero. Returns the result length in bytes.
    pub fn bitop(&mut self, op: BitOp, dest: &str, keys: &[String]) -> Result<usize, BitmapError> {
        if op == BitOp::Not && keys.len() != 1 {
            return Err(BitmapError::NotTakesOneKey);
        }

        // zero-padding the running result keeps the shorter operand
        // semantics right for every operator
        let mut result: Vec<u8> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let data = self.bytes_ref(key)?.to_vec();
            if result.len() < data.len() {
                result.resize(data.len(), 0);
            }

            for (j, slot) in result.iter_mut().enumerate() {
                let byte = data.get(j).copied().unwrap_or(0);
                if i == 0 {
                    *slot = if op == BitOp::Not { !byte } else { byte };
                } else {
                    match op {
                        BitOp::And => *slot &= byte,
                        BitOp::Or => *slot |= byte,
                        BitOp::Xor => *slot ^= byte,
                        BitOp::Not => unreachable!("NOT has exactly one source"),
                    }
                }
            }
        }

        let len = result.len();
        *self.bytes_mut(dest)? = result;
        Ok(len)
    }
}
