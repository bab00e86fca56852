//! Dense-register HyperLogLog cardinality estimator.
//!
//! Register count is `m = 2^p` for a precision `p` in `[4, 18]`. Each
//! 8-bit register keeps the maximum rank observed for hashes landing in
//! it; the estimator combines them with a harmonic mean and applies
//! small- and large-range corrections.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest accepted precision (16 registers).
pub const MIN_PRECISION: u8 = 4;

/// Highest accepted precision (262144 registers).
pub const MAX_PRECISION: u8 = 18;

/// Precision used when a key is created implicitly by PFADD.
pub const DEFAULT_PRECISION: u8 = 14;

/// Errors from HyperLogLog construction and merging.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HllError {
    /// Precision outside `[4, 18]`.
    #[error("precision must be between {MIN_PRECISION} and {MAX_PRECISION}")]
    PrecisionOutOfRange,
    /// Merge attempted between estimators of different register counts.
    #[error("cannot merge estimators with different register counts")]
    RegisterCountMismatch,
}

/// Dense HyperLogLog with `2^precision` 8-bit registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl HyperLogLog {
    /// Creates an estimator with `2^precision` zeroed registers.
    pub fn new(precision: u8) -> Result<Self, HllError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(HllError::PrecisionOutOfRange);
        }
        Ok(Self {
            precision,
            registers: vec![0; 1 << precision],
        })
    }

    /// Number of registers.
    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Observes a value. Returns `true` if a register changed (the
    /// estimate may have moved).
    pub fn add(&mut self, value: &str) -> bool {
        let x = fnv1a64(value.as_bytes());
        let p = self.precision as u32;

        // low p bits select the register
        let index = (x & ((1u64 << p) - 1)) as usize;

        // rank = leading zeros of the remaining 64-p bits, plus one
        let w = x >> p;
        let rank = if w == 0 {
            (64 - p + 1) as u8
        } else {
            (w.leading_zeros() - p + 1) as u8
        };

        if self.registers[index] < rank {
            self.registers[index] = rank;
            true
        } else {
            false
        }
    }

    /// Estimates the cardinality of the observed set.
    pub fn count(&self) -> u64 {
        let m = self.registers.len() as f64;
        let alpha_mm = 0.7213 / (1.0 + 1.079 / m) * m * m;

        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 1.0 / f64::powi(2.0, r as i32))
            .sum();
        let mut estimate = alpha_mm / sum;

        // small-range correction: with empty registers, linear counting
        // is more accurate than the raw estimate
        let empty = self.registers.iter().filter(|&&r| r == 0).count();
        if empty > 0 {
            estimate = m * (m / empty as f64).ln();
        }

        // large-range correction for estimates approaching 2^32
        let two32 = (1u64 << 32) as f64;
        if estimate > two32 / 30.0 {
            estimate = -two32 * (1.0 - estimate / two32).ln();
        }

        estimate as u64
    }

    /// Merges another estimator into this one by taking the
    /// element-wise register maximum. Register counts must match.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<(), HllError> {
        if self.registers.len() != other.registers.len() {
            return Err(HllError::RegisterCountMismatch);
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
        Ok(())
    }
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION).expect("default precision is in range")
    }
}

/// 64-bit FNV-1a. The register layout depends on this exact hash, so it
/// must stay fixed for the life of a deployment.
fn fnv1a64(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_bounds_enforced() {
        assert!(HyperLogLog::new(3).is_err());
        assert!(HyperLogLog::new(19).is_err());
        assert!(HyperLogLog::new(4).is_ok());
        assert!(HyperLogLog::new(18).is_ok());
    }

    #[test]
    fn empty_estimator_counts_zero() {
        let hll = HyperLogLog::default();
        assert_eq!(hll.count(), 0);
    }

    #[test]
    fn duplicate_adds_do_not_grow_estimate() {
        let mut hll = HyperLogLog::default();
        hll.add("alpha");
        let one = hll.count();
        for _ in 0..100 {
            hll.add("alpha");
        }
        assert_eq!(hll.count(), one);
    }

    #[test]
    fn small_cardinalities_are_near_exact() {
        let mut hll = HyperLogLog::default();
        for i in 0..100 {
            hll.add(&format!("item-{i}"));
        }
        let estimate = hll.count() as f64;
        assert!((estimate - 100.0).abs() <= 2.0, "estimate {estimate}");
    }

    #[test]
    fn estimate_stays_close_at_50k() {
        let mut hll = HyperLogLog::default();
        let n = 50_000u64;
        for i in 0..n {
            hll.add(&format!("user:{i}"));
        }
        let estimate = hll.count() as f64;
        let error = (estimate - n as f64).abs() / n as f64;
        assert!(error < 0.025, "relative error {error}");
    }

    #[test]
    fn merge_approximates_union() {
        let mut a = HyperLogLog::default();
        let mut b = HyperLogLog::default();
        for i in 0..5_000 {
            a.add(&format!("left-{i}"));
            b.add(&format!("right-{i}"));
        }
        // overlap
        for i in 0..2_500 {
            b.add(&format!("left-{i}"));
        }

        a.merge(&b).unwrap();
        let estimate = a.count() as f64;
        let truth = 10_000.0;
        assert!((estimate - truth).abs() / truth < 0.05, "estimate {estimate}");
    }

    #[test]
    fn merge_rejects_mismatched_registers() {
        let mut a = HyperLogLog::new(14).unwrap();
        let b = HyperLogLog::new(10).unwrap();
        assert_eq!(a.merge(&b), Err(HllError::RegisterCountMismatch));
    }

    #[test]
    fn fnv_is_stable() {
        // pinned vectors for the FNV-1a 64 constants
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
