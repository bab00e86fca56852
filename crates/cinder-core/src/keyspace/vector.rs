//! Vector operations: VECTOR.SET, VECTOR.GET, brute-force cosine search.

use crate::error::WrongType;
use crate::types::Value;

use super::Keyspace;

impl Keyspace {
    /// Stores a vector, replacing any prior value at the key.
    pub fn vector_set(&mut self, key: &str, vector: Vec<f64>) {
        self.set_value(key, Value::Vector(vector));
    }

    /// Fetches a vector.
    pub fn vector_get(&mut self, key: &str) -> Result<Option<Vec<f64>>, WrongType> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Vector(v)) => Ok(Some(v.clone())),
            Some(_) => Err(WrongType),
        }
    }

    /// Scans every vector-typed key, computing cosine distance to the
    /// query, and returns the `k` nearest as `(key, distance)` pairs in
    /// ascending distance order (ties broken by key). Read-only: runs
    /// under the shared lock without reaping.
    pub fn vector_search(&self, query: &[f64], k: usize) -> Vec<(String, f64)> {
        let now = chrono::Utc::now();
        let mut results: Vec<(String, f64)> = self
            .entries_for_scan(now)
            .filter_map(|(key, value)| match value {
                Value::Vector(v) => Some((key.to_owned(), cosine_distance(query, v))),
                _ => None,
            })
            .collect();

        results.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }
}

/// Cosine distance `1 - (a·b / (‖a‖ ‖b‖))`. Dimension mismatches and
/// zero vectors get the sentinel distance 1.0.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 1.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_round_trip() {
        let mut ks = Keyspace::new();
        ks.vector_set("v", vec![1.0, 2.0, 3.0]);
        assert_eq!(ks.vector_get("v").unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(ks.vector_get("missing").unwrap(), None);
    }

    #[test]
    fn identical_vectors_have_zero_distance() {
        let d = cosine_distance(&[1.0, 2.0], &[1.0, 2.0]);
        assert!(d.abs() < 1e-12);
    }

    #[test]
    fn orthogonal_vectors_have_distance_one() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_or_mismatched_vectors_get_sentinel() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 2.0]), 1.0);
    }

    #[test]
    fn search_returns_nearest_first() {
        let mut ks = Keyspace::new();
        ks.vector_set("exact", vec![1.0, 0.0]);
        ks.vector_set("close", vec![0.9, 0.1]);
        ks.vector_set("far", vec![-1.0, 0.0]);
        // non-vector keys are ignored by the scan
        ks.set("noise", "text".into(), None);

        let hits = ks.vector_search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "exact");
        assert_eq!(hits[1].0, "close");
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn search_k_larger_than_population() {
        let mut ks = Keyspace::new();
        ks.vector_set("only", vec![1.0]);
        assert_eq!(ks.vector_search(&[1.0], 10).len(), 1);
    }
}
