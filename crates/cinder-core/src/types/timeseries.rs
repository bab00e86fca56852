//! Time series: timestamped float samples with interval downsampling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from time-series operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TsError {
    /// An aggregation name other than avg/min/max.
    #[error("invalid aggregation method, choose 'avg', 'min', or 'max'")]
    UnknownAggregation,
}

/// How a series aggregates bucketed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Min,
    Max,
}

impl FromStr for Aggregation {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self, TsError> {
        match s.to_ascii_lowercase().as_str() {
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            _ => Err(TsError::UnknownAggregation),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
        }
    }
}

/// One sample: unix-seconds timestamp and a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TsPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Sorted samples plus the series' configured aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    points: Vec<TsPoint>,
    aggregation: Aggregation,
}

impl TimeSeries {
    /// Creates an empty series with the given aggregation tag.
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            points: Vec::new(),
            aggregation,
        }
    }

    /// The configured aggregation.
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Inserts a sample, keeping the point list sorted by timestamp.
    /// Equal timestamps insert after existing samples.
    pub fn add(&mut self, timestamp: i64, value: f64) {
        let at = self
            .points
            .partition_point(|p| p.timestamp <= timestamp);
        self.points.insert(at, TsPoint { timestamp, value });
    }

    /// The most recent sample.
    pub fn last(&self) -> Option<TsPoint> {
        self.points.last().copied()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` when the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Samples with `start < timestamp < end` — exclusive at both ends.
    pub fn range(&self, start: i64, end: i64) -> Vec<TsPoint> {
        self.points
            .iter()
            .filter(|p| p.timestamp > start && p.timestamp < end)
            .copied()
            .collect()
    }

    /// Buckets the samples in `(start, end)` by truncating timestamps
    /// to `interval` and emits one aggregated point per bucket, in
    /// encounter order.
    pub fn downsample(
        &self,
        start: i64,
        end: i64,
        interval: i64,
        method: Aggregation,
    ) -> Vec<TsPoint> {
        let mut result = Vec::new();
        let mut bucket_start: Option<i64> = None;
        let mut values: Vec<f64> = Vec::new();

        for p in self.range(start, end) {
            let bucket = p.timestamp - p.timestamp.rem_euclid(interval);
            match bucket_start {
                Some(current) if current == bucket => values.push(p.value),
                Some(current) => {
                    result.push(TsPoint {
                        timestamp: current,
                        value: aggregate(&values, method),
                    });
                    bucket_start = Some(bucket);
                    values = vec![p.value];
                }
                None => {
                    bucket_start = Some(bucket);
                    values.push(p.value);
                }
            }
        }

        if let Some(current) = bucket_start {
            result.push(TsPoint {
                timestamp: current,
                value: aggregate(&values, method),
            });
        }
        result
    }
}

/// Applies an aggregation over a non-empty bucket.
fn aggregate(values: &[f64], method: Aggregation) -> f64 {
    match method {
        Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}
