//! Time-series operations: TS.CREATE, TS.ADD, TS.GET, TS.RANGE,
//! and interval downsampling.

use thiserror::Error;

use crate::types::timeseries::{Aggregation, TimeSeries, TsPoint};
use crate::types::Value;

use super::Keyspace;

/// Errors from time-series operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TsOpError {
    /// Key holds a non-series type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// TS.CREATE on a key that already exists.
    #[error("key already exists")]
    AlreadyExists,
    /// An operation on a series that was never created.
    #[error("key not found")]
    NotFound,
    /// TS.GET on an empty series.
    #[error("no data points")]
    Empty,
}

impl Keyspace {
    fn series_ref(&mut self, key: &str) -> Result<&TimeSeries, TsOpError> {
        match self.value(key) {
            None => Err(TsOpError::NotFound),
            Some(Value::TimeSeries(ts)) => Ok(ts),
            Some(_) => Err(TsOpError::WrongType),
        }
    }

    /// Creates an empty series with the given aggregation. Fails when
    /// the key exists with any type.
    pub fn ts_create(&mut self, key: &str, aggregation: Aggregation) -> Result<(), TsOpError> {
        if self.value(key).is_some() {
            return Err(TsOpError::AlreadyExists);
        }
        self.set_value(key, Value::TimeSeries(TimeSeries::new(aggregation)));
        Ok(())
    }

    /// Inserts a sample into an existing series.
    pub fn ts_add(&mut self, key: &str, timestamp: i64, value: f64) -> Result<(), TsOpError> {
        match self.value_mut(key) {
            None => Err(TsOpError::NotFound),
            Some(Value::TimeSeries(ts)) => {
                ts.add(timestamp, value);
                Ok(())
            }
            Some(_) => Err(TsOpError::WrongType),
        }
    }

    /// The most recent sample.
    pub fn ts_get(&mut self, key: &str) -> Result<TsPoint, TsOpError> {
        self.series_ref(key)?.last().ok_or(TsOpError::Empty)
    }

    /// Samples with `start < timestamp < end`, exclusive at both ends.
    pub fn ts_range(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<TsPoint>, TsOpError> {
        Ok(self.series_ref(key)?.range(start, end))
    }

    /// Interval-bucketed aggregation over `(start, end)`.
    pub fn ts_downsample(
        &mut self,
        key: &str,
        start: i64,
        end: i64,
        interval: i64,
        method: Aggregation,
    ) -> Result<Vec<TsPoint>, TsOpError> {
        Ok(self.series_ref(key)?.downsample(start, end, interval, method))
    }
}
