//! Geospatial operations: GEOADD, GEODIST, GEORADIUS.

use thiserror::Error;

use crate::types::geo::GeoSet;
use crate::types::Value;

use super::Keyspace;

/// Errors from geospatial operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// Key holds a non-geo type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// GEODIST with a member that isn't in the set.
    #[error("one or both members do not exist")]
    MemberNotFound,
}

impl Keyspace {
    /// Inserts or updates a named point. Returns `true` when the
    /// member is new.
    pub fn geoadd(
        &mut self,
        key: &str,
        longitude: f64,
        latitude: f64,
        member: &str,
    ) -> Result<bool, GeoError> {
        match self.entry_for_write(key, || Value::Geo(GeoSet::new())) {
            Value::Geo(geo) => Ok(geo.add(member, longitude, latitude)),
            _ => Err(GeoError::WrongType),
        }
    }

    /// Great-circle distance in kilometres between two members.
    pub fn geodist(&mut self, key: &str, a: &str, b: &str) -> Result<f64, GeoError> {
        match self.value(key) {
            None => Err(GeoError::MemberNotFound),
            Some(Value::Geo(geo)) => geo.distance(a, b).ok_or(GeoError::MemberNotFound),
            Some(_) => Err(GeoError::WrongType),
        }
    }

    /// Members within `radius_km` of the given point, in name order.
    pub fn geosearch(
        &mut self,
        key: &str,
        longitude: f64,
        latitude: f64,
        radius_km: f64,
    ) -> Result<Vec<String>, GeoError> {
        match self.value(key) {
            None => Ok(Vec::new()),
            Some(Value::Geo(geo)) => Ok(geo.search_radius(longitude, latitude, radius_km)),
            Some(_) => Err(GeoError::WrongType),
        }
    }
}
