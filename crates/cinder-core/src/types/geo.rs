//! Geospatial set: named coordinates with haversine distances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A single named coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// Named geographic points with a secondary sorted-by-name view for
/// deterministic iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoSet {
    points: HashMap<String, GeoPoint>,
    order: Vec<String>,
}

impl GeoSet {
    /// Creates an empty geo set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a member or updates its coordinates. Returns `true` when
    /// the member is new.
    pub fn add(&mut self, member: &str, longitude: f64, latitude: f64) -> bool {
        let point = GeoPoint {
            longitude,
            latitude,
        };
        let new = self.points.insert(member.to_owned(), point).is_none();
        if new {
            let at = self
                .order
                .binary_search_by(|m| m.as_str().cmp(member))
                .unwrap_or_else(|i| i);
            self.order.insert(at, member.to_owned());
        }
        new
    }

    /// Coordinates for a member.
    pub fn get(&self, member: &str) -> Option<GeoPoint> {
        self.points.get(member).copied()
    }

    /// Great-circle distance in kilometres between two members, or
    /// `None` if either is missing.
    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        let pa = self.get(a)?;
        let pb = self.get(b)?;
        Some(haversine_km(pa, pb))
    }

    /// Members within `radius_km` of the given point, in name order.
    pub fn search_radius(&self, longitude: f64, latitude: f64, radius_km: f64) -> Vec<String> {
        let center = GeoPoint {
            longitude,
            latitude,
        };
        self.order
            .iter()
            .filter(|name| {
                let p = self.points[name.as_str()];
                haversine_km(center, p) <= radius_km
            })
            .cloned()
            .collect()
    }

    /// Iterates members and their coordinates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, GeoPoint)> {
        self.order
            .iter()
            .map(|name| (name.as_str(), self.points[name.as_str()]))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Haversine great-circle distance in kilometres.
fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get() {
        let mut geo = GeoSet::new();
        assert!(geo.add("paris", 2.3522, 48.8566));
        assert!(!geo.add("paris", 2.3522, 48.8566));
        let p = geo.get("paris").unwrap();
        assert_eq!(p.longitude, 2.3522);
        assert_eq!(p.latitude, 48.8566);
    }

    #[test]
    fn paris_london_distance() {
        let mut geo = GeoSet::new();
        geo.add("paris", 2.3522, 48.8566);
        geo.add("london", -0.1276, 51.5072);

        let d = geo.distance("paris", "london").unwrap();
        // ~344 km great-circle
        assert!((d - 344.0).abs() < 5.0, "distance {d}");
    }

    #[test]
    fn distance_to_self_is_zero() {
        let mut geo = GeoSet::new();
        geo.add("here", 10.0, 20.0);
        assert_eq!(geo.distance("here", "here"), Some(0.0));
    }

    #[test]
    fn distance_missing_member_is_none() {
        let mut geo = GeoSet::new();
        geo.add("a", 0.0, 0.0);
        assert_eq!(geo.distance("a", "missing"), None);
    }

    #[test]
    fn radius_search_filters_and_sorts() {
        let mut geo = GeoSet::new();
        geo.add("paris", 2.3522, 48.8566);
        geo.add("london", -0.1276, 51.5072);
        geo.add("tokyo", 139.6917, 35.6895);

        // 500 km around Paris reaches London but not Tokyo
        let hits = geo.search_radius(2.3522, 48.8566, 500.0);
        assert_eq!(hits, vec!["london".to_owned(), "paris".to_owned()]);
    }

    #[test]
    fn update_does_not_duplicate_order_entry() {
        let mut geo = GeoSet::new();
        geo.add("x", 1.0, 1.0);
        geo.add("x", 2.0, 2.0);
        assert_eq!(geo.len(), 1);
        let hits = geo.search_radius(2.0, 2.0, 1.0);
        assert_eq!(hits, vec!["x".to_owned()]);
    }
}
