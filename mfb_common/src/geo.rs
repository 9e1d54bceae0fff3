use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

//--------------------------------------     Coordinates     ---------------------------------------------------------
/// A WGS84 (latitude, longitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_km(self, other)
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Haversine great-circle distance between two coordinates, in kilometres.
///
/// Used both for radius filtering and for client-facing ETA estimates, so it must stay within
/// floating-point tolerance of the standard formulation.
pub fn distance_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_within_permille(actual: f64, expected: f64) {
        let tolerance = expected * 0.001;
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn half_degree_on_the_equator() {
        // 0.5 degrees of longitude at the equator is one 720th of the Earth's circumference.
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(0.0, 0.5);
        let expected = 2.0 * std::f64::consts::PI * EARTH_RADIUS_KM / 720.0;
        assert_within_permille(distance_km(&a, &b), expected);
    }

    #[test]
    fn known_city_pair() {
        // Paris (48.8566, 2.3522) to London (51.5074, -0.1278) is ~343.5 km.
        let paris = Coordinates::new(48.8566, 2.3522);
        let london = Coordinates::new(51.5074, -0.1278);
        assert_within_permille(distance_km(&paris, &london), 343.5);
    }

    #[test]
    fn zero_distance_and_symmetry() {
        let a = Coordinates::new(-33.9249, 18.4241);
        let b = Coordinates::new(-26.2041, 28.0473);
        assert_eq!(distance_km(&a, &a), 0.0);
        assert!((distance_km(&a, &b) - distance_km(&b, &a)).abs() < 1e-9);
    }
}
