use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair in the (lat, lng) ordering used by map clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite numbers. Coordinates that fail this check
    /// must never reach a routing request or a map view.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Calculate distance between two coordinates using Haversine formula
/// Returns distance in kilometers
pub fn haversine_distance_km(a: LatLng, b: LatLng) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_hyderabad_vijayawada() {
        // Hyderabad center
        let hyderabad = LatLng::new(17.3850, 78.4867);
        // Vijayawada center
        let vijayawada = LatLng::new(16.5062, 80.6480);

        let distance = haversine_distance_km(hyderabad, vijayawada);
        // Should be approximately 240-260 km
        assert!(distance > 220.0 && distance < 280.0);
    }

    #[test]
    fn test_finite_check() {
        assert!(LatLng::new(17.38, 78.48).is_finite());
        assert!(!LatLng::new(f64::NAN, 78.48).is_finite());
        assert!(!LatLng::new(17.38, f64::INFINITY).is_finite());
    }
}
