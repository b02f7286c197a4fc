//! Delivery fare calculation.
//!
//! The server-side `fare_amount` is authoritative once a delivery exists;
//! everything here is the placeholder the UI shows before the backend has
//! priced the ride.

pub const BASE_FARE_INR: f64 = 30.0;
pub const PER_KM_INR: f64 = 18.0;
pub const MIN_FARE_INR: f64 = 90.0;

/// Distances below this are treated as "no ride".
const MIN_BILLABLE_KM: f64 = 0.01;

/// Fare in whole rupees for a driving distance in kilometers.
pub fn delivery_fare(distance_km: f64) -> i64 {
    let d = if distance_km.is_finite() && distance_km > 0.0 {
        distance_km
    } else {
        0.0
    };

    if d < MIN_BILLABLE_KM {
        return 0;
    }

    (BASE_FARE_INR + d * PER_KM_INR).max(MIN_FARE_INR).round() as i64
}

/// The fare to display: the server amount when present and finite, else the
/// route-derived estimate.
pub fn effective_fare(server_amount: Option<f64>, route_distance_km: Option<f64>) -> Option<i64> {
    match server_amount {
        Some(amount) if amount.is_finite() => Some(amount.round().max(0.0) as i64),
        _ => route_distance_km.map(delivery_fare),
    }
}

/// Same precedence rule for the displayed distance.
pub fn effective_distance_km(server: Option<f64>, route: Option<f64>) -> Option<f64> {
    server.filter(|d| d.is_finite()).or(route)
}
