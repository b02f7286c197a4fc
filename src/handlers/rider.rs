use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::location::PositionFix;
use crate::utils::geo::LatLng;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RiderPingRequest {
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_accuracy")]
    pub accuracy_m: f64,
}

fn default_accuracy() -> f64 {
    100.0
}

/// Ingest a rider location ping for a delivery. Feeds live watchers and the
/// last-known-position fallback on the patient's map.
pub async fn post_ping(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
    Json(payload): Json<RiderPingRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let point = LatLng::new(payload.lat, payload.lng);
    if !point.is_finite() {
        return Err(AppError::BadRequest("Invalid coordinates".to_string()));
    }

    let accuracy_m = if payload.accuracy_m.is_finite() && payload.accuracy_m > 0.0 {
        payload.accuracy_m
    } else {
        default_accuracy()
    };

    state.fixes.publish(
        delivery_id,
        PositionFix {
            point,
            accuracy_m,
            recorded_at: Utc::now(),
        },
    );

    Ok(Json(serde_json::json!({ "message": "Position recorded" })))
}
