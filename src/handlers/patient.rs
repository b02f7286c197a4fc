use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use uuid::Uuid;

use crate::fare::{delivery_fare, effective_distance_km, effective_fare};
use crate::location::{best_fix, AcquireOptions, PositionFix};
use crate::map_view::{build_map_view, MapView};
use crate::middleware::auth::SessionToken;
use crate::routing::RouteStep;
use crate::tracking::TrackingSnapshot;
use crate::utils::geo::{haversine_distance_km, LatLng};
use crate::AppState;

/// Current tracking snapshot for one of the patient's requests. `null` means
/// "not available"; callers cannot (and need not) tell a failed poll from a
/// delivery that does not exist yet.
pub async fn get_tracking(
    State(state): State<AppState>,
    Extension(token): Extension<SessionToken>,
    Path(request_id): Path<String>,
) -> Json<Option<TrackingSnapshot>> {
    Json(state.tracking.poll(&request_id, Some(&token.0)).await)
}

#[derive(Debug, Serialize)]
pub struct MapViewResponse {
    pub map: MapView,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
    pub fare: Option<i64>,
}

/// Everything the delivery map needs in one read: markers, path, and the
/// displayed distance/fare with server values taking precedence over the
/// locally computed route.
pub async fn get_map(
    State(state): State<AppState>,
    Extension(token): Extension<SessionToken>,
    Path(request_id): Path<String>,
) -> Json<MapViewResponse> {
    let snapshot = state.tracking.poll(&request_id, Some(&token.0)).await;

    let pickup = snapshot.as_ref().and_then(|s| s.pickup);
    let drop = snapshot.as_ref().and_then(|s| s.drop);

    // Rider position from the snapshot, else the last ping we ingested.
    let rider = snapshot.as_ref().and_then(|s| {
        let reported = s.rider.as_ref().and_then(|r| r.position());
        reported.or_else(|| {
            s.delivery_id
                .and_then(|delivery| state.fixes.last_fix(delivery))
                .map(|fix| fix.point)
        })
    });

    let route = match (pickup, drop) {
        (Some(from), Some(to)) => state.router.driving_route(from, to).await,
        _ => None,
    };

    // With no road route, the displayed distance falls back to the
    // straight line; the fare estimate does not (road distance only).
    let straight_km = match (pickup, drop) {
        (Some(from), Some(to)) => Some(haversine_distance_km(from, to)),
        _ => None,
    };
    let distance_km = effective_distance_km(
        snapshot.as_ref().and_then(|s| s.distance_km),
        route.as_ref().map(|r| r.distance_km).or(straight_km),
    );
    let fare = effective_fare(
        snapshot.as_ref().and_then(|s| s.fare_amount),
        route.as_ref().map(|r| r.distance_km),
    );

    Json(MapViewResponse {
        map: build_map_view(pickup, drop, rider, route.as_ref()),
        distance_km,
        duration_min: route.as_ref().map(|r| r.duration_min),
        fare,
    })
}

#[derive(Debug, Deserialize)]
pub struct RiderFixQuery {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

/// Wait briefly for the rider's best available position. Long-polls the
/// delivery's ping feed; `null` when no fix arrives inside the window.
pub async fn rider_fix(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
    Query(query): Query<RiderFixQuery>,
) -> Json<Option<PositionFix>> {
    let mut opts = AcquireOptions::default();
    if let Some(ms) = query.timeout_ms {
        opts.timeout = Duration::from_millis(ms.min(30_000));
    }
    if let Some(accuracy) = query.accuracy_m {
        if accuracy.is_finite() && accuracy > 0.0 {
            opts.desired_accuracy_m = accuracy;
        }
    }

    let feed = state.fixes.feed(delivery_id);
    Json(best_fix(&feed, opts).await)
}

#[derive(Debug, Deserialize)]
pub struct RoutePreviewQuery {
    pub from_lat: f64,
    pub from_lng: f64,
    pub to_lat: f64,
    pub to_lng: f64,
}

#[derive(Debug, Serialize)]
pub struct RoutePreviewResponse {
    pub distance_km: f64,
    pub duration_min: f64,
    pub fare: i64,
    pub points: Vec<LatLng>,
    pub steps: Vec<RouteStep>,
}

/// Route and estimated fare between two points, before any delivery exists.
pub async fn route_preview(
    State(state): State<AppState>,
    Query(query): Query<RoutePreviewQuery>,
) -> Json<Option<RoutePreviewResponse>> {
    let from = LatLng::new(query.from_lat, query.from_lng);
    let to = LatLng::new(query.to_lat, query.to_lng);

    let preview = state.router.driving_route(from, to).await.map(|route| {
        RoutePreviewResponse {
            fare: delivery_fare(route.distance_km),
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            points: route.points,
            steps: route.steps,
        }
    });

    Json(preview)
}
