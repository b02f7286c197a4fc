//! Driving-route lookup against an OSRM-compatible service.

use serde::{Deserialize, Serialize};

use crate::utils::geo::LatLng;

#[derive(Debug, Clone, Serialize)]
pub struct RouteStep {
    pub instruction: String,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub distance_km: f64,
    pub duration_min: f64,
    /// Road geometry in (lat, lng) order, ready for map consumption.
    pub points: Vec<LatLng>,
    pub steps: Vec<RouteStep>,
}

pub struct RouteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RouteClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Driving route between two points, or `None` when the service cannot
    /// provide one. Routing failures degrade to a straight-line display
    /// upstream, so nothing here is an error to the caller.
    pub async fn driving_route(&self, from: LatLng, to: LatLng) -> Option<Route> {
        if !from.is_finite() || !to.is_finite() {
            return None;
        }

        // OSRM wants (lng, lat) ordering in the path.
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson&steps=true",
            self.base_url.trim_end_matches('/'),
            from.lng,
            from.lat,
            to.lng,
            to.lat,
        );

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("route request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "route service rejected request");
            return None;
        }

        match response.json::<OsrmResponse>().await {
            Ok(body) => parse_route(body),
            Err(e) => {
                tracing::warn!("route response unreadable: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    #[serde(default)]
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    #[serde(default)]
    name: String,
    #[serde(default)]
    distance: f64,
}

fn parse_route(body: OsrmResponse) -> Option<Route> {
    let route = body.routes.into_iter().next()?;

    // GeoJSON coordinates arrive as (lng, lat).
    let points = route
        .geometry
        .coordinates
        .iter()
        .map(|&[lng, lat]| LatLng::new(lat, lng))
        .collect();

    let steps = route
        .legs
        .into_iter()
        .flat_map(|leg| leg.steps)
        .map(|step| RouteStep {
            instruction: if step.name.is_empty() {
                "Continue".to_string()
            } else {
                step.name
            },
            distance_m: step.distance,
        })
        .collect();

    Some(Route {
        distance_km: route.distance / 1000.0,
        duration_min: route.duration / 60.0,
        points,
        steps,
    })
}
