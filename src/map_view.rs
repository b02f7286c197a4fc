//! View model for the delivery map.
//!
//! Pure assembly of whatever coordinates are available into a center, a
//! marker set, and a path. When the route service has no answer the path
//! degrades to a straight line pickup → rider → drop.

use serde::Serialize;

use crate::routing::Route;
use crate::utils::geo::LatLng;

/// Fallback center when no coordinate is known yet.
pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: 17.3850,
    lng: 78.4867,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Pickup,
    Drop,
    Rider,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Marker {
    pub kind: MarkerKind,
    pub point: LatLng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    Road,
    StraightLine,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub center: LatLng,
    pub markers: Vec<Marker>,
    pub path: Vec<LatLng>,
    pub path_source: PathSource,
    /// No coordinates at all; render a neutral placeholder.
    pub placeholder: bool,
}

pub fn build_map_view(
    pickup: Option<LatLng>,
    drop: Option<LatLng>,
    rider: Option<LatLng>,
    route: Option<&Route>,
) -> MapView {
    // Most specific point wins: rider > pickup > drop.
    let focus = rider.or(pickup).or(drop);
    let placeholder = focus.is_none();
    let center = focus.unwrap_or(DEFAULT_CENTER);

    let mut markers = Vec::new();
    if let Some(point) = pickup {
        markers.push(Marker {
            kind: MarkerKind::Pickup,
            point,
        });
    }
    if let Some(point) = drop {
        markers.push(Marker {
            kind: MarkerKind::Drop,
            point,
        });
    }
    if let Some(point) = rider {
        markers.push(Marker {
            kind: MarkerKind::Rider,
            point,
        });
    }

    let (path, path_source) = match route {
        Some(route) if !route.points.is_empty() => (route.points.clone(), PathSource::Road),
        _ => {
            let line: Vec<LatLng> = [pickup, rider, drop].into_iter().flatten().collect();
            if line.len() >= 2 {
                (line, PathSource::StraightLine)
            } else {
                (Vec::new(), PathSource::None)
            }
        }
    };

    MapView {
        center,
        markers,
        path,
        path_source,
        placeholder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PICKUP: LatLng = LatLng {
        lat: 17.38,
        lng: 78.48,
    };
    const DROP: LatLng = LatLng {
        lat: 17.44,
        lng: 78.35,
    };
    const RIDER: LatLng = LatLng {
        lat: 17.40,
        lng: 78.42,
    };

    fn road() -> Route {
        Route {
            distance_km: 8.4,
            duration_min: 21.0,
            points: vec![PICKUP, RIDER, DROP],
            steps: Vec::new(),
        }
    }

    #[test]
    fn test_center_precedence() {
        assert_eq!(
            build_map_view(Some(PICKUP), Some(DROP), Some(RIDER), None).center,
            RIDER
        );
        assert_eq!(
            build_map_view(Some(PICKUP), Some(DROP), None, None).center,
            PICKUP
        );
        assert_eq!(build_map_view(None, Some(DROP), None, None).center, DROP);
        assert_eq!(build_map_view(None, None, None, None).center, DEFAULT_CENTER);
    }

    #[test]
    fn test_route_polyline_preferred() {
        let route = road();
        let view = build_map_view(Some(PICKUP), Some(DROP), None, Some(&route));
        assert_eq!(view.path_source, PathSource::Road);
        assert_eq!(view.path.len(), 3);
    }

    #[test]
    fn test_straight_line_fallback_through_rider() {
        let view = build_map_view(Some(PICKUP), Some(DROP), Some(RIDER), None);
        assert_eq!(view.path_source, PathSource::StraightLine);
        assert_eq!(view.path, vec![PICKUP, RIDER, DROP]);
    }

    #[test]
    fn test_straight_line_without_rider() {
        let view = build_map_view(Some(PICKUP), Some(DROP), None, None);
        assert_eq!(view.path, vec![PICKUP, DROP]);
    }

    #[test]
    fn test_single_point_has_no_path() {
        let view = build_map_view(Some(PICKUP), None, None, None);
        assert_eq!(view.path_source, PathSource::None);
        assert!(view.path.is_empty());
        assert!(!view.placeholder);
    }

    #[test]
    fn test_placeholder_when_nothing_known() {
        let view = build_map_view(None, None, None, None);
        assert!(view.placeholder);
        assert!(view.markers.is_empty());
        assert_eq!(view.path_source, PathSource::None);
    }
}
