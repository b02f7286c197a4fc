//! Patient-side delivery tracking.
//!
//! The backend exposes one remote procedure, `get_patient_tracking`, whose
//! argument name has not been stable across deployments. The poller remembers
//! the last argument name that worked, falls through the remaining candidates
//! only when the backend reports a function/argument mismatch, and switches
//! to the session-token transport when the service credential is rejected.
//! A failed attempt opens a cooldown window so poll-happy UIs (focus events,
//! refresh ticks) cannot turn into retry storms.

pub mod transport;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::utils::geo::LatLng;
use self::transport::RpcTransport;

const TRACKING_RPC: &str = "get_patient_tracking";

/// Cooldown after a fully-failed poll; calls inside the window return `None`
/// without touching the network.
pub const POLL_COOLDOWN: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Locked,
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl RiderInfo {
    pub fn position(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => {
                let point = LatLng::new(lat, lng);
                point.is_finite().then_some(point)
            }
            _ => None,
        }
    }
}

/// Point-in-time read of delivery, rider, and payment state. Produced fresh
/// on each poll; the only local mutation ever applied is the optimistic
/// paid mark after a successful payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    #[serde(default)]
    pub delivery_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rider: Option<RiderInfo>,
    #[serde(default)]
    pub pickup: Option<LatLng>,
    #[serde(default)]
    pub drop: Option<LatLng>,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub fare_amount: Option<f64>,
    #[serde(default)]
    pub otp_verified: bool,
    #[serde(default)]
    pub payment_status: PaymentStatus,
}

impl TrackingSnapshot {
    /// Payment is unlocked only once the rider has verified the patient's
    /// OTP and the delivery has not already been paid.
    pub fn can_pay(&self) -> bool {
        self.delivery_id.is_some()
            && self.otp_verified
            && self.payment_status != PaymentStatus::Paid
    }
}

/// Candidate argument names for the tracking procedure, in first-try order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKey {
    PRequestId,
    RequestId,
    Id,
    PId,
}

impl ArgKey {
    pub const ALL: [ArgKey; 4] = [ArgKey::PRequestId, ArgKey::RequestId, ArgKey::Id, ArgKey::PId];

    pub fn as_str(self) -> &'static str {
        match self {
            ArgKey::PRequestId => "p_request_id",
            ArgKey::RequestId => "request_id",
            ArgKey::Id => "id",
            ArgKey::PId => "p_id",
        }
    }
}

fn key_order(preferred: ArgKey) -> impl Iterator<Item = ArgKey> {
    std::iter::once(preferred).chain(ArgKey::ALL.into_iter().filter(move |k| *k != preferred))
}

struct PollerState {
    preferred: ArgKey,
    cooldown_until: Option<Instant>,
    generation: u64,
}

struct CachedSnapshot {
    generation: u64,
    snapshot: TrackingSnapshot,
}

pub struct TrackingClient {
    transports: Vec<Arc<dyn RpcTransport>>,
    cooldown: Duration,
    state: Mutex<PollerState>,
    cache: Mutex<HashMap<Uuid, CachedSnapshot>>,
}

impl TrackingClient {
    pub fn new(transports: Vec<Arc<dyn RpcTransport>>) -> Self {
        Self {
            transports,
            cooldown: POLL_COOLDOWN,
            state: Mutex::new(PollerState {
                preferred: ArgKey::PRequestId,
                cooldown_until: None,
                generation: 0,
            }),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current tracking state for a request, or `None` when it is not
    /// available. A malformed id, a cooldown window, and every transport
    /// failure all land on `None`; the caller does not distinguish them.
    pub async fn poll(&self, request_id: &str, session: Option<&str>) -> Option<TrackingSnapshot> {
        let Ok(id) = Uuid::parse_str(request_id) else {
            tracing::warn!(request_id, "rejecting non-uuid tracking request");
            return None;
        };
        self.poll_id(id, session).await
    }

    pub async fn poll_id(&self, id: Uuid, session: Option<&str>) -> Option<TrackingSnapshot> {
        let generation = {
            let mut state = self.state.lock().unwrap();
            if let Some(until) = state.cooldown_until {
                if Instant::now() < until {
                    tracing::debug!(%id, "tracking poll suppressed by cooldown");
                    return None;
                }
                state.cooldown_until = None;
            }
            state.generation += 1;
            state.generation
        };

        let value = self.call_with_fallback(id, session).await?;
        let value = unwrap_row(value)?;

        let snapshot: TrackingSnapshot = match serde_json::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%id, "tracking payload unreadable: {}", e);
                return None;
            }
        };

        self.store(id, generation, snapshot.clone());
        Some(snapshot)
    }

    async fn call_with_fallback(&self, id: Uuid, session: Option<&str>) -> Option<Value> {
        let preferred = self.state.lock().unwrap().preferred;

        for transport in &self.transports {
            for key in key_order(preferred) {
                let args = json!({ key.as_str(): id });
                match transport.call(TRACKING_RPC, &args, session).await {
                    Ok(value) => {
                        self.state.lock().unwrap().preferred = key;
                        return Some(value);
                    }
                    Err(e) if e.is_function_mismatch() => {
                        tracing::debug!(
                            transport = transport.name(),
                            arg = key.as_str(),
                            "argument name rejected, trying next"
                        );
                    }
                    Err(e) if e.is_auth_rejected() => {
                        tracing::warn!(
                            transport = transport.name(),
                            "credential rejected, switching transport: {}",
                            e
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(transport = transport.name(), "tracking poll failed: {}", e);
                        self.begin_cooldown();
                        return None;
                    }
                }
            }
        }

        self.begin_cooldown();
        None
    }

    fn begin_cooldown(&self) {
        let mut state = self.state.lock().unwrap();
        state.cooldown_until = Some(Instant::now() + self.cooldown);
        tracing::warn!(
            "tracking unavailable, suppressing polls for {:?}",
            self.cooldown
        );
    }

    /// Write a resolved snapshot, unless a newer poll already resolved.
    fn store(&self, id: Uuid, generation: u64, snapshot: TrackingSnapshot) {
        let mut cache = self.cache.lock().unwrap();
        match cache.get(&id) {
            Some(existing) if existing.generation > generation => {}
            _ => {
                cache.insert(
                    id,
                    CachedSnapshot {
                        generation,
                        snapshot,
                    },
                );
            }
        }
    }

    pub fn cached(&self, id: Uuid) -> Option<TrackingSnapshot> {
        self.cache
            .lock()
            .unwrap()
            .get(&id)
            .map(|c| c.snapshot.clone())
    }

    /// Optimistic mark after a successful payment; the next poll reconciles
    /// against server state.
    pub fn mark_paid(&self, id: Uuid) {
        if let Some(cached) = self.cache.lock().unwrap().get_mut(&id) {
            cached.snapshot.payment_status = PaymentStatus::Paid;
        }
    }
}

/// PostgREST returns set-returning functions as a JSON array; single-row
/// procedures come back as one object. Normalize to the row.
fn unwrap_row(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(rows) => rows.into_iter().next().filter(|row| !row.is_null()),
        other => Some(other),
    }
}
