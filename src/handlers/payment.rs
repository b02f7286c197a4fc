use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::SessionToken;
use crate::payment::upi::{is_plausible_vpa, qr_image_url, upi_payment_uri, PaymentPrefs};
use crate::payment::PaymentMethod;
use crate::tracking::TrackingSnapshot;
use crate::utils::session::SessionClaims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    /// The blood request being tracked; its fresh snapshot decides the gate.
    pub request_id: Uuid,
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub ok: bool,
    pub amount: Option<i64>,
    pub message: String,
    /// Post-payment state, reconciled against the backend when the payment
    /// succeeded.
    pub snapshot: Option<TrackingSnapshot>,
}

/// Record a cash/UPI payment decision against a delivery. The gate is
/// re-derived server-side from a fresh poll; the payment client enforces it
/// again before any network call.
pub async fn submit_payment(
    State(state): State<AppState>,
    Extension(token): Extension<SessionToken>,
    Path(delivery_id): Path<String>,
    Json(payload): Json<PaymentRequest>,
) -> Json<PaymentResponse> {
    let session = Some(token.0.as_str());

    let snapshot = state.tracking.poll_id(payload.request_id, session).await;
    let can_pay = snapshot.as_ref().is_some_and(|s| s.can_pay());

    let outcome = state
        .payments
        .pay(Some(&delivery_id), can_pay, payload.method, session)
        .await;

    let snapshot = if outcome.ok {
        state.tracking.mark_paid(payload.request_id);
        // Reconcile right away; the next server read wins over the
        // optimistic mark.
        state
            .tracking
            .poll_id(payload.request_id, session)
            .await
            .or_else(|| state.tracking.cached(payload.request_id))
    } else {
        snapshot
    };

    Json(PaymentResponse {
        ok: outcome.ok,
        amount: outcome.amount,
        message: outcome.message,
        snapshot,
    })
}

#[derive(Debug, Deserialize)]
pub struct UpiLinkRequest {
    pub vpa: String,
    pub payee: String,
    pub amount: i64,
    pub delivery_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpiLinkResponse {
    pub uri: String,
    pub qr_url: String,
}

/// Build a `upi://pay` deep link and QR image URL for the displayed fare,
/// remembering the entered VPA/payee for the next visit.
pub async fn upi_link(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(payload): Json<UpiLinkRequest>,
) -> AppResult<Json<UpiLinkResponse>> {
    if !is_plausible_vpa(&payload.vpa) {
        return Err(AppError::BadRequest(
            "Enter a valid UPI ID, like name@bank".to_string(),
        ));
    }
    if payload.payee.trim().is_empty() {
        return Err(AppError::BadRequest("Payee name is required".to_string()));
    }

    let uri = upi_payment_uri(
        &payload.vpa,
        payload.payee.trim(),
        payload.amount,
        payload.delivery_id.as_deref(),
    );

    state.prefs.set(
        claims.sub,
        PaymentPrefs {
            upi_vpa: Some(payload.vpa),
            upi_payee: Some(payload.payee.trim().to_string()),
        },
    );

    Ok(Json(UpiLinkResponse {
        qr_url: qr_image_url(&uri),
        uri,
    }))
}

/// Saved VPA/payee for pre-filling the payment form.
pub async fn get_prefs(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Json<PaymentPrefs> {
    Json(state.prefs.get(claims.sub))
}

pub async fn put_prefs(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(prefs): Json<PaymentPrefs>,
) -> Json<PaymentPrefs> {
    state.prefs.set(claims.sub, prefs.clone());
    Json(prefs)
}
