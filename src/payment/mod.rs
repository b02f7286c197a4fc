//! Payment submission against a delivery.
//!
//! One remote procedure records the payment decision. The transport story
//! mirrors tracking: primary service credential first, then the raw REST
//! call as the patient when the credential is rejected or the request is
//! flatly refused. Unlike tracking, failures here must reach the patient as
//! readable text, since they have to understand why a payment did not go
//! through.

pub mod upi;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::tracking::transport::RpcTransport;

const PAYMENT_RPC: &str = "create_delivery_payment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Upi,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Upi => "upi",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub ok: bool,
    pub amount: Option<i64>,
    pub message: String,
}

impl PaymentOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            amount: None,
            message: message.into(),
        }
    }

    fn succeeded(amount: Option<i64>) -> Self {
        let message = match amount {
            Some(amount) => format!("Payment of ₹{} recorded", amount),
            None => "Payment recorded".to_string(),
        };
        Self {
            ok: true,
            amount,
            message,
        }
    }
}

/// Shape of the `create_delivery_payment` reply.
#[derive(Debug, Deserialize)]
struct PaymentReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct PaymentClient {
    transports: Vec<Arc<dyn RpcTransport>>,
}

impl PaymentClient {
    pub fn new(transports: Vec<Arc<dyn RpcTransport>>) -> Self {
        Self { transports }
    }

    /// Record a payment decision. Preconditions are checked before any
    /// network call and each violation has its own message; `can_pay` is the
    /// OTP/paid gate the caller derived from a fresh tracking snapshot, and
    /// is re-enforced here regardless of what the UI showed.
    pub async fn pay(
        &self,
        delivery_id: Option<&str>,
        can_pay: bool,
        method: PaymentMethod,
        session: Option<&str>,
    ) -> PaymentOutcome {
        let Some(raw_id) = delivery_id.filter(|id| !id.is_empty()) else {
            return PaymentOutcome::rejected("No delivery to pay for");
        };

        let Ok(delivery_id) = Uuid::parse_str(raw_id) else {
            return PaymentOutcome::rejected("Invalid delivery reference");
        };

        if !can_pay {
            return PaymentOutcome::rejected(
                "Payment is locked until the rider verifies your OTP",
            );
        }

        let args = json!({
            "delivery_id": delivery_id,
            "payment_method": method.as_str(),
        });

        let mut last_failure = String::new();
        for transport in &self.transports {
            match transport.call(PAYMENT_RPC, &args, session).await {
                Ok(value) => return Self::interpret_reply(value),
                Err(e) if e.is_auth_rejected() || e.is_bad_request() => {
                    tracing::warn!(
                        transport = transport.name(),
                        "payment transport refused, retrying on next: {}",
                        e
                    );
                    last_failure = e.to_string();
                }
                Err(e) => {
                    tracing::warn!(transport = transport.name(), "payment failed: {}", e);
                    return PaymentOutcome::rejected(format!("Payment failed: {}", e));
                }
            }
        }

        PaymentOutcome::rejected(format!("Payment failed: {}", last_failure))
    }

    /// A transport-level success can still be a logical refusal; surface the
    /// backend's own wording when it offers any.
    fn interpret_reply(value: Value) -> PaymentOutcome {
        let reply: PaymentReply = match serde_json::from_value(normalize(value)) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("payment reply unreadable: {}", e);
                return PaymentOutcome::rejected("Payment failed");
            }
        };

        if reply.ok {
            let amount = reply
                .amount
                .filter(|a| a.is_finite())
                .map(|a| a.round() as i64);
            PaymentOutcome::succeeded(amount)
        } else {
            let message = reply
                .reason
                .or(reply.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Payment failed".to_string());
            PaymentOutcome::rejected(message)
        }
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Array(rows) => rows.into_iter().next().unwrap_or(Value::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::transport::TransportError;
    use crate::tracking::{PaymentStatus, TrackingClient, TrackingSnapshot};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedTransport {
        reply: Box<dyn Fn() -> Result<Value, TransportError> + Send + Sync>,
        calls: Mutex<usize>,
    }

    impl FixedTransport {
        fn new(
            reply: impl Fn() -> Result<Value, TransportError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl RpcTransport for FixedTransport {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn call(
            &self,
            _function: &str,
            _args: &Value,
            _session: Option<&str>,
        ) -> Result<Value, TransportError> {
            *self.calls.lock().unwrap() += 1;
            (self.reply)()
        }
    }

    const DELIVERY_ID: &str = "22222222-2222-2222-2222-222222222222";

    #[tokio::test]
    async fn test_precondition_messages_without_network() {
        let transport = FixedTransport::new(|| Ok(json!({"ok": true, "amount": 150})));
        let client = PaymentClient::new(vec![transport.clone()]);

        let none = client.pay(None, true, PaymentMethod::Cash, None).await;
        assert_eq!(none.message, "No delivery to pay for");

        let bad = client
            .pay(Some("not-a-uuid"), true, PaymentMethod::Cash, None)
            .await;
        assert_eq!(bad.message, "Invalid delivery reference");

        let locked = client
            .pay(Some(DELIVERY_ID), false, PaymentMethod::Cash, None)
            .await;
        assert!(locked.message.contains("locked"));

        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_logical_refusal_surfaces_backend_reason() {
        let transport = FixedTransport::new(|| {
            Ok(json!({"ok": false, "reason": "delivery already settled"}))
        });
        let client = PaymentClient::new(vec![transport]);

        let outcome = client
            .pay(Some(DELIVERY_ID), true, PaymentMethod::Upi, None)
            .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "delivery already settled");
    }

    #[tokio::test]
    async fn test_bad_request_falls_back_to_rest() {
        let primary = FixedTransport::new(|| {
            Err(TransportError::Status {
                status: 400,
                message: "bad request".into(),
            })
        });
        let fallback = FixedTransport::new(|| Ok(json!({"ok": true, "amount": 90})));
        let client = PaymentClient::new(vec![primary.clone(), fallback.clone()]);

        let outcome = client
            .pay(Some(DELIVERY_ID), true, PaymentMethod::Cash, Some("token"))
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.amount, Some(90));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_hard_failure_is_reported_not_retried() {
        let primary = FixedTransport::new(|| {
            Err(TransportError::Status {
                status: 500,
                message: "upstream down".into(),
            })
        });
        let fallback = FixedTransport::new(|| Ok(json!({"ok": true})));
        let client = PaymentClient::new(vec![primary, fallback.clone()]);

        let outcome = client
            .pay(Some(DELIVERY_ID), true, PaymentMethod::Cash, None)
            .await;
        assert!(!outcome.ok);
        assert!(outcome.message.contains("upstream down"));
        assert_eq!(fallback.calls(), 0);
    }

    /// End-to-end: verified OTP unlocks payment, a cash payment settles, the
    /// optimistic mark shows paid, and the success text carries the amount.
    #[tokio::test]
    async fn test_cash_payment_end_to_end() {
        let request_id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();

        let tracking_transport = FixedTransport::new(|| {
            Ok(json!({
                "delivery_id": DELIVERY_ID,
                "otp_verified": true,
                "payment_status": "unpaid",
                "fare_amount": 150.0
            }))
        });
        let tracking = TrackingClient::new(vec![tracking_transport]);

        let snapshot: TrackingSnapshot = tracking
            .poll(&request_id.to_string(), None)
            .await
            .expect("tracking available");
        assert!(snapshot.can_pay());

        let payment_transport = FixedTransport::new(|| Ok(json!({"ok": true, "amount": 150})));
        let payments = PaymentClient::new(vec![payment_transport]);

        let delivery = snapshot.delivery_id.unwrap().to_string();
        let outcome = payments
            .pay(Some(&delivery), snapshot.can_pay(), PaymentMethod::Cash, None)
            .await;
        assert!(outcome.ok);
        assert!(outcome.message.contains("150"));

        tracking.mark_paid(request_id);
        assert_eq!(
            tracking.cached(request_id).unwrap().payment_status,
            PaymentStatus::Paid
        );
    }
}
