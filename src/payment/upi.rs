//! UPI deep links, QR rendering, and the patient's saved payment details.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use uuid::Uuid;

pub const UPI_CURRENCY: &str = "INR";

const PAYMENT_NOTE: &str = "Blood delivery fare";
const REFERENCE_MAX_LEN: usize = 18;

/// Heuristic VPA shape check. Advisory only: it gates whether a QR is worth
/// rendering, it does not verify the address exists.
pub fn is_plausible_vpa(vpa: &str) -> bool {
    if vpa.len() < 3 || vpa.len() > 80 {
        return false;
    }
    match vpa.find('@') {
        Some(at) => at > 0 && at < vpa.len() - 1,
        None => false,
    }
}

/// Build a `upi://pay` deep link. The amount is floored at zero; the
/// transaction reference is the first 18 characters of the delivery id, or a
/// timestamp when no delivery exists yet.
pub fn upi_payment_uri(vpa: &str, payee: &str, amount: i64, delivery_id: Option<&str>) -> String {
    let amount = amount.max(0);
    let reference = delivery_id
        .filter(|id| !id.is_empty())
        .map(|id| id.chars().take(REFERENCE_MAX_LEN).collect::<String>())
        .unwrap_or_else(|| format!("HL{}", Utc::now().timestamp()));

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("pa", vpa)
        .append_pair("pn", payee)
        .append_pair("am", &amount.to_string())
        .append_pair("cu", UPI_CURRENCY)
        .append_pair("tn", PAYMENT_NOTE)
        .append_pair("tr", &reference)
        .finish();

    format!("upi://pay?{}", query)
}

/// URL of a scannable QR image for a UPI URI. Rendering is delegated to an
/// external image service; nothing is generated locally.
pub fn qr_image_url(uri: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("size", "240x240")
        .append_pair("data", uri)
        .finish();

    format!("https://api.qrserver.com/v1/create-qr-code/?{}", query)
}

/// The patient's last-entered payment details, persisted under fixed keys so
/// the payment form is pre-filled on return visits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentPrefs {
    #[serde(rename = "haemolink_upi_vpa", default, skip_serializing_if = "Option::is_none")]
    pub upi_vpa: Option<String>,
    #[serde(rename = "haemolink_upi_payee", default, skip_serializing_if = "Option::is_none")]
    pub upi_payee: Option<String>,
}

/// JSON-file store of per-patient payment prefs. Write failures are logged
/// and otherwise ignored; prefs are a convenience, not state of record.
pub struct PrefsStore {
    path: PathBuf,
    entries: RwLock<HashMap<Uuid, PaymentPrefs>>,
}

impl PrefsStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "prefs file unreadable, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, patient_id: Uuid) -> PaymentPrefs {
        self.entries
            .read()
            .unwrap()
            .get(&patient_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&self, patient_id: Uuid, prefs: PaymentPrefs) {
        let snapshot = {
            let mut entries = self.entries.write().unwrap();
            entries.insert(patient_id, prefs);
            entries.clone()
        };

        match serde_json::to_string_pretty(&snapshot) {
            Ok(raw) => {
                if let Err(e) = fs::write(&self.path, raw) {
                    tracing::warn!(path = %self.path.display(), "failed to persist prefs: {}", e);
                }
            }
            Err(e) => tracing::warn!("failed to serialize prefs: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpa_heuristic() {
        assert!(is_plausible_vpa("ravi@upi"));
        assert!(is_plausible_vpa("a@b"));
        assert!(!is_plausible_vpa(""));
        assert!(!is_plausible_vpa("ab"));
        assert!(!is_plausible_vpa("no-at-sign"));
        assert!(!is_plausible_vpa("@bank"));
        assert!(!is_plausible_vpa("name@"));
        assert!(!is_plausible_vpa(&"x".repeat(81)));
    }

    #[test]
    fn test_uri_fields() {
        let uri = upi_payment_uri(
            "ravi@upi",
            "HAEMOLINK",
            150,
            Some("22222222-2222-2222-2222-222222222222"),
        );
        assert!(uri.starts_with("upi://pay?"));
        assert!(uri.contains("pa=ravi%40upi"));
        assert!(uri.contains("pn=HAEMOLINK"));
        assert!(uri.contains("am=150"));
        assert!(uri.contains("cu=INR"));
        // Reference is the delivery id truncated to 18 characters.
        assert!(uri.contains("tr=22222222-2222-2222"));
    }

    #[test]
    fn test_negative_amount_floors_to_zero() {
        let uri = upi_payment_uri("ravi@upi", "HAEMOLINK", -40, None);
        assert!(uri.contains("am=0"));
    }

    #[test]
    fn test_missing_delivery_gets_timestamp_reference() {
        let uri = upi_payment_uri("ravi@upi", "HAEMOLINK", 90, None);
        assert!(uri.contains("tr=HL"));
    }

    #[test]
    fn test_qr_url_embeds_uri() {
        let qr = qr_image_url("upi://pay?pa=ravi%40upi");
        assert!(qr.starts_with("https://api.qrserver.com/v1/create-qr-code/?"));
        assert!(qr.contains("data=upi%3A%2F%2Fpay"));
    }

    #[test]
    fn test_prefs_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "haemolink-prefs-test-{}.json",
            Uuid::new_v4()
        ));
        let patient = Uuid::new_v4();

        let store = PrefsStore::open(&path);
        assert_eq!(store.get(patient), PaymentPrefs::default());

        store.set(
            patient,
            PaymentPrefs {
                upi_vpa: Some("ravi@upi".into()),
                upi_payee: Some("Ravi".into()),
            },
        );

        let reopened = PrefsStore::open(&path);
        assert_eq!(reopened.get(patient).upi_vpa.as_deref(), Some("ravi@upi"));

        fs::remove_file(&path).ok();
    }
}
