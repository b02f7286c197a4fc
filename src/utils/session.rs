use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Application role carried in the `user_role` claim of a Supabase session
/// token. Account provisioning (and therefore the claim itself) is owned by
/// the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Patient,
    Rider,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: Uuid,       // user id
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_role: Option<UserRole>,
    pub exp: i64,        // expiration timestamp
}

/// Verify a Supabase-issued HS256 session token and return its claims.
pub fn verify_session(token: &str, secret: &str) -> AppResult<SessionClaims> {
    let mut validation = Validation::default();
    // Supabase sets aud to "authenticated"; we key trust on the shared secret.
    validation.validate_aud = false;

    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid session: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn issue(role: Option<UserRole>, secret: &str, ttl_hours: i64) -> String {
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            email: Some("patient@example.com".to_string()),
            user_role: role,
            exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_roundtrip() {
        let token = issue(Some(UserRole::Patient), "secret", 1);
        let claims = verify_session(&token, "secret").unwrap();
        assert_eq!(claims.user_role, Some(UserRole::Patient));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue(Some(UserRole::Rider), "secret", 1);
        assert!(verify_session(&token, "other").is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let token = issue(None, "secret", -1);
        assert!(verify_session(&token, "secret").is_err());
    }
}
