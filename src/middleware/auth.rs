use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::error::{AppError, AppResult};
use crate::utils::session::{verify_session, SessionClaims, UserRole};
use crate::AppState;

/// The raw bearer token, kept alongside the verified claims so downstream
/// calls can forward the patient's session to the REST fallback transport.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Extract and validate the Supabase session token from the Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = verify_session(auth.token(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    request
        .extensions_mut()
        .insert(SessionToken(auth.token().to_string()));
    Ok(next.run(request).await)
}

/// Require patient role
pub async fn require_patient(request: Request, next: Next) -> AppResult<Response> {
    let claims = request
        .extensions()
        .get::<SessionClaims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if claims.user_role != Some(UserRole::Patient) {
        return Err(AppError::Forbidden("Patient access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Require rider role
pub async fn require_rider(request: Request, next: Next) -> AppResult<Response> {
    let claims = request
        .extensions()
        .get::<SessionClaims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if claims.user_role != Some(UserRole::Rider) {
        return Err(AppError::Forbidden("Rider access required".to_string()));
    }

    Ok(next.run(request).await)
}
