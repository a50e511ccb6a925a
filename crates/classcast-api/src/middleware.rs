use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use classcast_types::api::{Claims, Role};

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the JWT from the Authorization header. Tokens are
/// minted by the platform's auth service; we only check the signature and
/// expiry, then hand the claims to the handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Compose, edit, delete, and reporting endpoints belong to the admin portal.
pub fn require_admin(claims: &Claims) -> Result<(), ApiError> {
    if claims.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin role required".into()))
    }
}

/// Inbox and mark-as-read belong to the student portal.
pub fn require_student(claims: &Claims) -> Result<(), ApiError> {
    if claims.role == Role::Student {
        Ok(())
    } else {
        Err(ApiError::Forbidden("student role required".into()))
    }
}
