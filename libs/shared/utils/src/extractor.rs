use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Header set by the API gateway once it has resolved the caller's tenant.
pub const HEALTHCARE_ENTITY_HEADER: &str = "x-healthcare-entity-id";

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Resolves the tenant for a request: the token's claim wins, otherwise the
/// gateway header is used.
pub fn healthcare_entity_id(user: &User, headers: &HeaderMap) -> Result<i64, AppError> {
    if let Some(entity_id) = user.healthcare_entity_id {
        return Ok(entity_id);
    }

    let raw = headers
        .get(HEALTHCARE_ENTITY_HEADER)
        .ok_or_else(|| AppError::BadRequest("Healthcare entity ID required".to_string()))?
        .to_str()
        .map_err(|_| AppError::BadRequest("Invalid healthcare entity ID".to_string()))?;

    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::BadRequest("Invalid healthcare entity ID".to_string())),
    }
}
