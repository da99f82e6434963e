//! Authentication and role guards.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::jwt::{Claims, Role};
use crate::helpers::{hash_token, AdminScope};
use crate::AppState;

fn reject(status: StatusCode, error: &str, code: &str) -> Response {
    (status, Json(json!({"error": error, "code": code}))).into_response()
}

/// Validates the bearer access token and stores its claims in request
/// extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Missing authorization header",
                "MISSING_AUTH_HEADER",
            )
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        reject(
            StatusCode::UNAUTHORIZED,
            "Invalid authorization header format",
            "INVALID_AUTH_FORMAT",
        )
    })?;

    let claims = state.jwt_config.verify_access_token(token).map_err(|_| {
        reject(
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token",
            "INVALID_TOKEN",
        )
    })?;

    let revocation = &state.cache.token_revocation;
    let principal_revoked = match Uuid::parse_str(&claims.sub) {
        Ok(id) => revocation.is_principal_token_revoked(id, claims.iat).await,
        Err(_) => true,
    };
    if principal_revoked || revocation.is_token_revoked(&hash_token(token)).await {
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "Token has been revoked",
            "TOKEN_REVOKED",
        ));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn require_role(req: &Request, role: Role) -> Result<Claims, Response> {
    match req.extensions().get::<Claims>() {
        Some(c) if c.role == role => Ok(c.clone()),
        Some(_) => Err(reject(
            StatusCode::FORBIDDEN,
            "Acesso não permitido para este perfil.",
            "FORBIDDEN_ROLE",
        )),
        None => Err(reject(
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            "UNAUTHENTICATED",
        )),
    }
}

/// Teacher-only routes.
pub async fn teacher_auth_middleware(req: Request, next: Next) -> Result<Response, Response> {
    require_role(&req, Role::Teacher)?;
    Ok(next.run(req).await)
}

/// Admin-only routes.
pub async fn admin_auth_middleware(req: Request, next: Next) -> Result<Response, Response> {
    require_role(&req, Role::Admin)?;
    Ok(next.run(req).await)
}

/// Admins attached to the head office unit.
pub async fn super_admin_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let claims = require_role(&req, Role::Admin)?;

    match AdminScope::from_claims(&claims, &state.booking.super_admin_unit) {
        AdminScope::All => Ok(next.run(req).await),
        _ => Err(reject(
            StatusCode::FORBIDDEN,
            "Apenas a administração da Matriz pode acessar este recurso.",
            "SUPER_ADMIN_REQUIRED",
        )),
    }
}
