//! Admin accounts, managed by the head office.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::{jwt::Claims, password::PasswordService},
    config::Config,
    error::{db_failure, get_db_conn, map_db_error, ApiError, ApiResult, TxError},
    helpers::principal_id,
    models::{Admin, NewAdmin},
    schema::admins,
    term::SCHOOL_UNITS,
    AppState, DbPool,
};

use super::{auth::hash_password, like_pattern};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminQuery {
    /// Username or unit.
    pub search: Option<String>,
}

/// OpenAPI shape of an admin row.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct AdminSchema {
    id: Uuid,
    username: String,
    unit: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/admins",
    tag = "Admins",
    params(AdminQuery),
    responses((status = 200, description = "All admins, by username", body = [AdminSchema])),
    security(("bearer_auth" = []))
)]
pub async fn list_admins(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> ApiResult<Json<Vec<Admin>>> {
    let mut q = admins::table
        .select(Admin::as_select())
        .order(admins::username.asc())
        .into_boxed();

    if let Some(pattern) = like_pattern(query.search.as_deref()) {
        q = q.filter(
            admins::username
                .ilike(pattern.clone())
                .or(admins::unit.ilike(pattern)),
        );
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(q.load(&mut conn).map_err(db_failure)?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAdminRequest {
    #[schema(example = "guaruja")]
    pub username: String,
    pub password: String,
    /// A school unit, the head-office unit, or none.
    #[schema(example = "Objetivo Guarujá")]
    pub unit: Option<String>,
}

fn check_admin_unit(unit: Option<&str>, super_admin_unit: &str) -> ApiResult<Option<String>> {
    match unit.map(str::trim).filter(|u| !u.is_empty()) {
        None => Ok(None),
        Some(u) if u == super_admin_unit || SCHOOL_UNITS.contains(&u) => Ok(Some(u.to_string())),
        Some(u) => Err(ApiError::validation(format!("Unidade desconhecida: {u}."))),
    }
}

#[utoipa::path(
    post,
    path = "/admin/admins",
    tag = "Admins",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created", body = AdminSchema),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 409, description = "Username taken", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<CreateAdminRequest>,
) -> ApiResult<(StatusCode, Json<Admin>)> {
    let username = payload.username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::validation("Informe o nome de usuário."));
    }
    let unit = check_admin_unit(payload.unit.as_deref(), &state.booking.super_admin_unit)?;
    state
        .password_policy
        .validate(&payload.password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    let password_hash = hash_password(&state, &payload.password)?;
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let created = conn
        .transaction::<_, TxError, _>(|conn| {
            let created: Admin = diesel::insert_into(admins::table)
                .values(&NewAdmin {
                    username: username.clone(),
                    password_hash,
                    unit,
                })
                .returning(Admin::as_returning())
                .get_result(conn)
                .map_err(|e| {
                    TxError::Api(map_db_error(
                        e,
                        "Este nome de usuário já está em uso.",
                        "Registro vinculado.",
                    ))
                })?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::CreateAdmin, "admins")
                    .record(created.id)
                    .new_data(&created)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(created)
        })
        .map_err(TxError::into_response)?;

    info!(admin_id = %created.id, username = %created.username, "Admin created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetAdminPasswordRequest {
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/admin/admins/{id}/reset-password",
    tag = "Admins",
    params(("id" = Uuid, Path, description = "Admin ID")),
    request_body = ResetAdminPasswordRequest,
    responses(
        (status = 204, description = "Password replaced and sessions revoked"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reset_admin_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResetAdminPasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .password_policy
        .validate(&payload.password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    let password_hash = hash_password(&state, &payload.password)?;
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let target: Admin = admins::table
            .find(id)
            .select(Admin::as_select())
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Administrador não encontrado.", "ADMIN_NOT_FOUND"))?;

        diesel::update(admins::table.find(id))
            .set((
                admins::password_hash.eq(&password_hash),
                admins::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        // The old hash never goes into the log.
        AuditService::record(
            conn,
            AuditEntry::new(admin_id, AuditAction::ResetAdminPassword, "admins")
                .record(id)
                .new_data(&serde_json::json!({ "username": target.username }))
                .ip(AuditService::ip_from_headers(&headers)),
        )?;
        Ok(())
    })
    .map_err(TxError::into_response)?;

    if let Err(e) = state
        .cache
        .token_revocation
        .revoke_all_for_principal(id, state.jwt_config.access_token_expiry as u64)
        .await
    {
        warn!(admin_id = %id, error = %e, "Could not revoke sessions after password reset");
    }

    info!(admin_id = %id, "Admin password reset");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("hashing bootstrap password: {0}")]
    Hash(String),
}

/// Creates the head-office admin from `BOOTSTRAP_ADMIN_*` when no admin
/// with that username exists yet. Returns whether a row was inserted.
pub fn bootstrap_super_admin(pool: &DbPool, config: &Config) -> Result<bool, BootstrapError> {
    let (Some(username), Some(password)) = (
        config.bootstrap.admin_username.as_deref(),
        config.bootstrap.admin_password.as_deref(),
    ) else {
        return Ok(false);
    };

    let mut conn = pool.get()?;
    let username = username.trim().to_lowercase();
    let exists: bool = diesel::select(diesel::dsl::exists(
        admins::table.filter(admins::username.eq(&username)),
    ))
    .get_result(&mut conn)?;
    if exists {
        return Ok(false);
    }

    let password_hash =
        PasswordService::hash_password_with_cost(password, config.security.password_hash_cost)
            .map_err(|e| BootstrapError::Hash(e.to_string()))?;

    diesel::insert_into(admins::table)
        .values(&NewAdmin {
            username: username.clone(),
            password_hash,
            unit: Some(config.booking.super_admin_unit.clone()),
        })
        .execute(&mut conn)?;

    info!(username = %username, unit = %config.booking.super_admin_unit, "Head-office admin created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_unit_accepts_school_and_head_office() {
        assert_eq!(check_admin_unit(None, "Matriz").unwrap(), None);
        assert_eq!(check_admin_unit(Some("  "), "Matriz").unwrap(), None);
        assert_eq!(
            check_admin_unit(Some("Matriz"), "Matriz").unwrap().as_deref(),
            Some("Matriz")
        );
        assert_eq!(
            check_admin_unit(Some("Objetivo Guarujá"), "Matriz").unwrap().as_deref(),
            Some("Objetivo Guarujá")
        );
    }

    #[test]
    fn test_admin_unit_rejects_unknown() {
        let (status, _) = check_admin_unit(Some("Escola X"), "Matriz").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
