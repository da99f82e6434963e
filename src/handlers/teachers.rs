//! Teacher accounts as managed by admins.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, map_db_error, ApiError, ApiResult, TxError},
    helpers::{principal_id, AdminScope, UnitFilter},
    models::User,
    schema::users,
    term::SCHOOL_UNITS,
    AppState,
};

use super::{admin_scope, like_pattern};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeacherQuery {
    pub unit: Option<String>,
    /// Name, email or TOTVS number.
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/teachers",
    tag = "Teachers",
    params(TeacherQuery),
    responses((status = 200, description = "Teachers linked to the admin's unit", body = [TeacherSchema])),
    security(("bearer_auth" = []))
)]
pub async fn list_teachers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<TeacherQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let mut q = users::table
        .select(User::as_select())
        .order(users::full_name.asc())
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(users::units.contains(vec![unit])),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }

    if let Some(pattern) = like_pattern(query.search.as_deref()) {
        q = q.filter(
            users::full_name
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern.clone()))
                .or(users::totvs_number.ilike(pattern)),
        );
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(q.load(&mut conn).map_err(db_failure)?))
}

/// OpenAPI shape of a teacher row.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct TeacherSchema {
    id: Uuid,
    totvs_number: String,
    full_name: String,
    email: String,
    units: Vec<String>,
    active: bool,
    recurring_booking_enabled: bool,
    recurring_booking_units: Vec<String>,
}

fn lock_visible(
    conn: &mut PgConnection,
    scope: &AdminScope,
    id: Uuid,
) -> Result<User, TxError> {
    users::table
        .find(id)
        .select(User::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .filter(|u: &User| match scope {
            AdminScope::All => true,
            AdminScope::Unit(unit) => u.belongs_to_unit(unit),
            AdminScope::Nothing => false,
        })
        .ok_or_else(|| ApiError::not_found("Professor não encontrado.", "TEACHER_NOT_FOUND").into())
}

fn check_units(units: &[String]) -> ApiResult<()> {
    match units.iter().find(|u| !SCHOOL_UNITS.contains(&u.as_str())) {
        Some(unknown) => Err(ApiError::validation(format!("Unidade desconhecida: {unknown}."))),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTeacherRequest {
    pub full_name: String,
    pub email: String,
    pub units: Vec<String>,
    #[serde(default)]
    pub recurring_booking_enabled: bool,
    #[serde(default)]
    pub recurring_booking_units: Vec<String>,
}

#[utoipa::path(
    put,
    path = "/admin/teachers/{id}",
    tag = "Teachers",
    params(("id" = Uuid, Path, description = "Teacher ID")),
    request_body = UpdateTeacherRequest,
    responses(
        (status = 200, description = "Updated", body = TeacherSchema),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Email already used", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_teacher(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTeacherRequest>,
) -> ApiResult<Json<User>> {
    let full_name = payload.full_name.trim();
    let email = payload.email.trim().to_lowercase();
    if full_name.is_empty() || email.is_empty() {
        return Err(ApiError::validation(
            "Por favor, preencha todos os campos obrigatórios.",
        ));
    }
    if payload.units.is_empty() {
        return Err(ApiError::validation(
            "Selecione pelo menos uma unidade onde você trabalha.",
        ));
    }
    check_units(&payload.units)?;
    check_units(&payload.recurring_booking_units)?;

    let admin_id = principal_id(&claims)?;
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = conn
        .transaction::<_, TxError, _>(|conn| {
            let before = lock_visible(conn, &scope, id)?;

            let after: User = diesel::update(users::table.find(id))
                .set((
                    users::full_name.eq(full_name),
                    users::email.eq(&email),
                    users::units.eq(&payload.units),
                    users::recurring_booking_enabled.eq(payload.recurring_booking_enabled),
                    users::recurring_booking_units.eq(&payload.recurring_booking_units),
                    users::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(User::as_returning())
                .get_result(conn)
                .map_err(|e| {
                    TxError::Api(map_db_error(
                        e,
                        "Este e-mail já está cadastrado no sistema.",
                        "Registro vinculado.",
                    ))
                })?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::UpdateUser, "users")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(after)
        })
        .map_err(TxError::into_response)?;

    info!(user_id = %id, "Teacher updated");
    Ok(Json(updated))
}

#[utoipa::path(
    post,
    path = "/admin/teachers/{id}/toggle-active",
    tag = "Teachers",
    params(("id" = Uuid, Path, description = "Teacher ID")),
    responses(
        (status = 200, description = "Access flipped", body = TeacherSchema),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn toggle_teacher_active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let admin_id = principal_id(&claims)?;
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = conn
        .transaction::<_, TxError, _>(|conn| {
            let before = lock_visible(conn, &scope, id)?;

            let after: User = diesel::update(users::table.find(id))
                .set((
                    users::active.eq(!before.active),
                    users::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(User::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::UpdateUser, "users")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(after)
        })
        .map_err(TxError::into_response)?;

    if !updated.active {
        // Live sessions end at their next refresh; this cuts them now.
        if let Err(e) = state
            .cache
            .token_revocation
            .revoke_all_for_principal(id, state.jwt_config.access_token_expiry as u64)
            .await
        {
            tracing::warn!(user_id = %id, error = %e, "Could not revoke sessions of disabled teacher");
        }
    }

    info!(user_id = %id, active = updated.active, "Teacher access toggled");
    Ok(Json(updated))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RemoveUnitRequest {
    /// Head office only; unit admins always remove their own unit.
    pub unit: Option<String>,
}

fn without(list: &[String], unit: &str) -> Vec<String> {
    list.iter().filter(|u| *u != unit).cloned().collect()
}

/// Unlinks the teacher from a unit without touching the rest of the account.
#[utoipa::path(
    post,
    path = "/admin/teachers/{id}/remove-unit",
    tag = "Teachers",
    params(("id" = Uuid, Path, description = "Teacher ID")),
    request_body = RemoveUnitRequest,
    responses(
        (status = 200, description = "Unit removed", body = TeacherSchema),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_teacher_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<RemoveUnitRequest>>,
) -> ApiResult<Json<User>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let scope = admin_scope(&state, &claims);
    let unit = scope.target_unit(payload.unit.as_deref())?;
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = conn
        .transaction::<_, TxError, _>(|conn| {
            let before = lock_visible(conn, &scope, id)?;
            if !before.belongs_to_unit(&unit) {
                return Err(ApiError::not_found(
                    "Professor não vinculado a esta unidade.",
                    "TEACHER_NOT_LINKED",
                )
                .into());
            }

            let after: User = diesel::update(users::table.find(id))
                .set((
                    users::units.eq(without(&before.units, &unit)),
                    users::recurring_booking_units
                        .eq(without(&before.recurring_booking_units, &unit)),
                    users::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(User::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::UpdateUser, "users")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(after)
        })
        .map_err(TxError::into_response)?;

    info!(user_id = %id, unit = %unit, "Teacher unlinked from unit");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_removes_only_the_unit() {
        let units = vec!["Objetivo Embaré".to_string(), "Objetivo Guarujá".to_string()];
        assert_eq!(without(&units, "Objetivo Embaré"), vec!["Objetivo Guarujá"]);
        assert_eq!(without(&units, "Matriz"), units);
    }

    #[test]
    fn test_unknown_units_are_rejected() {
        assert!(check_units(&["Objetivo Embaré".to_string()]).is_ok());
        let (_, body) = check_units(&["Escola X".to_string()]).unwrap_err();
        assert_eq!(body.0.error, "Unidade desconhecida: Escola X.");
    }
}
