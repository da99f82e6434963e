//! The admin notification bell.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiError, ApiResult},
    helpers::{AdminScope, UnitFilter},
    models::Notification,
    schema::notifications,
    AppState,
};

use super::admin_scope;

const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationList {
    pub data: Vec<Notification>,
    pub unread: i64,
}

type BoxedNotifications<'a> = notifications::BoxedQuery<'a, diesel::pg::Pg>;

/// Admin-role notifications inside the retention window, narrowed to what
/// the scope may see. None when the scope sees nothing.
fn visible(scope: &AdminScope, retention_days: i64) -> Option<BoxedNotifications<'static>> {
    let since = Utc::now().naive_utc() - Duration::days(retention_days);
    let q = notifications::table
        .filter(notifications::recipient_role.eq(ADMIN_ROLE))
        .filter(notifications::created_at.ge(since))
        .into_boxed();

    match scope.unit_filter(None) {
        UnitFilter::Any => Some(q),
        UnitFilter::Only(unit) => Some(q.filter(notifications::unit.eq(unit))),
        UnitFilter::Deny => None,
    }
}

#[utoipa::path(
    get,
    path = "/admin/notifications",
    tag = "Notifications",
    responses((status = 200, description = "Recent notifications, newest first", body = NotificationList)),
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<NotificationList>> {
    let scope = admin_scope(&state, &claims);
    let retention = state.booking.notification_retention_days;

    let Some(query) = visible(&scope, retention) else {
        return Ok(Json(NotificationList { data: Vec::new(), unread: 0 }));
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let data: Vec<Notification> = query
        .select(Notification::as_select())
        .order(notifications::created_at.desc())
        .load(&mut conn)
        .map_err(db_failure)?;
    let unread = data.iter().filter(|n| !n.read).count() as i64;

    Ok(Json(NotificationList { data, unread }))
}

fn not_found() -> (StatusCode, Json<ApiError>) {
    ApiError::not_found("Notificação não encontrada.", "NOTIFICATION_NOT_FOUND")
}

fn check_visible(conn: &mut PgConnection, scope: &AdminScope, id: Uuid) -> ApiResult<()> {
    let unit: Option<Option<String>> = notifications::table
        .find(id)
        .filter(notifications::recipient_role.eq(ADMIN_ROLE))
        .select(notifications::unit)
        .first(conn)
        .optional()
        .map_err(db_failure)?;

    match unit {
        Some(unit) if scope.is_super_admin() || unit.as_ref().is_some_and(|u| scope.allows(u)) => Ok(()),
        _ => Err(not_found()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/notifications/{id}/read",
    tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;
    check_visible(&mut conn, &scope, id)?;

    diesel::update(notifications::table.find(id))
        .set(notifications::read.eq(true))
        .execute(&mut conn)
        .map_err(db_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllResponse {
    pub updated: usize,
}

#[utoipa::path(
    post,
    path = "/admin/notifications/read-all",
    tag = "Notifications",
    responses((status = 200, description = "Everything in scope marked as read", body = MarkAllResponse)),
    security(("bearer_auth" = []))
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MarkAllResponse>> {
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    let unread = notifications::table
        .filter(notifications::recipient_role.eq(ADMIN_ROLE))
        .filter(notifications::read.eq(false));

    let updated = match scope.unit_filter(None) {
        UnitFilter::Any => diesel::update(unread)
            .set(notifications::read.eq(true))
            .execute(&mut conn),
        UnitFilter::Only(unit) => diesel::update(unread.filter(notifications::unit.eq(unit)))
            .set(notifications::read.eq(true))
            .execute(&mut conn),
        UnitFilter::Deny => Ok(0),
    }
    .map_err(db_failure)?;

    Ok(Json(MarkAllResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/admin/notifications/{id}",
    tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;
    check_visible(&mut conn, &scope, id)?;

    diesel::delete(notifications::table.find(id))
        .execute(&mut conn)
        .map_err(db_failure)?;
    Ok(StatusCode::NO_CONTENT)
}
