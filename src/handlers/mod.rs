//! HTTP handlers, one module per resource.

pub mod admins;
pub mod audit_logs;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod classrooms;
pub mod dashboard;
pub mod equipment;
pub mod health;
pub mod loans;
pub mod notifications;
pub mod recurring;
pub mod rooms;
pub mod settings;
pub mod teachers;
pub mod verification;

use diesel::prelude::*;

use crate::auth::jwt::Claims;
use crate::error::{db_failure, ApiError, ApiResult};
use crate::helpers::{principal_id, AdminScope};
use crate::models::User;
use crate::schema::users;
use crate::AppState;

/// Units visible to the calling admin.
pub(crate) fn admin_scope(state: &AppState, claims: &Claims) -> AdminScope {
    AdminScope::from_claims(claims, &state.booking.super_admin_unit)
}

/// The teacher behind a token. Disabled accounts are refused even while
/// their access token is still valid.
pub(crate) fn load_teacher(conn: &mut PgConnection, claims: &Claims) -> ApiResult<User> {
    let id = principal_id(claims)?;
    let user: User = users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(db_failure)?
        .ok_or_else(|| ApiError::unauthorized("Usuário não encontrado.", "USER_NOT_FOUND"))?;

    if !user.active {
        return Err(ApiError::forbidden(
            "Sua conta foi desativada. Entre em contato com a administração.",
            "ACCOUNT_INACTIVE",
        ));
    }
    Ok(user)
}

/// `%term%` for ILIKE searches, or None when the search box is empty.
pub(crate) fn like_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
}
