//! Per-unit booking rules and notification settings.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, validation_error, ApiError, ApiResult},
    helpers::principal_id,
    models::UnitSettings,
    schema::settings,
    AppState,
};

use super::admin_scope;

/// What teachers need to know to fill in a booking form.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingRules {
    pub unit: String,
    pub min_advance_time_enabled: bool,
    pub min_advance_time_hours: i32,
    pub room_booking_enabled: bool,
    pub room_min_advance_time_enabled: bool,
    pub room_min_advance_time_hours: i32,
}

impl From<UnitSettings> for BookingRules {
    fn from(s: UnitSettings) -> Self {
        Self {
            unit: s.unit,
            min_advance_time_enabled: s.min_advance_time_enabled,
            min_advance_time_hours: s.min_advance_time_hours,
            room_booking_enabled: s.room_booking_enabled,
            room_min_advance_time_enabled: s.room_min_advance_time_enabled,
            room_min_advance_time_hours: s.room_min_advance_time_hours,
        }
    }
}

#[utoipa::path(
    get,
    path = "/settings/{unit}",
    tag = "Settings",
    params(("unit" = String, Path, description = "Unit name")),
    responses((status = 200, description = "Booking rules; defaults when never saved", body = BookingRules)),
    security(("bearer_auth" = []))
)]
pub async fn get_booking_rules(
    State(state): State<AppState>,
    Path(unit): Path<String>,
) -> ApiResult<Json<BookingRules>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let settings = UnitSettings::load(&mut conn, &unit).map_err(db_failure)?;
    Ok(Json(settings.into()))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SettingsQuery {
    /// Head office only.
    pub unit: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/settings",
    tag = "Settings",
    params(SettingsQuery),
    responses((status = 200, description = "Full settings of the unit", body = UnitSettings)),
    security(("bearer_auth" = []))
)]
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SettingsQuery>,
) -> ApiResult<Json<UnitSettings>> {
    let unit = admin_scope(&state, &claims).target_unit(query.unit.as_deref())?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(UnitSettings::load(&mut conn, &unit).map_err(db_failure)?))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateSettingsRequest {
    pub unit: Option<String>,
    #[serde(default)]
    pub min_advance_time_enabled: bool,
    #[serde(default)]
    #[validate(range(min = 0, max = 720, message = "Informe um número de horas entre 0 e 720."))]
    pub min_advance_time_hours: i32,
    #[serde(default)]
    pub room_booking_enabled: bool,
    #[serde(default)]
    pub room_min_advance_time_enabled: bool,
    #[serde(default)]
    #[validate(range(min = 0, max = 720, message = "Informe um número de horas entre 0 e 720."))]
    pub room_min_advance_time_hours: i32,
    #[validate(email(message = "Informe um e-mail válido para as notificações."))]
    pub notification_email: Option<String>,
    #[serde(default)]
    pub notification_email_enabled: bool,
}

/// Creates or replaces the unit's settings row.
#[utoipa::path(
    put,
    path = "/admin/settings",
    tag = "Settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Saved", body = UnitSettings),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Another unit", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(mut payload): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<UnitSettings>> {
    payload.notification_email = payload
        .notification_email
        .take()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    payload.validate().map_err(validation_error)?;

    let unit = admin_scope(&state, &claims).target_unit(payload.unit.as_deref())?;
    let admin_id = principal_id(&claims)?;

    let row = UnitSettings {
        unit: unit.clone(),
        min_advance_time_enabled: payload.min_advance_time_enabled,
        min_advance_time_hours: payload.min_advance_time_hours,
        room_booking_enabled: payload.room_booking_enabled,
        room_min_advance_time_enabled: payload.room_min_advance_time_enabled,
        room_min_advance_time_hours: payload.room_min_advance_time_hours,
        notification_email: payload.notification_email,
        notification_email_enabled: payload.notification_email_enabled,
        updated_at: Utc::now().naive_utc(),
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let saved = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let before = UnitSettings::load(conn, &unit)?;

            let saved: UnitSettings = diesel::insert_into(settings::table)
                .values(&row)
                .on_conflict(settings::unit)
                .do_update()
                .set(&row)
                .returning(UnitSettings::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::UpdateSettings, "settings")
                    .record(&unit)
                    .old(&before)
                    .new_data(&saved)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(saved)
        })
        .map_err(db_failure)?;

    info!(unit = %unit, "Unit settings saved");
    Ok(Json(saved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_rules_hide_notification_email() {
        let mut settings = UnitSettings::defaults_for("Objetivo Embaré");
        settings.notification_email = Some("secretaria@objetivosantos.com.br".to_string());
        let json = serde_json::to_value(BookingRules::from(settings)).unwrap();
        assert!(json.get("notification_email").is_none());
        assert_eq!(json["room_booking_enabled"], false);
    }

    #[test]
    fn test_negative_hours_are_rejected() {
        let req: UpdateSettingsRequest = serde_json::from_value(serde_json::json!({
            "min_advance_time_enabled": true,
            "min_advance_time_hours": -1
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bad_email_is_rejected() {
        let req: UpdateSettingsRequest = serde_json::from_value(serde_json::json!({
            "notification_email": "not-an-email",
            "notification_email_enabled": true
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
