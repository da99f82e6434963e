//! Audit log viewer for the head office.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::formatter::{change_tip, friendly_summary, FriendlySummary},
    error::{db_failure, get_db_conn, ApiResult},
    models::AuditLog,
    pagination::{PageRequest, Paged, DEFAULT_PER_PAGE},
    schema::{admin_audit_logs, admins},
    AppState,
};

use super::like_pattern;

/// Only the most recent entries are browsable.
const VIEWER_WINDOW: i64 = 100;
const UNKNOWN_ADMIN: &str = "Desconhecido/Deletado";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    /// Action code, table, record id or admin username.
    pub search: Option<String>,
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn first_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    DEFAULT_PER_PAGE
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogView {
    pub id: Uuid,
    pub action_type: String,
    pub table_name: String,
    pub record_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub old_data: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub new_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: NaiveDateTime,
    pub admin_username: String,
    pub admin_unit: String,
    pub summary: FriendlySummary,
    pub change_tip: Option<String>,
}

impl AuditLogView {
    fn build(log: AuditLog, username: Option<String>, unit: Option<String>) -> Self {
        let summary = friendly_summary(&log);
        let change_tip = change_tip(log.old_data.as_ref(), log.new_data.as_ref());
        Self {
            id: log.id,
            action_type: log.action_type,
            table_name: log.table_name,
            record_id: log.record_id,
            old_data: log.old_data,
            new_data: log.new_data,
            ip_address: log.ip_address,
            created_at: log.created_at,
            admin_username: username.unwrap_or_else(|| UNKNOWN_ADMIN.to_string()),
            admin_unit: unit.unwrap_or_else(|| UNKNOWN_ADMIN.to_string()),
            summary,
            change_tip,
        }
    }
}

#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    tag = "Audit",
    params(AuditLogQuery),
    responses((status = 200, description = "Latest audit entries, newest first", body = Paged<AuditLogView>)),
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Json<Paged<AuditLogView>>> {
    let page = PageRequest::new(query.page, query.per_page);

    let mut q = admin_audit_logs::table
        .left_join(admins::table)
        .select((
            AuditLog::as_select(),
            admins::username.nullable(),
            admins::unit.nullable(),
        ))
        .order(admin_audit_logs::created_at.desc())
        .limit(VIEWER_WINDOW)
        .into_boxed();

    if let Some(pattern) = like_pattern(query.search.as_deref()) {
        q = q.filter(
            admin_audit_logs::action_type
                .ilike(pattern.clone())
                .or(admin_audit_logs::table_name.ilike(pattern.clone()))
                .or(admin_audit_logs::record_id.ilike(pattern.clone()))
                .or(admins::username.ilike(pattern)),
        );
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let rows: Vec<(AuditLog, Option<String>, Option<String>)> =
        q.load(&mut conn).map_err(db_failure)?;

    Ok(Json(page.slice(rows, |(log, username, unit)| {
        AuditLogView::build(log, username, unit)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn log() -> AuditLog {
        AuditLog {
            id: Uuid::new_v4(),
            admin_id: None,
            action_type: "UPDATE_ROOM".to_string(),
            table_name: "rooms".to_string(),
            record_id: Some("r1".to_string()),
            old_data: Some(json!({"name": "Sala 1", "unit": "Objetivo Embaré"})),
            new_data: Some(json!({"name": "Sala 2", "unit": "Objetivo Embaré"})),
            ip_address: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_deleted_admin_is_shown_as_unknown() {
        let view = AuditLogView::build(log(), None, None);
        assert_eq!(view.admin_username, UNKNOWN_ADMIN);
        assert_eq!(view.admin_unit, UNKNOWN_ADMIN);
    }

    #[test]
    fn test_view_carries_summary_and_tip() {
        let view = AuditLogView::build(
            log(),
            Some("embare".to_string()),
            Some("Objetivo Embaré".to_string()),
        );
        assert_eq!(view.summary.action, "Editou Sala");
        assert_eq!(view.change_tip.as_deref(), Some("Nome: Sala 1 ➝ Sala 2"));
    }
}
