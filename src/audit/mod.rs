//! Administrative audit trail.

pub mod formatter;

use axum::http::HeaderMap;
use diesel::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{AuditLog, NewAuditLog};
use crate::schema::admin_audit_logs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CreateRoom,
    UpdateRoom,
    DeleteRoom,
    ToggleRoomAvailability,
    DeleteRoomBooking,
    CreateLoan,
    ReturnLoan,
    DeleteLoan,
    UpdateUser,
    DeleteBookings,
    UpdateAdmin,
    ResetAdminPassword,
    CreateEquipment,
    UpdateEquipment,
    DeleteEquipment,
    UpdateSettings,
    CreateAdmin,
    DeactivateRecurring,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateRoom => "CREATE_ROOM",
            AuditAction::UpdateRoom => "UPDATE_ROOM",
            AuditAction::DeleteRoom => "DELETE_ROOM",
            AuditAction::ToggleRoomAvailability => "TOGGLE_ROOM_AVAILABILITY",
            AuditAction::DeleteRoomBooking => "DELETE_ROOM_BOOKING",
            AuditAction::CreateLoan => "CREATE_LOAN",
            AuditAction::ReturnLoan => "RETURN_LOAN",
            AuditAction::DeleteLoan => "DELETE_LOAN",
            AuditAction::UpdateUser => "UPDATE_USER",
            AuditAction::DeleteBookings => "DELETE_BOOKINGS",
            AuditAction::UpdateAdmin => "UPDATE_ADMIN",
            AuditAction::ResetAdminPassword => "RESET_ADMIN_PASSWORD",
            AuditAction::CreateEquipment => "CREATE_EQUIPMENT",
            AuditAction::UpdateEquipment => "UPDATE_EQUIPMENT",
            AuditAction::DeleteEquipment => "DELETE_EQUIPMENT",
            AuditAction::UpdateSettings => "UPDATE_SETTINGS",
            AuditAction::CreateAdmin => "CREATE_ADMIN",
            AuditAction::DeactivateRecurring => "DEACTIVATE_RECURRING",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admin action about to be written.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub admin_id: Option<Uuid>,
    pub action: AuditAction,
    pub table: &'static str,
    pub record_id: Option<String>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub ip: Option<String>,
}

impl AuditEntry {
    pub fn new(admin_id: Uuid, action: AuditAction, table: &'static str) -> Self {
        Self {
            admin_id: Some(admin_id),
            action,
            table,
            record_id: None,
            old_data: None,
            new_data: None,
            ip: None,
        }
    }

    pub fn record(mut self, id: impl ToString) -> Self {
        self.record_id = Some(id.to_string());
        self
    }

    pub fn old<T: Serialize>(mut self, data: &T) -> Self {
        self.old_data = serde_json::to_value(data).ok();
        self
    }

    pub fn new_data<T: Serialize>(mut self, data: &T) -> Self {
        self.new_data = serde_json::to_value(data).ok();
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditService;

impl AuditService {
    /// Inserts the entry; run it inside the transaction that made the change.
    #[instrument(skip(conn, entry), fields(action = %entry.action, table = entry.table))]
    pub fn record(conn: &mut PgConnection, entry: AuditEntry) -> QueryResult<AuditLog> {
        let row = NewAuditLog {
            admin_id: entry.admin_id,
            action_type: entry.action.as_str().to_string(),
            table_name: entry.table.to_string(),
            record_id: entry.record_id,
            old_data: entry.old_data,
            new_data: entry.new_data,
            ip_address: entry.ip,
        };

        let log = diesel::insert_into(admin_audit_logs::table)
            .values(&row)
            .returning(AuditLog::as_returning())
            .get_result(conn)?;

        debug!(audit_id = %log.id, "Audit entry written");
        Ok(log)
    }

    /// Client address as reported by the reverse proxy.
    pub fn ip_from_headers(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_action_codes() {
        assert_eq!(AuditAction::CreateRoom.as_str(), "CREATE_ROOM");
        assert_eq!(
            AuditAction::ToggleRoomAvailability.as_str(),
            "TOGGLE_ROOM_AVAILABILITY"
        );
        assert_eq!(AuditAction::DeleteBookings.to_string(), "DELETE_BOOKINGS");
        assert_eq!(AuditAction::ResetAdminPassword.as_str(), "RESET_ADMIN_PASSWORD");
    }

    #[test]
    fn test_entry_builder() {
        let admin = Uuid::new_v4();
        let entry = AuditEntry::new(admin, AuditAction::UpdateRoom, "rooms")
            .record(42)
            .old(&serde_json::json!({"name": "A"}))
            .new_data(&serde_json::json!({"name": "B"}))
            .ip(Some("10.0.0.1".to_string()));

        assert_eq!(entry.admin_id, Some(admin));
        assert_eq!(entry.record_id.as_deref(), Some("42"));
        assert_eq!(entry.old_data.unwrap()["name"], "A");
        assert_eq!(entry.new_data.unwrap()["name"], "B");
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_ip_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(AuditService::ip_from_headers(&headers).is_none());

        headers.insert("x-real-ip", HeaderValue::from_static("192.168.0.9"));
        assert_eq!(
            AuditService::ip_from_headers(&headers).as_deref(),
            Some("192.168.0.9")
        );

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(
            AuditService::ip_from_headers(&headers).as_deref(),
            Some("203.0.113.7")
        );
    }
}
