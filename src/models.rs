use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub totvs_number: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub units: Vec<String>,
    pub active: bool,
    pub recurring_booking_enabled: bool,
    pub recurring_booking_units: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn belongs_to_unit(&self, unit: &str) -> bool {
        self.units.iter().any(|u| u == unit)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub totvs_number: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub units: Vec<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::admins)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub unit: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::admins)]
pub struct NewAdmin {
    pub username: String,
    pub password_hash: String,
    pub unit: Option<String>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub principal_kind: String,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::equipment)]
pub struct Equipment {
    pub id: Uuid,
    #[schema(example = "Objetivo Embaré")]
    pub unit: String,
    #[schema(example = "Projetor")]
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub total_quantity: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::equipment)]
pub struct NewEquipment {
    pub unit: String,
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub total_quantity: i32,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::bookings)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub unit: String,
    pub local: String,
    pub booking_date: NaiveDate,
    #[schema(value_type = String, example = "07:30:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "09:10:00")]
    pub end_time: NaiveTime,
    pub equipment_id: Uuid,
    pub quantity: i32,
    pub observations: Option<String>,
    pub status: String,
    pub term_signed: bool,
    pub term_document: Option<serde_json::Value>,
    pub term_hash: Option<String>,
    pub display_id: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token: String,
    pub is_recurring: bool,
    pub recurring_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub unit: String,
    pub local: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub equipment_id: Uuid,
    pub quantity: i32,
    pub observations: Option<String>,
    pub status: String,
    pub term_signed: bool,
    pub term_document: Option<serde_json::Value>,
    pub term_hash: Option<String>,
    pub display_id: Option<String>,
    pub verification_token: String,
    pub is_recurring: bool,
    pub recurring_id: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::recurring_bookings)]
pub struct RecurringBooking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub unit: String,
    pub local: String,
    pub room_id: Option<Uuid>,
    pub day_of_week: i16,
    #[schema(value_type = String)]
    pub start_time: NaiveTime,
    #[schema(value_type = String)]
    pub end_time: NaiveTime,
    pub equipments: serde_json::Value,
    pub is_active: bool,
    pub last_generated_month: NaiveDate,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::recurring_bookings)]
pub struct NewRecurringBooking {
    pub user_id: Uuid,
    pub unit: String,
    pub local: String,
    pub room_id: Option<Uuid>,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub equipments: serde_json::Value,
    pub last_generated_month: NaiveDate,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::rooms)]
pub struct Room {
    pub id: Uuid,
    #[schema(example = "Laboratório de Ciências")]
    pub name: String,
    pub unit: String,
    pub capacity: i32,
    pub description: Option<String>,
    #[schema(value_type = String, example = "07:00:00")]
    pub min_time: NaiveTime,
    #[schema(value_type = String, example = "22:00:00")]
    pub max_time: NaiveTime,
    pub available_days: Vec<i32>,
    pub resources: Vec<String>,
    pub is_active: bool,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::rooms)]
pub struct NewRoom {
    pub name: String,
    pub unit: String,
    pub capacity: i32,
    pub description: Option<String>,
    pub min_time: NaiveTime,
    pub max_time: NaiveTime,
    pub available_days: Vec<i32>,
    pub resources: Vec<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::room_bookings)]
pub struct RoomBooking {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub unit: String,
    pub booking_date: NaiveDate,
    #[schema(value_type = String)]
    pub start_time: NaiveTime,
    #[schema(value_type = String)]
    pub end_time: NaiveTime,
    pub status: String,
    pub is_recurring: bool,
    pub recurring_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = crate::schema::room_bookings)]
pub struct NewRoomBooking {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub unit: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: String,
    pub is_recurring: bool,
    pub recurring_id: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::classrooms)]
pub struct Classroom {
    pub id: Uuid,
    #[schema(example = "1º Ano A")]
    pub name: String,
    pub unit: String,
    pub position: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::classrooms)]
pub struct NewClassroom {
    pub name: String,
    pub unit: String,
    pub position: i32,
}

#[derive(Debug, Queryable, Selectable, Insertable, AsChangeset, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::settings)]
#[diesel(treat_none_as_null = true)]
pub struct UnitSettings {
    pub unit: String,
    pub min_advance_time_enabled: bool,
    pub min_advance_time_hours: i32,
    pub room_booking_enabled: bool,
    pub room_min_advance_time_enabled: bool,
    pub room_min_advance_time_hours: i32,
    pub notification_email: Option<String>,
    pub notification_email_enabled: bool,
    pub updated_at: NaiveDateTime,
}

impl UnitSettings {
    /// Values used when a unit has never saved its settings.
    pub fn defaults_for(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            min_advance_time_enabled: false,
            min_advance_time_hours: 0,
            room_booking_enabled: false,
            room_min_advance_time_enabled: false,
            room_min_advance_time_hours: 0,
            notification_email: None,
            notification_email_enabled: false,
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Loads a unit's settings, falling back to defaults when no row exists.
    pub fn load(conn: &mut PgConnection, unit: &str) -> QueryResult<Self> {
        use crate::schema::settings;

        settings::table
            .find(unit)
            .select(UnitSettings::as_select())
            .first(conn)
            .optional()
            .map(|row| row.unwrap_or_else(|| Self::defaults_for(unit)))
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::equipment_loans)]
pub struct EquipmentLoan {
    pub id: Uuid,
    pub unit: String,
    pub equipment_id: Uuid,
    pub user_full_name: String,
    pub user_role: String,
    pub location: String,
    pub cpf: Option<String>,
    pub asset_number: Option<String>,
    pub quantity: i32,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: String,
    pub manual_term_url: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::equipment_loans)]
pub struct NewEquipmentLoan {
    pub unit: String,
    pub equipment_id: Uuid,
    pub user_full_name: String,
    pub user_role: String,
    pub location: String,
    pub cpf: Option<String>,
    pub asset_number: Option<String>,
    pub quantity: i32,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub manual_term_url: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::notifications)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub recipient_role: String,
    pub unit: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct NewNotification {
    pub message: String,
    pub link: Option<String>,
    pub recipient_role: String,
    pub unit: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::admin_audit_logs)]
pub struct AuditLog {
    pub id: Uuid,
    pub admin_id: Option<Uuid>,
    pub action_type: String,
    pub table_name: String,
    pub record_id: Option<String>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::admin_audit_logs)]
pub struct NewAuditLog {
    pub admin_id: Option<Uuid>,
    pub action_type: String,
    pub table_name: String,
    pub record_id: Option<String>,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::verification_logs)]
pub struct NewVerificationLog {
    pub booking_id: Uuid,
    pub action: String,
    pub performed_by: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::password_reset_tokens)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
    pub used_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::password_reset_tokens)]
pub struct NewPasswordResetToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
}
