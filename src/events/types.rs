//! Domain event types.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::time::{format_br_date, format_hhmm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    BookingCreated,
    BookingCancelled,
    RoomBookingCreated,
    RecurringCreated,
    LoanCreated,
    LoanReturned,
    UserRegistered,
    LoginSuccess,
    LoginFailed,
    LogoutCompleted,
    PasswordResetRequested,
    PasswordResetCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BookingCreated => "booking.created",
            EventType::BookingCancelled => "booking.cancelled",
            EventType::RoomBookingCreated => "room_booking.created",
            EventType::RecurringCreated => "recurring.created",
            EventType::LoanCreated => "loan.created",
            EventType::LoanReturned => "loan.returned",
            EventType::UserRegistered => "user.registered",
            EventType::LoginSuccess => "auth.login.success",
            EventType::LoginFailed => "auth.login.failed",
            EventType::LogoutCompleted => "auth.logout",
            EventType::PasswordResetRequested => "auth.password.reset_requested",
            EventType::PasswordResetCompleted => "auth.password.reset_completed",
        }
    }

    /// Events that should reach the unit's admins.
    pub fn notifies_admins(stored: &str) -> bool {
        stored == EventType::BookingCreated.as_str()
            || stored == EventType::RoomBookingCreated.as_str()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    Booking,
    RoomBooking,
    Recurring,
    Loan,
    User,
    Admin,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Booking => "booking",
            AggregateType::RoomBooking => "room_booking",
            AggregateType::Recurring => "recurring_booking",
            AggregateType::Loan => "equipment_loan",
            AggregateType::User => "user",
            AggregateType::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub aggregate_type: AggregateType,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub actor_id: Option<Uuid>,
    pub unit: Option<String>,
    pub request_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            actor_id: None,
            unit: None,
            request_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload of `booking.created` and `room_booking.created`; everything the
/// dispatcher needs without touching the booking tables again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingNotice {
    pub teacher_name: String,
    pub unit: String,
    pub local: String,
    /// "Projetor (2), Notebook (1)" or the room name.
    pub what: String,
    /// First occurrence for weekly bookings.
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub observations: Option<String>,
    pub recurring: bool,
}

impl BookingNotice {
    pub fn message(&self) -> String {
        format!(
            "Novo agendamento: {} reservou {} em {} ({} {}-{})",
            self.teacher_name,
            self.what,
            self.local,
            format_br_date(self.date),
            format_hhmm(self.start_time),
            format_hhmm(self.end_time),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPayload {
    pub identifier: String,
    pub role: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanPayload {
    pub equipment_id: Uuid,
    pub borrower: String,
    pub quantity: i32,
}
