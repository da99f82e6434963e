//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_auth_attempt, record_booking_conflict, record_booking_created, record_notification,
    AuthOutcome, BookingKind, MetricsState,
};
pub use tracing::init_telemetry;
