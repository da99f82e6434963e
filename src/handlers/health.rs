//! Liveness and readiness probes.
//!
//! Readiness needs PostgreSQL; Redis is checked only when configured. The
//! outbox backlog is reported so a stalled notification dispatcher shows up
//! on the probe without failing it.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{schema::outbox_events, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    Up,
    Down,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Probe {
    pub status: ProbeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 3)]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Probe {
    fn timed(started: Instant) -> Self {
        Self {
            status: ProbeState::Up,
            latency_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        }
    }

    fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            status: ProbeState::Down,
            latency_ms: None,
            error: Some(error.to_string()),
        }
    }

    fn is_up(&self) -> bool {
        self.status == ProbeState::Up
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    #[schema(example = "healthy")]
    pub status: &'static str,
    #[schema(example = "agendamento")]
    pub service: &'static str,
    pub version: &'static str,
    /// Wall clock in the portal's local zone, as used by the booking rules.
    #[schema(example = "2026-03-10T07:30:00")]
    pub local_time: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub database: Probe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<Probe>,
    /// Outbox events not yet dispatched; absent if the count failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_events: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    #[schema(example = "ready")]
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Process answers", content_type = "text/plain"))
)]
pub async fn health_check_simple() -> &'static str {
    "OK"
}

#[utoipa::path(
    get,
    path = "/health/status",
    tag = "Health",
    responses((status = 200, description = "Build and clock information", body = ServiceStatus))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(service_status(state.clock.now()))
}

fn service_status(now: chrono::NaiveDateTime) -> ServiceStatus {
    ServiceStatus {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        local_time: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Dependencies reachable", body = ReadinessResponse),
        (status = 503, description = "A required dependency is down", body = ReadinessResponse)
    )
)]
pub async fn ready_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let (database, pending_events) = probe_database(&state);
    let redis = probe_redis(&state).await;

    let ready = database.is_up() && redis.as_ref().map_or(true, Probe::is_up);
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" },
            checks: ReadinessChecks {
                database,
                redis,
                pending_events,
            },
        }),
    )
}

fn probe_database(state: &AppState) -> (Probe, Option<i64>) {
    let started = Instant::now();
    let mut conn = match state.db_pool.get() {
        Ok(conn) => conn,
        Err(e) => return (Probe::failed(format!("pool: {e}")), None),
    };
    if let Err(e) = diesel::sql_query("SELECT 1").execute(&mut conn) {
        return (Probe::failed(e), None);
    }
    let probe = Probe::timed(started);

    let pending = outbox_events::table
        .filter(outbox_events::published.eq(false))
        .count()
        .get_result::<i64>(&mut conn)
        .ok();

    (probe, pending)
}

async fn probe_redis(state: &AppState) -> Option<Probe> {
    let pool = state.cache.redis_pool()?;
    let started = Instant::now();

    let mut conn = match pool.get().await {
        Ok(conn) => conn,
        Err(e) => return Some(Probe::failed(format!("pool: {e}"))),
    };
    let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    Some(match pong {
        Ok(_) => Probe::timed(started),
        Err(e) => Probe::failed(e),
    })
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn live_check() -> StatusCode {
    StatusCode::OK
}
