//! Weekly ("fixed") bookings.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiError, ApiResult, TxError},
    helpers::{principal_id, UnitFilter},
    models::RecurringBooking,
    scheduling::{
        recurrence::{generate_due_months, parse_lines, weekday_name, GenerationReport, RecurrenceLine},
        rules::status,
    },
    schema::{bookings, recurring_bookings, room_bookings, rooms, users},
    AppState,
};

use super::{admin_scope, load_teacher};

#[derive(Debug, Serialize, ToSchema)]
pub struct RecurringView {
    #[serde(flatten)]
    pub recurrence: RecurringBooking,
    #[schema(example = "Terça-feira")]
    pub weekday: String,
    pub lines: Vec<RecurrenceLine>,
    pub room_name: Option<String>,
    pub teacher_name: String,
}

impl RecurringView {
    fn new(recurrence: RecurringBooking, room_name: Option<String>, teacher_name: String) -> Self {
        Self {
            weekday: weekday_name(recurrence.day_of_week).to_string(),
            lines: parse_lines(&recurrence),
            recurrence,
            room_name,
            teacher_name,
        }
    }
}

#[utoipa::path(
    get,
    path = "/recurring/mine",
    tag = "Recurring",
    responses((status = 200, description = "The teacher's active weekly bookings", body = [RecurringView])),
    security(("bearer_auth" = []))
)]
pub async fn my_recurring(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<RecurringView>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;

    let rows: Vec<(RecurringBooking, Option<String>)> = recurring_bookings::table
        .left_join(rooms::table)
        .filter(recurring_bookings::user_id.eq(teacher.id))
        .filter(recurring_bookings::is_active.eq(true))
        .order((recurring_bookings::day_of_week.asc(), recurring_bookings::start_time.asc()))
        .select((RecurringBooking::as_select(), rooms::name.nullable()))
        .load(&mut conn)
        .map_err(db_failure)?;

    Ok(Json(
        rows.into_iter()
            .map(|(rec, room)| RecurringView::new(rec, room, teacher.full_name.clone()))
            .collect(),
    ))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminRecurringQuery {
    pub unit: Option<String>,
    /// Include deactivated recurrences.
    #[serde(default)]
    pub include_inactive: bool,
}

#[utoipa::path(
    get,
    path = "/admin/recurring",
    tag = "Recurring",
    params(AdminRecurringQuery),
    responses((status = 200, description = "Weekly bookings of the admin's scope", body = [RecurringView])),
    security(("bearer_auth" = []))
)]
pub async fn list_recurring(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AdminRecurringQuery>,
) -> ApiResult<Json<Vec<RecurringView>>> {
    let mut q = recurring_bookings::table
        .inner_join(users::table)
        .left_join(rooms::table)
        .select((
            RecurringBooking::as_select(),
            rooms::name.nullable(),
            users::full_name,
        ))
        .order((
            recurring_bookings::unit.asc(),
            recurring_bookings::day_of_week.asc(),
            recurring_bookings::start_time.asc(),
        ))
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(recurring_bookings::unit.eq(unit)),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }
    if !query.include_inactive {
        q = q.filter(recurring_bookings::is_active.eq(true));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let rows: Vec<(RecurringBooking, Option<String>, String)> =
        q.load(&mut conn).map_err(db_failure)?;

    Ok(Json(
        rows.into_iter()
            .map(|(rec, room, teacher)| RecurringView::new(rec, room, teacher))
            .collect(),
    ))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeactivateResponse {
    pub recurrence: RecurringBooking,
    /// Future occurrences that were cancelled.
    pub cancelled_occurrences: usize,
}

/// Stops a weekly booking and cancels the occurrences that have not started.
#[utoipa::path(
    post,
    path = "/admin/recurring/{id}/deactivate",
    tag = "Recurring",
    params(("id" = Uuid, Path, description = "Recurring booking ID")),
    responses(
        (status = 200, description = "Deactivated", body = DeactivateResponse),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn deactivate_recurring(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeactivateResponse>> {
    let admin_id = principal_id(&claims)?;
    let scope = admin_scope(&state, &claims);
    let now = state.clock.now();
    let (today, clock) = (now.date(), now.time());
    let mut conn = get_db_conn(&state.db_pool)?;

    let response = conn
        .transaction::<_, TxError, _>(|conn| {
            let before: RecurringBooking = recurring_bookings::table
                .find(id)
                .select(RecurringBooking::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .filter(|r| scope.allows(&r.unit))
                .ok_or_else(|| {
                    ApiError::not_found("Agendamento fixo não encontrado.", "RECURRING_NOT_FOUND")
                })?;

            let after: RecurringBooking = diesel::update(recurring_bookings::table.find(id))
                .set(recurring_bookings::is_active.eq(false))
                .returning(RecurringBooking::as_returning())
                .get_result(conn)?;

            let mut cancelled = diesel::update(
                bookings::table
                    .filter(bookings::recurring_id.eq(id))
                    .filter(bookings::status.eq(status::ACTIVE))
                    .filter(
                        bookings::booking_date.gt(today).or(bookings::booking_date
                            .eq(today)
                            .and(bookings::start_time.gt(clock))),
                    ),
            )
            .set(bookings::status.eq(status::CANCELLED))
            .execute(conn)?;

            cancelled += diesel::update(
                room_bookings::table
                    .filter(room_bookings::recurring_id.eq(id))
                    .filter(room_bookings::status.eq(status::ROOM_CONFIRMED))
                    .filter(
                        room_bookings::booking_date.gt(today).or(room_bookings::booking_date
                            .eq(today)
                            .and(room_bookings::start_time.gt(clock))),
                    ),
            )
            .set(room_bookings::status.eq(status::CANCELLED))
            .execute(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::DeactivateRecurring, "recurring_bookings")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;

            Ok(DeactivateResponse {
                recurrence: after,
                cancelled_occurrences: cancelled,
            })
        })
        .map_err(TxError::into_response)?;

    info!(
        recurring_id = %id,
        cancelled = response.cancelled_occurrences,
        "Recurring booking deactivated"
    );
    Ok(Json(response))
}

/// Runs the month roll-over now instead of waiting for the worker.
#[utoipa::path(
    post,
    path = "/admin/recurring/generate",
    tag = "Recurring",
    responses((status = 200, description = "Generation report", body = GenerationReport)),
    security(("bearer_auth" = []))
)]
pub async fn generate_now(State(state): State<AppState>) -> ApiResult<Json<GenerationReport>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let report = generate_due_months(&mut conn, state.clock.today()).map_err(db_failure)?;
    Ok(Json(report))
}
