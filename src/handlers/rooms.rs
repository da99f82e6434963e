//! Rooms and room bookings.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiError, ApiErrorResponse, ApiResult, TxError},
    events::{outbox::OutboxService, AggregateType, BookingNotice, EventType},
    helpers::{principal_id, UnitFilter},
    middleware::RequestId,
    models::{
        NewRecurringBooking, NewRoom, NewRoomBooking, RecurringBooking, Room, RoomBooking,
        UnitSettings,
    },
    scheduling::{
        availability::{load_room_intervals, room_is_free},
        recurrence::{
            dates_until_month_end, insert_occurrences, is_future_occurrence, month_start, TermStamp,
        },
        rules::{check_room_booking, status, BookingDraft, Occurrence},
        time::deserialize_opt_time,
    },
    schema::{room_bookings, rooms, settings, users},
    telemetry::{record_booking_conflict, record_booking_created, BookingKind},
    AppState,
};

use super::{admin_scope, load_teacher};

const DEFAULT_CAPACITY: i32 = 40;
const DEFAULT_DAYS: [i32; 5] = [1, 2, 3, 4, 5];

fn default_min_time() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_max_time() -> NaiveTime {
    NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn room_not_found() -> ApiErrorResponse {
    ApiError::not_found("Sala não encontrada.", "ROOM_NOT_FOUND")
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomGroup {
    pub unit: String,
    pub rooms: Vec<Room>,
}

/// Groups rooms by unit, keeping the units in alphabetical order.
fn group_by_unit(rooms: Vec<Room>) -> Vec<RoomGroup> {
    let mut groups: BTreeMap<String, Vec<Room>> = BTreeMap::new();
    for room in rooms {
        groups.entry(room.unit.clone()).or_default().push(room);
    }
    groups
        .into_iter()
        .map(|(unit, rooms)| RoomGroup { unit, rooms })
        .collect()
}

/// Rooms the teacher can book: active, in their units, where the unit has
/// room booking turned on.
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "Rooms",
    responses((status = 200, description = "Bookable rooms grouped by unit", body = [RoomGroup])),
    security(("bearer_auth" = []))
)]
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<RoomGroup>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;

    let enabled: Vec<String> = settings::table
        .filter(settings::unit.eq_any(&teacher.units))
        .filter(settings::room_booking_enabled.eq(true))
        .select(settings::unit)
        .load(&mut conn)
        .map_err(db_failure)?;

    if enabled.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let found: Vec<Room> = rooms::table
        .filter(rooms::unit.eq_any(&enabled))
        .filter(rooms::is_active.eq(true))
        .order(rooms::name.asc())
        .select(Room::as_select())
        .load(&mut conn)
        .map_err(db_failure)?;

    Ok(Json(group_by_unit(found)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OccupancyQuery {
    #[param(value_type = String, example = "2026-03-10")]
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Interval {
    #[schema(value_type = String, example = "07:30:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "09:10:00")]
    pub end_time: NaiveTime,
}

#[utoipa::path(
    get,
    path = "/rooms/{id}/occupancy",
    tag = "Rooms",
    params(("id" = Uuid, Path, description = "Room ID"), OccupancyQuery),
    responses(
        (status = 200, description = "Confirmed intervals on the date", body = [Interval]),
        (status = 404, description = "Room not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn room_occupancy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OccupancyQuery>,
) -> ApiResult<Json<Vec<Interval>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let exists: bool = diesel::select(diesel::dsl::exists(rooms::table.find(id)))
        .get_result(&mut conn)
        .map_err(db_failure)?;
    if !exists {
        return Err(room_not_found());
    }

    let busy = load_room_intervals(&mut conn, id, query.date).map_err(db_failure)?;
    Ok(Json(
        busy.into_iter()
            .map(|(start_time, end_time)| Interval {
                start_time,
                end_time,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomBookingRequest {
    pub room_id: Uuid,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub day_of_week: Option<i16>,
    #[serde(default, deserialize_with = "deserialize_opt_time")]
    #[schema(value_type = Option<String>, example = "13:00")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_opt_time")]
    #[schema(value_type = Option<String>, example = "14:40")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub term_accepted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomBookingConfirmation {
    pub bookings: Vec<RoomBooking>,
    pub recurring_id: Option<Uuid>,
    pub room_name: String,
    pub rows_skipped: usize,
}

const ROOM_TAKEN: &str = "Horário indisponível! Alguém acabou de reservar.";

fn room_taken() -> TxError {
    record_booking_conflict(BookingKind::Room);
    ApiError::conflict(ROOM_TAKEN, "ROOM_UNAVAILABLE").into()
}

#[utoipa::path(
    post,
    path = "/room-bookings",
    tag = "Rooms",
    request_body = CreateRoomBookingRequest,
    responses(
        (status = 201, description = "Room booked", body = RoomBookingConfirmation),
        (status = 400, description = "Rule violation", body = ApiError),
        (status = 409, description = "Slot already taken", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_room_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
    Json(payload): Json<CreateRoomBookingRequest>,
) -> ApiResult<(StatusCode, Json<RoomBookingConfirmation>)> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;
    let now = state.clock.now();
    let today = now.date();

    let confirmation = conn
        .transaction::<_, TxError, _>(|conn| {
            // The row lock serialises concurrent bookings of the same room.
            let room: Room = rooms::table
                .find(payload.room_id)
                .select(Room::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .filter(|r| r.is_active)
                .ok_or_else(|| TxError::Api(room_not_found()))?;

            let settings = UnitSettings::load(conn, &room.unit)?;
            if !settings.room_booking_enabled {
                return Err(ApiError::forbidden(
                    "O agendamento de salas não está habilitado para esta unidade.",
                    "ROOM_BOOKING_DISABLED",
                )
                .into());
            }
            if !room.is_available {
                return Err(ApiError::bad_request(
                    "Esta sala está indisponível no momento.",
                    "ROOM_UNAVAILABLE",
                )
                .into());
            }

            let window = check_room_booking(
                &BookingDraft {
                    unit: &room.unit,
                    totvs_number: &teacher.totvs_number,
                    local: None,
                    date: payload.date,
                    day_of_week: payload.day_of_week,
                    start: payload.start_time,
                    end: payload.end_time,
                    is_recurring: payload.is_recurring,
                    term_accepted: payload.term_accepted,
                },
                &teacher,
                &settings,
                &room,
                now,
            )
            .map_err(|v| TxError::Api(v.into()))?;

            let (created, recurring_id, rows_skipped) = match window.occurrence {
                Occurrence::Once(date) => {
                    let busy = load_room_intervals(conn, room.id, date)?;
                    if !room_is_free(busy, window.start, window.end) {
                        return Err(room_taken());
                    }

                    let booking: RoomBooking = diesel::insert_into(room_bookings::table)
                        .values(&NewRoomBooking {
                            room_id: room.id,
                            user_id: teacher.id,
                            unit: room.unit.clone(),
                            booking_date: date,
                            start_time: window.start,
                            end_time: window.end,
                            status: status::ROOM_CONFIRMED.to_string(),
                            is_recurring: false,
                            recurring_id: None,
                        })
                        .returning(RoomBooking::as_returning())
                        .get_result(conn)?;
                    (vec![booking], None, 0)
                }
                Occurrence::Weekly(dow) => {
                    let rec: RecurringBooking = diesel::insert_into(
                        crate::schema::recurring_bookings::table,
                    )
                    .values(&NewRecurringBooking {
                        user_id: teacher.id,
                        unit: room.unit.clone(),
                        local: room.name.clone(),
                        room_id: Some(room.id),
                        day_of_week: dow,
                        start_time: window.start,
                        end_time: window.end,
                        equipments: serde_json::json!([]),
                        last_generated_month: month_start(today),
                    })
                    .returning(RecurringBooking::as_returning())
                    .get_result(conn)?;

                    let mut dates = dates_until_month_end(today, dow);
                    dates.retain(|d| is_future_occurrence(*d, window.start, now));
                    let report = insert_occurrences(conn, &rec, &dates, &TermStamp::default())?;

                    if !dates.is_empty() && report.rows_created == 0 {
                        return Err(room_taken());
                    }

                    let created = room_bookings::table
                        .filter(room_bookings::recurring_id.eq(rec.id))
                        .order(room_bookings::booking_date.asc())
                        .select(RoomBooking::as_select())
                        .load(conn)?;
                    (created, Some(rec.id), report.rows_skipped)
                }
            };

            let first_date = match (created.first(), window.occurrence) {
                (Some(b), _) => b.booking_date,
                (None, Occurrence::Once(d)) => d,
                (None, Occurrence::Weekly(_)) => today,
            };
            let notice = BookingNotice {
                teacher_name: teacher.full_name.clone(),
                unit: room.unit.clone(),
                local: room.name.clone(),
                what: room.name.clone(),
                date: first_date,
                start_time: window.start,
                end_time: window.end,
                observations: None,
                recurring: payload.is_recurring,
            };
            let (aggregate, aggregate_id) = match (recurring_id, created.first()) {
                (Some(id), _) => (AggregateType::Recurring, id),
                (None, Some(b)) => (AggregateType::RoomBooking, b.id),
                (None, None) => (AggregateType::RoomBooking, room.id),
            };
            OutboxService::emit(
                conn,
                EventType::RoomBookingCreated,
                aggregate,
                aggregate_id,
                serde_json::to_value(&notice).unwrap_or_default(),
                Some(teacher.id),
                Some(room.unit.clone()),
                Some(request_id.to_string()),
            )?;

            Ok(RoomBookingConfirmation {
                bookings: created,
                recurring_id,
                room_name: room.name,
                rows_skipped,
            })
        })
        .map_err(TxError::into_response)?;

    record_booking_created(BookingKind::Room, confirmation.bookings.len());
    info!(
        user_id = %teacher.id,
        room_id = %payload.room_id,
        rows = confirmation.bookings.len(),
        "Room booked"
    );
    Ok((StatusCode::CREATED, Json(confirmation)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomBookingView {
    #[serde(flatten)]
    pub booking: RoomBooking,
    pub room_name: String,
    pub teacher_name: String,
}

#[utoipa::path(
    get,
    path = "/room-bookings/mine",
    tag = "Rooms",
    responses((status = 200, description = "Upcoming room bookings", body = [RoomBookingView])),
    security(("bearer_auth" = []))
)]
pub async fn my_room_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<RoomBookingView>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;

    let rows: Vec<(RoomBooking, String)> = room_bookings::table
        .inner_join(rooms::table)
        .filter(room_bookings::user_id.eq(teacher.id))
        .filter(room_bookings::status.eq(status::ROOM_CONFIRMED))
        .filter(room_bookings::booking_date.ge(state.clock.today()))
        .order((room_bookings::booking_date.asc(), room_bookings::start_time.asc()))
        .select((RoomBooking::as_select(), rooms::name))
        .load(&mut conn)
        .map_err(db_failure)?;

    Ok(Json(
        rows.into_iter()
            .map(|(booking, room_name)| RoomBookingView {
                booking,
                room_name,
                teacher_name: teacher.full_name.clone(),
            })
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/room-bookings/{id}/cancel",
    tag = "Rooms",
    params(("id" = Uuid, Path, description = "Room booking ID")),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_room_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = diesel::update(
        room_bookings::table
            .find(id)
            .filter(room_bookings::user_id.eq(user_id)),
    )
    .set(room_bookings::status.eq(status::CANCELLED))
    .execute(&mut conn)
    .map_err(db_failure)?;

    if updated == 0 {
        return Err(ApiError::not_found("Reserva não encontrada.", "ROOM_BOOKING_NOT_FOUND"));
    }

    info!(room_booking_id = %id, user_id = %user_id, "Room booking cancelled by teacher");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminRoomQuery {
    pub unit: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/rooms",
    tag = "Rooms",
    params(AdminRoomQuery),
    responses((status = 200, description = "Rooms of the admin's scope", body = [Room])),
    security(("bearer_auth" = []))
)]
pub async fn admin_list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AdminRoomQuery>,
) -> ApiResult<Json<Vec<Room>>> {
    let mut q = rooms::table
        .select(Room::as_select())
        .order((rooms::unit.asc(), rooms::name.asc()))
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(rooms::unit.eq(unit)),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(q.load(&mut conn).map_err(db_failure)?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoomRequest {
    /// Ignored for unit admins.
    pub unit: Option<String>,
    #[schema(example = "Laboratório de Ciências")]
    pub name: String,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_time")]
    #[schema(value_type = Option<String>, example = "07:00")]
    pub min_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_opt_time")]
    #[schema(value_type = Option<String>, example = "22:00")]
    pub max_time: Option<NaiveTime>,
    /// Weekday numbers, 0 = Sunday.
    pub available_days: Option<Vec<i32>>,
    pub resources: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// A room form with defaults applied and checked.
#[derive(Debug, Clone, PartialEq)]
struct RoomForm {
    name: String,
    capacity: i32,
    description: Option<String>,
    min_time: NaiveTime,
    max_time: NaiveTime,
    available_days: Vec<i32>,
    resources: Vec<String>,
}

impl RoomRequest {
    fn form(&self) -> ApiResult<RoomForm> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("Informe o nome da sala."));
        }
        let capacity = self.capacity.unwrap_or(DEFAULT_CAPACITY);
        if capacity < 1 {
            return Err(ApiError::validation("A capacidade deve ser de pelo menos 1 pessoa."));
        }
        let min_time = self.min_time.unwrap_or_else(default_min_time);
        let max_time = self.max_time.unwrap_or_else(default_max_time);
        if max_time <= min_time {
            return Err(ApiError::validation(
                "O horário de fechamento deve ser posterior ao de abertura.",
            ));
        }

        let mut available_days = self
            .available_days
            .clone()
            .unwrap_or_else(|| DEFAULT_DAYS.to_vec());
        if available_days.iter().any(|d| !(0..=6).contains(d)) {
            return Err(ApiError::validation("Dia da semana inválido."));
        }
        available_days.sort_unstable();
        available_days.dedup();

        Ok(RoomForm {
            name: name.to_string(),
            capacity,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            min_time,
            max_time,
            available_days,
            resources: self
                .resources
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        })
    }
}

#[utoipa::path(
    post,
    path = "/admin/rooms",
    tag = "Rooms",
    request_body = RoomRequest,
    responses(
        (status = 201, description = "Created", body = Room),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<RoomRequest>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let form = payload.form()?;
    let unit = admin_scope(&state, &claims).target_unit(payload.unit.as_deref())?;
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let created = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let created: Room = diesel::insert_into(rooms::table)
                .values(&NewRoom {
                    name: form.name,
                    unit,
                    capacity: form.capacity,
                    description: form.description,
                    min_time: form.min_time,
                    max_time: form.max_time,
                    available_days: form.available_days,
                    resources: form.resources,
                })
                .returning(Room::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::CreateRoom, "rooms")
                    .record(created.id)
                    .new_data(&created)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(created)
        })
        .map_err(db_failure)?;

    info!(room_id = %created.id, unit = %created.unit, "Room created");
    Ok((StatusCode::CREATED, Json(created)))
}

fn lock_scoped_room(
    conn: &mut PgConnection,
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<Room, TxError> {
    rooms::table
        .find(id)
        .select(Room::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .filter(|r| admin_scope(state, claims).allows(&r.unit))
        .ok_or_else(|| TxError::Api(room_not_found()))
}

#[utoipa::path(
    put,
    path = "/admin/rooms/{id}",
    tag = "Rooms",
    params(("id" = Uuid, Path, description = "Room ID")),
    request_body = RoomRequest,
    responses(
        (status = 200, description = "Updated", body = Room),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoomRequest>,
) -> ApiResult<Json<Room>> {
    let form = payload.form()?;
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = conn
        .transaction::<_, TxError, _>(|conn| {
            let before = lock_scoped_room(conn, &state, &claims, id)?;

            let after: Room = diesel::update(rooms::table.find(id))
                .set((
                    rooms::name.eq(&form.name),
                    rooms::capacity.eq(form.capacity),
                    rooms::description.eq(&form.description),
                    rooms::min_time.eq(form.min_time),
                    rooms::max_time.eq(form.max_time),
                    rooms::available_days.eq(&form.available_days),
                    rooms::resources.eq(&form.resources),
                    rooms::is_active.eq(payload.is_active.unwrap_or(before.is_active)),
                    rooms::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(Room::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::UpdateRoom, "rooms")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(after)
        })
        .map_err(TxError::into_response)?;

    info!(room_id = %id, "Room updated");
    Ok(Json(updated))
}

/// Deletes a room; its bookings go with it.
#[utoipa::path(
    delete,
    path = "/admin/rooms/{id}",
    tag = "Rooms",
    params(("id" = Uuid, Path, description = "Room ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let before = lock_scoped_room(conn, &state, &claims, id)?;

        diesel::delete(rooms::table.find(id)).execute(conn)?;

        AuditService::record(
            conn,
            AuditEntry::new(admin_id, AuditAction::DeleteRoom, "rooms")
                .record(id)
                .old(&before)
                .ip(AuditService::ip_from_headers(&headers)),
        )?;
        Ok(())
    })
    .map_err(TxError::into_response)?;

    info!(room_id = %id, "Room deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/admin/rooms/{id}/toggle-availability",
    tag = "Rooms",
    params(("id" = Uuid, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Availability flipped", body = Room),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn toggle_room_availability(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Room>> {
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = conn
        .transaction::<_, TxError, _>(|conn| {
            let before = lock_scoped_room(conn, &state, &claims, id)?;

            let after: Room = diesel::update(rooms::table.find(id))
                .set((
                    rooms::is_available.eq(!before.is_available),
                    rooms::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(Room::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::ToggleRoomAvailability, "rooms")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(after)
        })
        .map_err(TxError::into_response)?;

    info!(room_id = %id, available = updated.is_available, "Room availability toggled");
    Ok(Json(updated))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminRoomBookingQuery {
    pub unit: Option<String>,
    #[param(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    pub room_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/admin/room-bookings",
    tag = "Rooms",
    params(AdminRoomBookingQuery),
    responses((status = 200, description = "Room bookings of the admin's scope", body = [RoomBookingView])),
    security(("bearer_auth" = []))
)]
pub async fn admin_list_room_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AdminRoomBookingQuery>,
) -> ApiResult<Json<Vec<RoomBookingView>>> {
    let mut q = room_bookings::table
        .inner_join(rooms::table)
        .inner_join(users::table)
        .select((RoomBooking::as_select(), rooms::name, users::full_name))
        .order((room_bookings::booking_date.desc(), room_bookings::start_time.asc()))
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(room_bookings::unit.eq(unit)),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }
    if let Some(date) = query.date {
        q = q.filter(room_bookings::booking_date.eq(date));
    }
    if let Some(room_id) = query.room_id {
        q = q.filter(room_bookings::room_id.eq(room_id));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let rows: Vec<(RoomBooking, String, String)> = q.load(&mut conn).map_err(db_failure)?;

    Ok(Json(
        rows.into_iter()
            .map(|(booking, room_name, teacher_name)| RoomBookingView {
                booking,
                room_name,
                teacher_name,
            })
            .collect(),
    ))
}

/// `old_data` of `DELETE_ROOM_BOOKING`, in the keys the audit viewer reads.
#[derive(Debug, Serialize)]
struct RoomBookingSnapshot {
    room_name: String,
    room_unit: String,
    user_name: String,
    booking_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    start_ts: NaiveDateTime,
    end_ts: NaiveDateTime,
    status: String,
}

impl RoomBookingSnapshot {
    fn of(booking: RoomBooking, room_name: String, user_name: String) -> Self {
        Self {
            room_name,
            room_unit: booking.unit,
            user_name,
            booking_date: booking.booking_date,
            start_time: booking.start_time,
            end_time: booking.end_time,
            start_ts: booking.booking_date.and_time(booking.start_time),
            end_ts: booking.booking_date.and_time(booking.end_time),
            status: booking.status,
        }
    }
}

#[utoipa::path(
    delete,
    path = "/admin/room-bookings/{id}",
    tag = "Rooms",
    params(("id" = Uuid, Path, description = "Room booking ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_delete_room_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = principal_id(&claims)?;
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let (booking, room_name, user_name): (RoomBooking, String, String) = room_bookings::table
            .inner_join(rooms::table)
            .inner_join(users::table)
            .filter(room_bookings::id.eq(id))
            .select((RoomBooking::as_select(), rooms::name, users::full_name))
            .first(conn)
            .optional()?
            .filter(|(b, _, _)| scope.allows(&b.unit))
            .ok_or_else(|| {
                ApiError::not_found("Reserva não encontrada.", "ROOM_BOOKING_NOT_FOUND")
            })?;

        diesel::delete(room_bookings::table.find(id)).execute(conn)?;

        AuditService::record(
            conn,
            AuditEntry::new(admin_id, AuditAction::DeleteRoomBooking, "room_bookings")
                .record(id)
                .old(&RoomBookingSnapshot::of(booking, room_name, user_name))
                .ip(AuditService::ip_from_headers(&headers)),
        )?;
        Ok(())
    })
    .map_err(TxError::into_response)?;

    info!(room_booking_id = %id, "Room booking deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::formatter::friendly_summary, models::AuditLog};

    fn request(json: serde_json::Value) -> RoomRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_room_form_defaults() {
        let form = request(serde_json::json!({"name": "  Auditório "})).form().unwrap();
        assert_eq!(form.name, "Auditório");
        assert_eq!(form.capacity, 40);
        assert_eq!(form.min_time, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(form.max_time, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(form.available_days, vec![1, 2, 3, 4, 5]);
        assert!(form.resources.is_empty());
    }

    #[test]
    fn test_room_form_rejects_inverted_hours() {
        let err = request(serde_json::json!({
            "name": "Sala 1",
            "min_time": "18:00",
            "max_time": "08:00"
        }))
        .form()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_room_form_rejects_bad_weekday() {
        let err = request(serde_json::json!({"name": "Sala 1", "available_days": [1, 7]}))
            .form()
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_room_form_sorts_days_and_drops_blank_resources() {
        let form = request(serde_json::json!({
            "name": "Sala 1",
            "available_days": [5, 1, 1, 3],
            "resources": ["Projetor", "  ", " Lousa "]
        }))
        .form()
        .unwrap();
        assert_eq!(form.available_days, vec![1, 3, 5]);
        assert_eq!(form.resources, vec!["Projetor", "Lousa"]);
    }

    #[test]
    fn test_group_by_unit() {
        let room = |unit: &str, name: &str| Room {
            id: Uuid::new_v4(),
            name: name.to_string(),
            unit: unit.to_string(),
            capacity: 40,
            description: None,
            min_time: default_min_time(),
            max_time: default_max_time(),
            available_days: DEFAULT_DAYS.to_vec(),
            resources: vec![],
            is_active: true,
            is_available: true,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        };
        let groups = group_by_unit(vec![
            room("Objetivo Guarujá", "Lab"),
            room("Objetivo Embaré", "Auditório"),
            room("Objetivo Guarujá", "Biblioteca"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].unit, "Objetivo Embaré");
        assert_eq!(groups[1].rooms.len(), 2);
    }

    #[test]
    fn test_deleted_room_booking_summary_shows_unit_and_period() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let booking = RoomBooking {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            unit: "Objetivo Embaré".to_string(),
            booking_date: date,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 40, 0).unwrap(),
            status: "confirmed".to_string(),
            is_recurring: false,
            recurring_id: None,
            created_at: Utc::now().naive_utc(),
        };
        let snapshot = RoomBookingSnapshot::of(booking, "Lab 1".to_string(), "Ana".to_string());

        let log = AuditLog {
            id: Uuid::new_v4(),
            admin_id: None,
            action_type: "DELETE_ROOM_BOOKING".to_string(),
            table_name: "room_bookings".to_string(),
            record_id: Some("abc".to_string()),
            old_data: serde_json::to_value(&snapshot).ok(),
            new_data: None,
            ip_address: None,
            created_at: Utc::now().naive_utc(),
        };
        let details = friendly_summary(&log).details;

        assert!(details.contains("\"Lab 1\" Objetivo Embaré."), "{details}");
        assert!(details.contains("Responsável pela reserva: Ana"));
        assert!(details.contains("(10/03/2026 08:00 - 09:40)"), "{details}");
    }
}
