//! Equipment bookings: teacher confirmation, history and admin management.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiError, ApiResult, TxError},
    events::{outbox::OutboxService, AggregateType, BookingNotice, EventType},
    helpers::{principal_id, UnitFilter},
    middleware::RequestId,
    models::{
        Booking, Equipment, NewBooking, NewRecurringBooking, RecurringBooking, UnitSettings,
    },
    pagination::{PageRequest, PaginationMeta},
    scheduling::{
        availability::{compute_availability, load_reserved_slots},
        recurrence::{
            dates_until_month_end, insert_occurrences, is_future_occurrence, month_start,
            RecurrenceLine, TermStamp,
        },
        rules::{
            check_equipment_booking, status, BookingDraft, EffectiveStatus, Occurrence, Period,
            RecurrenceFilter, StatusFilter,
        },
        time::deserialize_opt_time,
    },
    schema::{bookings, equipment, recurring_bookings, users},
    telemetry::{record_booking_conflict, record_booking_created, BookingKind},
    term::{
        generate_display_id, generate_verification_token, unit_legal_name, TermDocument,
        TermEquipment, TermKind,
    },
    AppState,
};

use super::{admin_scope, like_pattern, load_teacher};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BookingLine {
    pub equipment_id: Uuid,
    #[schema(example = 2, minimum = 1)]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    #[schema(example = "Objetivo Embaré")]
    pub unit: String,
    #[schema(example = "Sala 12")]
    pub local: String,
    /// Required unless `is_recurring`.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub is_recurring: bool,
    /// 0 = Sunday; required when `is_recurring`.
    #[serde(default)]
    pub day_of_week: Option<i16>,
    #[serde(default, deserialize_with = "deserialize_opt_time")]
    #[schema(value_type = Option<String>, example = "07:30")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_opt_time")]
    #[schema(value_type = Option<String>, example = "09:10")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub equipments: Vec<BookingLine>,
    pub observations: Option<String>,
    #[serde(default)]
    pub term_accepted: bool,
}

/// A booking as its owner sees it.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeacherBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub equipment_name: String,
    pub equipment_brand: Option<String>,
    pub equipment_model: Option<String>,
    /// Encoded in the term's QR code.
    pub verification_token: String,
    pub effective_status: EffectiveStatus,
}

impl TeacherBooking {
    fn new(booking: Booking, item: &Equipment, now: NaiveDateTime) -> Self {
        Self {
            effective_status: EffectiveStatus::of(
                &booking.status,
                booking.booking_date,
                booking.end_time,
                now,
            ),
            verification_token: booking.verification_token.clone(),
            equipment_name: item.name.clone(),
            equipment_brand: item.brand.clone(),
            equipment_model: item.model.clone(),
            booking,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingConfirmation {
    pub bookings: Vec<TeacherBooking>,
    pub recurring_id: Option<Uuid>,
    pub term_document: TermDocument,
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub term_hash: String,
    #[schema(example = "482913")]
    pub display_id: String,
    /// Token of the first row; every row carries its own.
    pub verification_token: Option<String>,
    /// Weekly occurrences left out because the slot was already taken.
    pub rows_skipped: usize,
}

/// Sums repeated items so each equipment is checked once.
fn merge_lines(lines: &[BookingLine]) -> ApiResult<Vec<(Uuid, i32)>> {
    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|(id, _)| *id == line.equipment_id) {
            Some((_, qty)) => {
                *qty = qty.checked_add(line.quantity).ok_or_else(|| {
                    ApiError::bad_request(
                        "Quantidade solicitada inválida.",
                        "QUANTITY_TOO_LARGE",
                    )
                })?;
            }
            None => merged.push((line.equipment_id, line.quantity)),
        }
    }
    Ok(merged)
}

/// "Projetor (2), Notebook (1)"
fn describe_items(items: &[TermEquipment]) -> String {
    items
        .iter()
        .map(|i| format!("{} ({})", i.name, i.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

fn unavailable(name: &str, available: i32) -> TxError {
    record_booking_conflict(BookingKind::Equipment);
    ApiError::conflict(
        format!("Quantidade indisponível para {name}. Disponível: {available}."),
        "EQUIPMENT_UNAVAILABLE",
    )
    .into()
}

/// Confirms an equipment booking and signs its term.
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "Bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking confirmed", body = BookingConfirmation),
        (status = 400, description = "Rule violation", body = ApiError),
        (status = 409, description = "Not enough units available", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
    headers: HeaderMap,
    Json(payload): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<BookingConfirmation>)> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;
    let settings = UnitSettings::load(&mut conn, &payload.unit).map_err(db_failure)?;

    let now = state.clock.now();
    let today = now.date();
    let quantities: Vec<i32> = payload.equipments.iter().map(|l| l.quantity).collect();

    let window = check_equipment_booking(
        &BookingDraft {
            unit: &payload.unit,
            totvs_number: &teacher.totvs_number,
            local: Some(&payload.local),
            date: payload.date,
            day_of_week: payload.day_of_week,
            start: payload.start_time,
            end: payload.end_time,
            is_recurring: payload.is_recurring,
            term_accepted: payload.term_accepted,
        },
        &teacher,
        &settings,
        &quantities,
        now,
    )?;

    let lines = merge_lines(&payload.equipments)?;
    let local = payload.local.trim().to_string();
    let observations = payload
        .observations
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let confirmation = conn
        .transaction::<_, TxError, _>(|conn| {
            let ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
            let items: Vec<Equipment> = equipment::table
                .filter(equipment::unit.eq(&payload.unit))
                .filter(equipment::id.eq_any(&ids))
                .select(Equipment::as_select())
                .for_update()
                .load(conn)?;

            if items.len() != ids.len() {
                return Err(ApiError::validation("Equipamento não encontrado nesta unidade.").into());
            }
            let by_id: HashMap<Uuid, &Equipment> = items.iter().map(|e| (e.id, e)).collect();

            let term_items: Vec<TermEquipment> = lines
                .iter()
                .filter_map(|(id, qty)| {
                    by_id.get(id).map(|e| TermEquipment {
                        id: e.id,
                        name: e.name.clone(),
                        brand: e.brand.clone(),
                        model: e.model.clone(),
                        quantity: *qty,
                    })
                })
                .collect();

            let (date, day_of_week) = match window.occurrence {
                Occurrence::Once(d) => (Some(d), None),
                Occurrence::Weekly(d) => (None, Some(d)),
            };

            let display_id = generate_display_id();
            let document = TermDocument {
                kind: TermKind::Equipment,
                user_name: teacher.full_name.clone(),
                user_totvs: teacher.totvs_number.clone(),
                unit: payload.unit.clone(),
                unit_legal_name: unit_legal_name(&payload.unit).map(str::to_string),
                local: local.clone(),
                date,
                is_recurring: payload.is_recurring,
                day_of_week,
                start_time: window.start,
                end_time: window.end,
                equipments: term_items.clone(),
                timestamp: Utc::now(),
                user_agent: user_agent.clone(),
                display_id: display_id.clone(),
            };
            let term_hash = document.fingerprint();
            let term_json = serde_json::to_value(&document)
                .map_err(|_| ApiError::internal("Failed to build term", "TERM_ERROR"))?;

            let (inserted, recurring_id, rows_skipped): (Vec<Booking>, Option<Uuid>, usize) =
                match window.occurrence {
                    Occurrence::Once(date) => {
                        let reserved = load_reserved_slots(conn, &payload.unit, date)?;
                        let free = compute_availability(&items, &reserved, window.start, window.end);
                        for (id, qty) in &lines {
                            let available = free
                                .iter()
                                .find(|a| a.id == *id)
                                .map(|a| (a.name.as_str(), a.available_quantity));
                            if let Some((name, available)) = available {
                                if available < *qty {
                                    return Err(unavailable(name, available));
                                }
                            }
                        }

                        let rows: Vec<NewBooking> = lines
                            .iter()
                            .map(|(id, qty)| NewBooking {
                                user_id: teacher.id,
                                unit: payload.unit.clone(),
                                local: local.clone(),
                                booking_date: date,
                                start_time: window.start,
                                end_time: window.end,
                                equipment_id: *id,
                                quantity: *qty,
                                observations: observations.clone(),
                                status: status::ACTIVE.to_string(),
                                term_signed: true,
                                term_document: Some(term_json.clone()),
                                term_hash: Some(term_hash.clone()),
                                display_id: Some(display_id.clone()),
                                verification_token: generate_verification_token(),
                                is_recurring: false,
                                recurring_id: None,
                            })
                            .collect();

                        let inserted = diesel::insert_into(bookings::table)
                            .values(&rows)
                            .returning(Booking::as_returning())
                            .get_results(conn)?;
                        (inserted, None, 0)
                    }
                    Occurrence::Weekly(dow) => {
                        let recurrence_lines: Vec<RecurrenceLine> = term_items
                            .iter()
                            .map(|i| RecurrenceLine {
                                id: i.id,
                                name: i.name.clone(),
                                quantity: i.quantity,
                            })
                            .collect();

                        let rec: RecurringBooking = diesel::insert_into(recurring_bookings::table)
                            .values(&NewRecurringBooking {
                                user_id: teacher.id,
                                unit: payload.unit.clone(),
                                local: local.clone(),
                                room_id: None,
                                day_of_week: dow,
                                start_time: window.start,
                                end_time: window.end,
                                equipments: serde_json::to_value(&recurrence_lines)
                                    .unwrap_or_default(),
                                last_generated_month: month_start(today),
                            })
                            .returning(RecurringBooking::as_returning())
                            .get_result(conn)?;

                        let mut dates = dates_until_month_end(today, dow);
                        dates.retain(|d| is_future_occurrence(*d, window.start, now));

                        let stamp = TermStamp {
                            term_document: Some(term_json.clone()),
                            term_hash: Some(term_hash.clone()),
                            display_id: Some(display_id.clone()),
                        };
                        let report = insert_occurrences(conn, &rec, &dates, &stamp)?;

                        if !dates.is_empty() && report.rows_created == 0 {
                            record_booking_conflict(BookingKind::Recurring);
                            return Err(ApiError::conflict(
                                "Os equipamentos já estão reservados neste horário em todas as datas deste mês.",
                                "EQUIPMENT_UNAVAILABLE",
                            )
                            .into());
                        }

                        if let Some(obs) = &observations {
                            diesel::update(
                                bookings::table.filter(bookings::recurring_id.eq(rec.id)),
                            )
                            .set(bookings::observations.eq(obs))
                            .execute(conn)?;
                        }

                        let inserted = bookings::table
                            .filter(bookings::recurring_id.eq(rec.id))
                            .order((bookings::booking_date.asc(), bookings::created_at.asc()))
                            .select(Booking::as_select())
                            .load(conn)?;
                        (inserted, Some(rec.id), report.rows_skipped)
                    }
                };

            let first_date = inserted.first().map(|b| b.booking_date).or(date).unwrap_or(today);
            let notice = BookingNotice {
                teacher_name: teacher.full_name.clone(),
                unit: payload.unit.clone(),
                local: local.clone(),
                what: describe_items(&term_items),
                date: first_date,
                start_time: window.start,
                end_time: window.end,
                observations: observations.clone(),
                recurring: payload.is_recurring,
            };
            let (aggregate, aggregate_id) = match (recurring_id, inserted.first()) {
                (Some(id), _) => (AggregateType::Recurring, id),
                (None, Some(b)) => (AggregateType::Booking, b.id),
                (None, None) => (AggregateType::Booking, Uuid::nil()),
            };
            OutboxService::emit(
                conn,
                EventType::BookingCreated,
                aggregate,
                aggregate_id,
                serde_json::to_value(&notice).unwrap_or_default(),
                Some(teacher.id),
                Some(payload.unit.clone()),
                Some(request_id.to_string()),
            )?;

            let verification_token = inserted.first().map(|b| b.verification_token.clone());
            let rows = inserted
                .into_iter()
                .filter_map(|b| {
                    let item = by_id.get(&b.equipment_id).copied()?;
                    Some(TeacherBooking::new(b, item, now))
                })
                .collect();

            Ok(BookingConfirmation {
                bookings: rows,
                recurring_id,
                term_document: document,
                term_hash,
                display_id,
                verification_token,
                rows_skipped,
            })
        })
        .map_err(TxError::into_response)?;

    let kind = if payload.is_recurring {
        BookingKind::Recurring
    } else {
        BookingKind::Equipment
    };
    record_booking_created(kind, confirmation.bookings.len());
    info!(
        user_id = %teacher.id,
        unit = %payload.unit,
        rows = confirmation.bookings.len(),
        display_id = %confirmation.display_id,
        recurring = payload.is_recurring,
        "Equipment booking confirmed"
    );

    Ok((StatusCode::CREATED, Json(confirmation)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MyBookingsQuery {
    pub status: Option<StatusFilter>,
}

#[utoipa::path(
    get,
    path = "/bookings/mine",
    tag = "Bookings",
    params(MyBookingsQuery),
    responses((status = 200, description = "The teacher's bookings", body = [TeacherBooking])),
    security(("bearer_auth" = []))
)]
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MyBookingsQuery>,
) -> ApiResult<Json<Vec<TeacherBooking>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;

    let rows: Vec<(Booking, Equipment)> = bookings::table
        .inner_join(equipment::table)
        .filter(bookings::user_id.eq(teacher.id))
        .filter(bookings::status.ne(status::CANCELLED_BY_USER))
        .order((bookings::booking_date.desc(), bookings::start_time.desc()))
        .select((Booking::as_select(), Equipment::as_select()))
        .load(&mut conn)
        .map_err(db_failure)?;

    let now = state.clock.now();
    let filter = query.status.unwrap_or_default();
    let data = rows
        .into_iter()
        .map(|(b, e)| TeacherBooking::new(b, &e, now))
        .filter(|b| filter.matches(b.effective_status))
        .collect();

    Ok(Json(data))
}

/// The owner withdraws a booking; it disappears from their list.
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    tag = "Bookings",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let booking: Booking = bookings::table
            .find(id)
            .filter(bookings::user_id.eq(user_id))
            .select(Booking::as_select())
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Agendamento não encontrado.", "BOOKING_NOT_FOUND"))?;

        if booking.status == status::CANCELLED_BY_USER {
            return Ok(());
        }

        diesel::update(bookings::table.find(id))
            .set(bookings::status.eq(status::CANCELLED_BY_USER))
            .execute(conn)?;

        OutboxService::emit(
            conn,
            EventType::BookingCancelled,
            AggregateType::Booking,
            id,
            serde_json::json!({"by": "teacher", "previous_status": booking.status}),
            Some(user_id),
            Some(booking.unit.clone()),
            Some(request_id.to_string()),
        )?;
        Ok(())
    })
    .map_err(TxError::into_response)?;

    info!(booking_id = %id, user_id = %user_id, "Booking cancelled by teacher");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminBookingQuery {
    /// Head office only.
    pub unit: Option<String>,
    #[param(value_type = Option<String>, example = "2026-03-01")]
    pub start_date: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "2026-03-31")]
    pub end_date: Option<NaiveDate>,
    #[param(value_type = Option<String>)]
    pub recurring: Option<RecurrenceFilter>,
    #[param(value_type = Option<String>)]
    pub period: Option<Period>,
    #[param(value_type = Option<String>)]
    pub status: Option<StatusFilter>,
    /// Equipment name, teacher name or local.
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
    crate::pagination::DEFAULT_PER_PAGE
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub equipment_name: String,
    pub equipment_brand: Option<String>,
    pub equipment_model: Option<String>,
    pub teacher_name: String,
    pub teacher_totvs: String,
    pub effective_status: EffectiveStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminBookingListResponse {
    pub data: Vec<AdminBooking>,
    pub pagination: PaginationMeta,
}

type BookingJoin =
    diesel::dsl::InnerJoin<diesel::dsl::InnerJoin<bookings::table, equipment::table>, users::table>;
type BoxedBookingQuery = diesel::dsl::IntoBoxed<'static, BookingJoin, Pg>;

/// Every admin filter applied to the bookings/equipment/users join.
fn filtered_bookings(
    query: &AdminBookingQuery,
    unit: Option<String>,
    now: NaiveDateTime,
) -> BoxedBookingQuery {
    let mut q = bookings::table
        .inner_join(equipment::table)
        .inner_join(users::table)
        .into_boxed();

    if let Some(unit) = unit {
        q = q.filter(bookings::unit.eq(unit));
    }
    if let Some(from) = query.start_date {
        q = q.filter(bookings::booking_date.ge(from));
    }
    if let Some(to) = query.end_date {
        q = q.filter(bookings::booking_date.le(to));
    }
    match query.recurring {
        Some(RecurrenceFilter::Recurring) => q = q.filter(bookings::is_recurring.eq(true)),
        Some(RecurrenceFilter::Normal) => q = q.filter(bookings::is_recurring.eq(false)),
        None => {}
    }
    if let Some(period) = query.period {
        let (from, to) = period.bounds();
        q = q.filter(bookings::start_time.between(from, to));
    }

    let today = now.date();
    let clock = now.time();
    match query.status.unwrap_or_default() {
        StatusFilter::All => {}
        StatusFilter::Active => {
            q = q.filter(bookings::status.eq(status::ACTIVE)).filter(
                bookings::booking_date.gt(today).or(bookings::booking_date
                    .eq(today)
                    .and(bookings::end_time.ge(clock))),
            )
        }
        StatusFilter::Closed => {
            q = q.filter(
                bookings::status.eq(status::CLOSED).or(bookings::status
                    .eq(status::ACTIVE)
                    .and(bookings::booking_date.lt(today).or(bookings::booking_date
                        .eq(today)
                        .and(bookings::end_time.lt(clock))))),
            )
        }
        StatusFilter::Cancelled => {
            q = q.filter(
                bookings::status.eq_any(vec![status::CANCELLED, status::CANCELLED_BY_USER]),
            )
        }
    }

    if let Some(pattern) = like_pattern(query.search.as_deref()) {
        q = q.filter(
            equipment::name
                .ilike(pattern.clone())
                .or(users::full_name.ilike(pattern.clone()))
                .or(bookings::local.ilike(pattern)),
        );
    }

    q
}

#[utoipa::path(
    get,
    path = "/admin/bookings",
    tag = "Bookings",
    params(AdminBookingQuery),
    responses((status = 200, description = "Bookings of the admin's scope", body = AdminBookingListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_admin_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AdminBookingQuery>,
) -> ApiResult<Json<AdminBookingListResponse>> {
    let page = PageRequest::new(query.page, query.per_page);

    let unit = match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => None,
        UnitFilter::Only(u) => Some(u),
        UnitFilter::Deny => {
            return Ok(Json(AdminBookingListResponse {
                data: Vec::new(),
                pagination: page.meta(0),
            }))
        }
    };

    let now = state.clock.now();
    let mut conn = get_db_conn(&state.db_pool)?;

    let total_count: i64 = filtered_bookings(&query, unit.clone(), now)
        .count()
        .get_result(&mut conn)
        .map_err(db_failure)?;

    let (limit, offset) = page.limit_offset();
    let rows: Vec<(Booking, Equipment, String, String)> = filtered_bookings(&query, unit, now)
        .order((bookings::booking_date.desc(), bookings::start_time.desc()))
        .limit(limit)
        .offset(offset)
        .select((
            Booking::as_select(),
            Equipment::as_select(),
            users::full_name,
            users::totvs_number,
        ))
        .load(&mut conn)
        .map_err(db_failure)?;

    let data = rows
        .into_iter()
        .map(|(booking, item, teacher_name, teacher_totvs)| AdminBooking {
            effective_status: EffectiveStatus::of(
                &booking.status,
                booking.booking_date,
                booking.end_time,
                now,
            ),
            equipment_name: item.name,
            equipment_brand: item.brand,
            equipment_model: item.model,
            teacher_name,
            teacher_totvs,
            booking,
        })
        .collect();

    Ok(Json(AdminBookingListResponse {
        data,
        pagination: page.meta(total_count),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteBookingsRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteBookingsResponse {
    pub cancelled: usize,
}

/// What the audit trail keeps of each cancelled booking.
#[derive(Debug, Serialize)]
struct BookingSnapshot {
    id: Uuid,
    equipment_name: String,
    equipment_brand: Option<String>,
    equipment_model: Option<String>,
    user_full_name: String,
    booking_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    local: String,
    quantity: i32,
    unit: String,
    created_at: NaiveDateTime,
}

/// Admin cancellation. Rows are kept with status `cancelled`.
#[utoipa::path(
    post,
    path = "/admin/bookings/delete",
    tag = "Bookings",
    request_body = DeleteBookingsRequest,
    responses(
        (status = 200, description = "Bookings cancelled", body = DeleteBookingsResponse),
        (status = 400, description = "No ids given", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
    headers: HeaderMap,
    Json(payload): Json<DeleteBookingsRequest>,
) -> ApiResult<Json<DeleteBookingsResponse>> {
    if payload.ids.is_empty() {
        return Err(ApiError::validation("Selecione pelo menos um agendamento."));
    }

    let admin_id = principal_id(&claims)?;
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    let cancelled = conn
        .transaction::<_, TxError, _>(|conn| {
            let rows: Vec<(Booking, Equipment, String)> = bookings::table
                .inner_join(equipment::table)
                .inner_join(users::table)
                .filter(bookings::id.eq_any(&payload.ids))
                .select((Booking::as_select(), Equipment::as_select(), users::full_name))
                .for_update()
                .load(conn)?;

            let visible: Vec<(Booking, Equipment, String)> = rows
                .into_iter()
                .filter(|(b, _, _)| scope.allows(&b.unit))
                .collect();
            if visible.is_empty() {
                return Err(
                    ApiError::not_found("Agendamento não encontrado.", "BOOKING_NOT_FOUND").into(),
                );
            }

            let ids: Vec<Uuid> = visible.iter().map(|(b, _, _)| b.id).collect();
            diesel::update(bookings::table.filter(bookings::id.eq_any(&ids)))
                .set(bookings::status.eq(status::CANCELLED))
                .execute(conn)?;

            let snapshots: Vec<BookingSnapshot> = visible
                .iter()
                .map(|(b, e, teacher)| BookingSnapshot {
                    id: b.id,
                    equipment_name: e.name.clone(),
                    equipment_brand: e.brand.clone(),
                    equipment_model: e.model.clone(),
                    user_full_name: teacher.clone(),
                    booking_date: b.booking_date,
                    start_time: b.start_time,
                    end_time: b.end_time,
                    local: b.local.clone(),
                    quantity: b.quantity,
                    unit: b.unit.clone(),
                    created_at: b.created_at,
                })
                .collect();

            let record = if ids.len() == 1 {
                ids[0].to_string()
            } else {
                format!("{} agendamentos", ids.len())
            };
            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::DeleteBookings, "bookings")
                    .record(record)
                    .old(&snapshots)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;

            for (b, _, _) in &visible {
                OutboxService::emit(
                    conn,
                    EventType::BookingCancelled,
                    AggregateType::Booking,
                    b.id,
                    serde_json::json!({"by": "admin", "previous_status": b.status}),
                    Some(admin_id),
                    Some(b.unit.clone()),
                    Some(request_id.to_string()),
                )?;
            }

            Ok(ids.len())
        })
        .map_err(TxError::into_response)?;

    if cancelled < payload.ids.len() {
        warn!(
            requested = payload.ids.len(),
            cancelled, "Some bookings were outside the admin's scope"
        );
    }
    info!(admin_id = %admin_id, cancelled, "Bookings cancelled by admin");

    Ok(Json(DeleteBookingsResponse { cancelled }))
}

/// Marks a booking as finished (equipment returned).
#[utoipa::path(
    post,
    path = "/admin/bookings/{id}/close",
    tag = "Bookings",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Closed", body = Booking),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Booking is cancelled", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn close_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    let closed = conn
        .transaction::<_, TxError, _>(|conn| {
            let booking: Booking = bookings::table
                .find(id)
                .select(Booking::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .filter(|b| scope.allows(&b.unit))
                .ok_or_else(|| {
                    ApiError::not_found("Agendamento não encontrado.", "BOOKING_NOT_FOUND")
                })?;

            if booking.status != status::ACTIVE && booking.status != status::CLOSED {
                return Err(ApiError::conflict(
                    "Agendamentos cancelados não podem ser encerrados.",
                    "BOOKING_CANCELLED",
                )
                .into());
            }

            Ok(diesel::update(bookings::table.find(id))
                .set(bookings::status.eq(status::CLOSED))
                .returning(Booking::as_returning())
                .get_result(conn)?)
        })
        .map_err(TxError::into_response)?;

    info!(booking_id = %id, "Booking closed");
    Ok(Json(closed))
}
