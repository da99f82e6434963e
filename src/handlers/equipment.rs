//! Equipment inventory and availability.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, map_db_error, ApiError, ApiResult, TxError},
    helpers::UnitFilter,
    models::{Equipment, NewEquipment},
    scheduling::{
        availability::{compute_availability, load_reserved_slots, EquipmentAvailability},
        time::deserialize_time,
    },
    schema::{bookings, equipment},
    AppState,
};

use super::{admin_scope, like_pattern, load_teacher};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    #[param(example = "Objetivo Embaré")]
    pub unit: String,
    #[param(value_type = String, example = "2026-03-10")]
    pub date: NaiveDate,
    #[param(value_type = String, example = "07:30")]
    #[serde(deserialize_with = "deserialize_time")]
    pub start_time: NaiveTime,
    #[param(value_type = String, example = "09:10")]
    #[serde(deserialize_with = "deserialize_time")]
    pub end_time: NaiveTime,
}

/// Free quantity of every item of a unit for a date and time window.
#[utoipa::path(
    get,
    path = "/equipment/availability",
    tag = "Equipment",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Availability per item", body = [EquipmentAvailability]),
        (status = 400, description = "Invalid window", body = ApiError),
        (status = 403, description = "Teacher not linked to the unit", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn availability(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<Vec<EquipmentAvailability>>> {
    if query.end_time <= query.start_time {
        return Err(ApiError::bad_request(
            "A hora de término deve ser posterior à hora de início.",
            "INVALID_TIME_RANGE",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let teacher = load_teacher(&mut conn, &claims)?;
    if !teacher.belongs_to_unit(&query.unit) {
        return Err(ApiError::forbidden(
            "Você não está vinculado a esta unidade.",
            "UNIT_NOT_LINKED",
        ));
    }

    let items: Vec<Equipment> = equipment::table
        .filter(equipment::unit.eq(&query.unit))
        .order(equipment::name.asc())
        .select(Equipment::as_select())
        .load(&mut conn)
        .map_err(db_failure)?;

    let reserved = load_reserved_slots(&mut conn, &query.unit, query.date).map_err(db_failure)?;

    Ok(Json(compute_availability(
        &items,
        &reserved,
        query.start_time,
        query.end_time,
    )))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EquipmentListQuery {
    /// Head office only; other admins always see their own unit.
    pub unit: Option<String>,
    /// Matches name, brand or model.
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/equipment",
    tag = "Equipment",
    params(EquipmentListQuery),
    responses((status = 200, description = "Inventory", body = [Equipment])),
    security(("bearer_auth" = []))
)]
pub async fn list_equipment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<EquipmentListQuery>,
) -> ApiResult<Json<Vec<Equipment>>> {
    let mut q = equipment::table
        .select(Equipment::as_select())
        .order((equipment::name.asc(), equipment::unit.asc()))
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(equipment::unit.eq(unit)),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }

    if let Some(pattern) = like_pattern(query.search.as_deref()) {
        q = q.filter(
            equipment::name
                .ilike(pattern.clone())
                .or(equipment::brand.ilike(pattern.clone()))
                .or(equipment::model.ilike(pattern)),
        );
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let items = q.load(&mut conn).map_err(db_failure)?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EquipmentRequest {
    /// Ignored for unit admins.
    pub unit: Option<String>,
    #[schema(example = "Projetor")]
    pub name: String,
    #[schema(example = "Epson")]
    pub brand: Option<String>,
    #[schema(example = "PowerLite X49")]
    pub model: Option<String>,
    #[schema(example = 4, minimum = 0)]
    pub total_quantity: i32,
}

impl EquipmentRequest {
    fn check(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("Informe o nome do equipamento."));
        }
        if self.total_quantity < 0 {
            return Err(ApiError::validation("A quantidade não pode ser negativa."));
        }
        Ok(())
    }
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[utoipa::path(
    post,
    path = "/admin/equipment",
    tag = "Equipment",
    request_body = EquipmentRequest,
    responses(
        (status = 201, description = "Created", body = Equipment),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_equipment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<EquipmentRequest>,
) -> ApiResult<(StatusCode, Json<Equipment>)> {
    payload.check()?;
    let unit = admin_scope(&state, &claims).target_unit(payload.unit.as_deref())?;
    let admin_id = crate::helpers::principal_id(&claims)?;

    let row = NewEquipment {
        unit,
        name: payload.name.trim().to_string(),
        brand: optional_text(&payload.brand),
        model: optional_text(&payload.model),
        total_quantity: payload.total_quantity,
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let created = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let created: Equipment = diesel::insert_into(equipment::table)
                .values(&row)
                .returning(Equipment::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::CreateEquipment, "equipment")
                    .record(created.id)
                    .new_data(&created)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(created)
        })
        .map_err(db_failure)?;

    info!(equipment_id = %created.id, unit = %created.unit, "Equipment created");
    Ok((StatusCode::CREATED, Json(created)))
}

fn load_scoped(
    conn: &mut PgConnection,
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<Equipment, TxError> {
    let item: Equipment = equipment::table
        .find(id)
        .select(Equipment::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Equipamento não encontrado.", "EQUIPMENT_NOT_FOUND"))?;

    if !admin_scope(state, claims).allows(&item.unit) {
        return Err(ApiError::not_found("Equipamento não encontrado.", "EQUIPMENT_NOT_FOUND").into());
    }
    Ok(item)
}

#[utoipa::path(
    put,
    path = "/admin/equipment/{id}",
    tag = "Equipment",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    request_body = EquipmentRequest,
    responses(
        (status = 200, description = "Updated", body = Equipment),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_equipment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<EquipmentRequest>,
) -> ApiResult<Json<Equipment>> {
    payload.check()?;
    let admin_id = crate::helpers::principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let updated = conn
        .transaction::<_, TxError, _>(|conn| {
            let before = load_scoped(conn, &state, &claims, id)?;

            let after: Equipment = diesel::update(equipment::table.find(id))
                .set((
                    equipment::name.eq(payload.name.trim()),
                    equipment::brand.eq(optional_text(&payload.brand)),
                    equipment::model.eq(optional_text(&payload.model)),
                    equipment::total_quantity.eq(payload.total_quantity),
                    equipment::updated_at.eq(Utc::now().naive_utc()),
                ))
                .returning(Equipment::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::UpdateEquipment, "equipment")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;
            Ok(after)
        })
        .map_err(TxError::into_response)?;

    info!(equipment_id = %id, "Equipment updated");
    Ok(Json(updated))
}

const EQUIPMENT_IN_USE: &str = "Não é possível excluir este equipamento pois existem agendamentos vinculados a ele. Recomenda-se apenas zerar a quantidade se o item não estiver mais disponível.";

#[utoipa::path(
    delete,
    path = "/admin/equipment/{id}",
    tag = "Equipment",
    params(("id" = Uuid, Path, description = "Equipment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Equipment has bookings", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_equipment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = crate::helpers::principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let before = load_scoped(conn, &state, &claims, id)?;

        let referenced: bool = diesel::select(diesel::dsl::exists(
            bookings::table.filter(bookings::equipment_id.eq(id)),
        ))
        .get_result(conn)?;
        if referenced {
            return Err(ApiError::conflict(EQUIPMENT_IN_USE, "EQUIPMENT_IN_USE").into());
        }

        diesel::delete(equipment::table.find(id))
            .execute(conn)
            .map_err(|e| TxError::Api(map_db_error(e, EQUIPMENT_IN_USE, EQUIPMENT_IN_USE)))?;

        AuditService::record(
            conn,
            AuditEntry::new(admin_id, AuditAction::DeleteEquipment, "equipment")
                .record(id)
                .old(&before)
                .ip(AuditService::ip_from_headers(&headers)),
        )?;
        Ok(())
    })
    .map_err(TxError::into_response)?;

    info!(equipment_id = %id, "Equipment deleted");
    Ok(StatusCode::NO_CONTENT)
}
