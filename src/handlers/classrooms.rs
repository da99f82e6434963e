//! Classroom names offered as booking locations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiError, ApiResult, TxError},
    helpers::UnitFilter,
    models::{Classroom, NewClassroom},
    schema::classrooms,
    AppState,
};

use super::admin_scope;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClassroomQuery {
    pub unit: Option<String>,
}

#[utoipa::path(
    get,
    path = "/admin/classrooms",
    tag = "Classrooms",
    params(ClassroomQuery),
    responses((status = 200, description = "Active classrooms in display order", body = [Classroom])),
    security(("bearer_auth" = []))
)]
pub async fn list_classrooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ClassroomQuery>,
) -> ApiResult<Json<Vec<Classroom>>> {
    let mut q = classrooms::table
        .filter(classrooms::is_active.eq(true))
        .select(Classroom::as_select())
        .order((classrooms::unit.asc(), classrooms::position.asc()))
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(classrooms::unit.eq(unit)),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(q.load(&mut conn).map_err(db_failure)?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClassroomRequest {
    pub unit: Option<String>,
    #[schema(example = "2º Ano B")]
    pub name: String,
}

fn clean_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Informe o nome da turma."));
    }
    Ok(name.to_string())
}

#[utoipa::path(
    post,
    path = "/admin/classrooms",
    tag = "Classrooms",
    request_body = ClassroomRequest,
    responses(
        (status = 201, description = "Appended at the end of the list", body = Classroom),
        (status = 400, description = "Empty name", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ClassroomRequest>,
) -> ApiResult<(StatusCode, Json<Classroom>)> {
    let name = clean_name(&payload.name)?;
    let unit = admin_scope(&state, &claims).target_unit(payload.unit.as_deref())?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let created = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let last: Option<i32> = classrooms::table
                .filter(classrooms::unit.eq(&unit))
                .select(diesel::dsl::max(classrooms::position))
                .first(conn)?;

            diesel::insert_into(classrooms::table)
                .values(&NewClassroom {
                    name,
                    unit: unit.clone(),
                    position: last.unwrap_or(0) + 1,
                })
                .returning(Classroom::as_returning())
                .get_result(conn)
        })
        .map_err(db_failure)?;

    info!(classroom_id = %created.id, unit = %created.unit, "Classroom created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// The classroom if it exists and the admin may touch it.
fn find_scoped(conn: &mut PgConnection, state: &AppState, claims: &Claims, id: Uuid) -> ApiResult<Classroom> {
    classrooms::table
        .find(id)
        .select(Classroom::as_select())
        .first(conn)
        .optional()
        .map_err(db_failure)?
        .filter(|c| admin_scope(state, claims).allows(&c.unit))
        .ok_or_else(|| ApiError::not_found("Turma não encontrada.", "CLASSROOM_NOT_FOUND"))
}

#[utoipa::path(
    put,
    path = "/admin/classrooms/{id}",
    tag = "Classrooms",
    params(("id" = Uuid, Path, description = "Classroom ID")),
    request_body = ClassroomRequest,
    responses(
        (status = 200, description = "Renamed", body = Classroom),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn rename_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClassroomRequest>,
) -> ApiResult<Json<Classroom>> {
    let name = clean_name(&payload.name)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    find_scoped(&mut conn, &state, &claims, id)?;

    let updated = diesel::update(classrooms::table.find(id))
        .set(classrooms::name.eq(name))
        .returning(Classroom::as_returning())
        .get_result(&mut conn)
        .map_err(db_failure)?;

    Ok(Json(updated))
}

/// Soft delete: the row stays so past bookings keep their location text.
#[utoipa::path(
    delete,
    path = "/admin/classrooms/{id}",
    tag = "Classrooms",
    params(("id" = Uuid, Path, description = "Classroom ID")),
    responses(
        (status = 204, description = "Hidden from the list"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_classroom(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    find_scoped(&mut conn, &state, &claims, id)?;

    diesel::update(classrooms::table.find(id))
        .set(classrooms::is_active.eq(false))
        .execute(&mut conn)
        .map_err(db_failure)?;
    info!(classroom_id = %id, "Classroom deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    /// Classroom ids in the new display order.
    pub ids: Vec<Uuid>,
}

#[utoipa::path(
    put,
    path = "/admin/classrooms/reorder",
    tag = "Classrooms",
    request_body = ReorderRequest,
    responses(
        (status = 204, description = "Positions saved"),
        (status = 404, description = "An id is unknown or outside the admin's unit", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reorder_classrooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ReorderRequest>,
) -> ApiResult<StatusCode> {
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let units: Vec<(Uuid, String)> = classrooms::table
            .filter(classrooms::id.eq_any(&payload.ids))
            .select((classrooms::id, classrooms::unit))
            .for_update()
            .load(conn)?;

        if units.len() != payload.ids.len() || units.iter().any(|(_, u)| !scope.allows(u)) {
            return Err(
                ApiError::not_found("Turma não encontrada.", "CLASSROOM_NOT_FOUND").into(),
            );
        }

        for (index, id) in payload.ids.iter().enumerate() {
            diesel::update(classrooms::table.find(id))
                .set(classrooms::position.eq(index as i32 + 1))
                .execute(conn)?;
        }
        Ok(())
    })
    .map_err(TxError::into_response)?;

    info!(count = payload.ids.len(), "Classrooms reordered");
    Ok(StatusCode::NO_CONTENT)
}
