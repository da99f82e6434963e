//! Equipment loans handed out at the front desk.
//!
//! A loan takes units out of the inventory: `equipment.total_quantity` is
//! decremented while the loan is active and restored on return or delete.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{NaiveDateTime, Timelike};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEntry, AuditService},
    auth::jwt::Claims,
    error::{db_failure, get_db_conn, ApiError, ApiResult, TxError},
    events::{outbox::OutboxService, AggregateType, EventType, LoanPayload},
    helpers::{principal_id, UnitFilter},
    middleware::RequestId,
    models::{Equipment, EquipmentLoan, NewEquipmentLoan},
    scheduling::{
        rules::status,
        time::{deserialize_local_datetime, LocalClock},
    },
    schema::{equipment, equipment_loans},
    AppState,
};

use super::admin_scope;

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatusFilter {
    Active,
    Returned,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub unit: Option<String>,
    #[param(value_type = Option<String>)]
    pub status: Option<LoanStatusFilter>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: EquipmentLoan,
    pub equipment_name: String,
    /// `start_at` in the school's local time.
    pub start_at_local: NaiveDateTime,
    pub end_at_local: NaiveDateTime,
}

impl LoanView {
    fn new(loan: EquipmentLoan, equipment_name: String, clock: &LocalClock) -> Self {
        Self {
            start_at_local: clock.naive_utc_to_local(loan.start_at),
            end_at_local: clock.naive_utc_to_local(loan.end_at),
            loan,
            equipment_name,
        }
    }
}

#[utoipa::path(
    get,
    path = "/admin/loans",
    tag = "Loans",
    params(LoanQuery),
    responses((status = 200, description = "Loans, newest first", body = [LoanView])),
    security(("bearer_auth" = []))
)]
pub async fn list_loans(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<LoanQuery>,
) -> ApiResult<Json<Vec<LoanView>>> {
    let mut q = equipment_loans::table
        .inner_join(equipment::table)
        .select((EquipmentLoan::as_select(), equipment::name))
        .order(equipment_loans::created_at.desc())
        .into_boxed();

    match admin_scope(&state, &claims).unit_filter(query.unit.as_deref()) {
        UnitFilter::Any => {}
        UnitFilter::Only(unit) => q = q.filter(equipment_loans::unit.eq(unit)),
        UnitFilter::Deny => return Ok(Json(Vec::new())),
    }
    match query.status {
        Some(LoanStatusFilter::Active) => {
            q = q.filter(equipment_loans::status.eq(status::LOAN_ACTIVE))
        }
        Some(LoanStatusFilter::Returned) => {
            q = q.filter(equipment_loans::status.eq(status::LOAN_RETURNED))
        }
        None => {}
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let rows: Vec<(EquipmentLoan, String)> = q.load(&mut conn).map_err(db_failure)?;

    Ok(Json(
        rows.into_iter()
            .map(|(loan, name)| LoanView::new(loan, name, &state.clock))
            .collect(),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoanRequest {
    pub equipment_id: Uuid,
    #[schema(example = "Ana Souza")]
    pub user_full_name: String,
    #[schema(example = "Coordenadora")]
    pub user_role: String,
    #[schema(example = "Sala 3")]
    pub location: String,
    pub cpf: Option<String>,
    /// Asset tags; stored comma-separated.
    #[serde(default)]
    pub asset_numbers: Vec<String>,
    #[schema(example = 1, minimum = 1)]
    pub quantity: i32,
    /// Local time, `YYYY-MM-DDTHH:mm`.
    #[serde(deserialize_with = "deserialize_local_datetime")]
    #[schema(value_type = String, example = "2026-03-10T07:30")]
    pub start_at: NaiveDateTime,
    #[serde(deserialize_with = "deserialize_local_datetime")]
    #[schema(value_type = String, example = "2026-03-10T12:00")]
    pub end_at: NaiveDateTime,
    pub manual_term_url: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn join_assets(assets: &[String]) -> Option<String> {
    let joined = assets
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

impl CreateLoanRequest {
    /// Checks that do not need the equipment row.
    fn check(&self, now: NaiveDateTime) -> ApiResult<()> {
        if self.user_full_name.trim().is_empty()
            || self.user_role.trim().is_empty()
            || self.location.trim().is_empty()
        {
            return Err(ApiError::validation(
                "Por favor, preencha todos os campos obrigatórios.",
            ));
        }
        // Minute precision, as typed in the form.
        let now = now
            .date()
            .and_hms_opt(now.time().hour(), now.time().minute(), 0)
            .unwrap_or(now);
        if self.start_at < now {
            return Err(ApiError::validation(
                "A data de início não pode estar no passado.",
            ));
        }
        if self.end_at < self.start_at {
            return Err(ApiError::validation(
                "A data de devolução deve ser posterior à data de início.",
            ));
        }
        if self.quantity < 1 {
            return Err(ApiError::validation("A quantidade deve ser de pelo menos 1."));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct LoanAudit<'a> {
    equipment_name: &'a str,
    borrower: &'a str,
    role: &'a str,
    location: &'a str,
    unit: &'a str,
    quantity: i32,
    asset_number: Option<&'a str>,
}

#[utoipa::path(
    post,
    path = "/admin/loans",
    tag = "Loans",
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan registered", body = LoanView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Equipment not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_loan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
    headers: HeaderMap,
    Json(payload): Json<CreateLoanRequest>,
) -> ApiResult<(StatusCode, Json<LoanView>)> {
    payload.check(state.clock.now())?;
    let admin_id = principal_id(&claims)?;
    let scope = admin_scope(&state, &claims);
    let mut conn = get_db_conn(&state.db_pool)?;

    let (loan, equipment_name) = conn
        .transaction::<_, TxError, _>(|conn| {
            let item: Equipment = equipment::table
                .find(payload.equipment_id)
                .select(Equipment::as_select())
                .for_update()
                .first(conn)
                .optional()?
                .filter(|e| scope.allows(&e.unit))
                .ok_or_else(|| {
                    ApiError::not_found("Equipamento não encontrado.", "EQUIPMENT_NOT_FOUND")
                })?;

            if payload.quantity > item.total_quantity {
                return Err(ApiError::validation(format!(
                    "Quantidade indisponível. Máximo disponível: {}.",
                    item.total_quantity
                ))
                .into());
            }

            diesel::update(equipment::table.find(item.id))
                .set(equipment::total_quantity.eq(equipment::total_quantity - payload.quantity))
                .execute(conn)?;

            let loan: EquipmentLoan = diesel::insert_into(equipment_loans::table)
                .values(&NewEquipmentLoan {
                    unit: item.unit.clone(),
                    equipment_id: item.id,
                    user_full_name: payload.user_full_name.trim().to_string(),
                    user_role: payload.user_role.trim().to_string(),
                    location: payload.location.trim().to_string(),
                    cpf: trimmed(&payload.cpf),
                    asset_number: join_assets(&payload.asset_numbers),
                    quantity: payload.quantity,
                    start_at: state.clock.local_to_naive_utc(payload.start_at),
                    end_at: state.clock.local_to_naive_utc(payload.end_at),
                    manual_term_url: trimmed(&payload.manual_term_url),
                    created_by: Some(admin_id),
                })
                .returning(EquipmentLoan::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::CreateLoan, "equipment_loans")
                    .record(loan.id)
                    .new_data(&LoanAudit {
                        equipment_name: &item.name,
                        borrower: &loan.user_full_name,
                        role: &loan.user_role,
                        location: &loan.location,
                        unit: &loan.unit,
                        quantity: loan.quantity,
                        asset_number: loan.asset_number.as_deref(),
                    })
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;

            OutboxService::emit(
                conn,
                EventType::LoanCreated,
                AggregateType::Loan,
                loan.id,
                serde_json::to_value(LoanPayload {
                    equipment_id: item.id,
                    borrower: loan.user_full_name.clone(),
                    quantity: loan.quantity,
                })
                .unwrap_or_default(),
                Some(admin_id),
                Some(loan.unit.clone()),
                Some(request_id.to_string()),
            )?;

            Ok((loan, item.name))
        })
        .map_err(TxError::into_response)?;

    info!(loan_id = %loan.id, quantity = loan.quantity, "Loan registered");
    Ok((
        StatusCode::CREATED,
        Json(LoanView::new(loan, equipment_name, &state.clock)),
    ))
}

fn lock_scoped_loan(
    conn: &mut PgConnection,
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<(EquipmentLoan, String), TxError> {
    equipment_loans::table
        .inner_join(equipment::table)
        .filter(equipment_loans::id.eq(id))
        .select((EquipmentLoan::as_select(), equipment::name))
        .for_update()
        .first(conn)
        .optional()?
        .filter(|(l, _): &(EquipmentLoan, String)| admin_scope(state, claims).allows(&l.unit))
        .ok_or_else(|| ApiError::not_found("Empréstimo não encontrado.", "LOAN_NOT_FOUND").into())
}

fn restore_stock(conn: &mut PgConnection, loan: &EquipmentLoan) -> QueryResult<usize> {
    diesel::update(equipment::table.find(loan.equipment_id))
        .set(equipment::total_quantity.eq(equipment::total_quantity + loan.quantity))
        .execute(conn)
}

#[utoipa::path(
    post,
    path = "/admin/loans/{id}/return",
    tag = "Loans",
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Returned; stock restored", body = LoanView),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Already returned", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn return_loan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request_id: RequestId,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LoanView>> {
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let (loan, name) = conn
        .transaction::<_, TxError, _>(|conn| {
            let (before, name) = lock_scoped_loan(conn, &state, &claims, id)?;
            if before.status != status::LOAN_ACTIVE {
                return Err(ApiError::conflict(
                    "Este empréstimo já foi devolvido.",
                    "LOAN_ALREADY_RETURNED",
                )
                .into());
            }

            restore_stock(conn, &before)?;
            let after: EquipmentLoan = diesel::update(equipment_loans::table.find(id))
                .set(equipment_loans::status.eq(status::LOAN_RETURNED))
                .returning(EquipmentLoan::as_returning())
                .get_result(conn)?;

            AuditService::record(
                conn,
                AuditEntry::new(admin_id, AuditAction::ReturnLoan, "equipment_loans")
                    .record(id)
                    .old(&before)
                    .new_data(&after)
                    .ip(AuditService::ip_from_headers(&headers)),
            )?;

            OutboxService::emit(
                conn,
                EventType::LoanReturned,
                AggregateType::Loan,
                id,
                serde_json::to_value(LoanPayload {
                    equipment_id: after.equipment_id,
                    borrower: after.user_full_name.clone(),
                    quantity: after.quantity,
                })
                .unwrap_or_default(),
                Some(admin_id),
                Some(after.unit.clone()),
                Some(request_id.to_string()),
            )?;
            Ok((after, name))
        })
        .map_err(TxError::into_response)?;

    info!(loan_id = %id, "Loan returned");
    Ok(Json(LoanView::new(loan, name, &state.clock)))
}

#[derive(Debug, Serialize)]
struct DeletedLoan<'a> {
    #[serde(flatten)]
    loan: &'a EquipmentLoan,
    equipment_name: &'a str,
}

#[utoipa::path(
    delete,
    path = "/admin/loans/{id}",
    tag = "Loans",
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let admin_id = principal_id(&claims)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    conn.transaction::<_, TxError, _>(|conn| {
        let (loan, name) = lock_scoped_loan(conn, &state, &claims, id)?;
        if loan.status == status::LOAN_ACTIVE {
            restore_stock(conn, &loan)?;
        }

        diesel::delete(equipment_loans::table.find(id)).execute(conn)?;

        AuditService::record(
            conn,
            AuditEntry::new(admin_id, AuditAction::DeleteLoan, "equipment_loans")
                .record(id)
                .old(&DeletedLoan {
                    loan: &loan,
                    equipment_name: &name,
                })
                .ip(AuditService::ip_from_headers(&headers)),
        )?;
        Ok(())
    })
    .map_err(TxError::into_response)?;

    info!(loan_id = %id, "Loan deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn request(start: NaiveDateTime, end: NaiveDateTime, quantity: i32) -> CreateLoanRequest {
        CreateLoanRequest {
            equipment_id: Uuid::new_v4(),
            user_full_name: "Ana".to_string(),
            user_role: "Coordenadora".to_string(),
            location: "Sala 3".to_string(),
            cpf: None,
            asset_numbers: vec![],
            quantity,
            start_at: start,
            end_at: end,
            manual_term_url: None,
        }
    }

    #[test]
    fn test_loan_in_the_current_minute_is_accepted() {
        let now = at(10, 15) + chrono::Duration::seconds(40);
        assert!(request(at(10, 15), at(12, 0), 1).check(now).is_ok());
    }

    #[test]
    fn test_loan_in_the_past_is_rejected() {
        let err = request(at(9, 0), at(12, 0), 1).check(at(10, 0)).unwrap_err();
        assert_eq!(err.1 .0.error, "A data de início não pode estar no passado.");
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        assert!(request(at(12, 0), at(11, 0), 1).check(at(8, 0)).is_err());
        assert!(request(at(12, 0), at(12, 0), 1).check(at(8, 0)).is_ok());
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        assert!(request(at(12, 0), at(13, 0), 0).check(at(8, 0)).is_err());
    }

    #[test]
    fn test_assets_are_comma_joined() {
        let assets = vec!["P-1".to_string(), " ".to_string(), " P-2 ".to_string()];
        assert_eq!(join_assets(&assets).as_deref(), Some("P-1, P-2"));
        assert_eq!(join_assets(&[]), None);
    }
}
