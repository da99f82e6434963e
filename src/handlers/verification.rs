//! Public check of a printed term's QR code.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use diesel::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    error::{db_failure, get_db_conn, ApiResult},
    models::{Booking, NewVerificationLog},
    scheduling::rules::EffectiveStatus,
    schema::{bookings, equipment, users, verification_logs},
    AppState,
};

const VERIFIED_QR: &str = "VERIFIED_QR";
const ANONYMOUS: &str = "ANONYMOUS";

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifiedBooking {
    pub display_id: Option<String>,
    pub unit: String,
    pub local: String,
    pub booking_date: NaiveDate,
    #[schema(value_type = String, example = "07:30:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "09:10:00")]
    pub end_time: NaiveTime,
    pub equipment_name: String,
    pub quantity: i32,
    pub status: EffectiveStatus,
    pub teacher_name: String,
    pub teacher_totvs: String,
    #[schema(value_type = Option<Object>)]
    pub term_document: Option<serde_json::Value>,
    pub term_hash: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub booking: Option<VerifiedBooking>,
}

impl VerificationResult {
    fn invalid() -> (StatusCode, Json<Self>) {
        (
            StatusCode::NOT_FOUND,
            Json(Self {
                valid: false,
                booking: None,
            }),
        )
    }
}

#[utoipa::path(
    get,
    path = "/verify/{token}",
    tag = "Verification",
    params(("token" = String, Path, description = "Verification token printed on the term")),
    responses(
        (status = 200, description = "Authentic term", body = VerificationResult),
        (status = 404, description = "Unknown token", body = VerificationResult)
    )
)]
pub async fn verify_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> ApiResult<(StatusCode, Json<VerificationResult>)> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let found: Option<(Booking, String, String, String)> = bookings::table
        .inner_join(equipment::table)
        .inner_join(users::table)
        .filter(bookings::verification_token.eq(token.trim()))
        .select((
            Booking::as_select(),
            equipment::name,
            users::full_name,
            users::totvs_number,
        ))
        .first(&mut conn)
        .optional()
        .map_err(db_failure)?;

    let Some((booking, equipment_name, teacher_name, teacher_totvs)) = found else {
        return Ok(VerificationResult::invalid());
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // A failed log write must not hide an authentic term.
    if let Err(e) = diesel::insert_into(verification_logs::table)
        .values(&NewVerificationLog {
            booking_id: booking.id,
            action: VERIFIED_QR.to_string(),
            performed_by: ANONYMOUS.to_string(),
            details: serde_json::json!({ "user_agent": user_agent }),
        })
        .execute(&mut conn)
    {
        warn!(booking_id = %booking.id, error = %e, "Failed to record verification");
    }

    info!(booking_id = %booking.id, "Term verified");

    let status = EffectiveStatus::of(
        &booking.status,
        booking.booking_date,
        booking.end_time,
        state.clock.now(),
    );

    Ok((
        StatusCode::OK,
        Json(VerificationResult {
            valid: true,
            booking: Some(VerifiedBooking {
                display_id: booking.display_id,
                unit: booking.unit,
                local: booking.local,
                booking_date: booking.booking_date,
                start_time: booking.start_time,
                end_time: booking.end_time,
                equipment_name,
                quantity: booking.quantity,
                status,
                teacher_name,
                teacher_totvs,
                term_document: booking.term_document,
                term_hash: booking.term_hash,
            }),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_result_is_404_with_valid_false() {
        let (status, Json(body)) = VerificationResult::invalid();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(serde_json::to_value(body).unwrap(), serde_json::json!({ "valid": false }));
    }
}
