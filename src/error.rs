//! Shared error handling utilities.

use axum::{http::StatusCode, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "Horário indisponível! Alguém acabou de reservar.")]
    pub error: String,
    #[schema(example = "ROOM_UNAVAILABLE")]
    pub code: String,
}

pub type ApiErrorResponse = (StatusCode, Json<ApiError>);

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (StatusCode::BAD_REQUEST, Json(Self::new(error, code)))
    }

    /// Form validation failure; the message is shown to the user as-is.
    pub fn validation(error: impl Into<String>) -> ApiErrorResponse {
        Self::bad_request(error, "VALIDATION_ERROR")
    }

    pub fn unauthorized(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (StatusCode::UNAUTHORIZED, Json(Self::new(error, code)))
    }

    pub fn forbidden(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (StatusCode::FORBIDDEN, Json(Self::new(error, code)))
    }

    pub fn not_found(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (StatusCode::CONFLICT, Json(Self::new(error, code)))
    }

    pub fn locked(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (StatusCode::LOCKED, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> ApiErrorResponse {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }

    pub fn db_error() -> ApiErrorResponse {
        Self::internal("Database error", "DB_ERROR")
    }
}

pub type ApiResult<T> = Result<T, ApiErrorResponse>;

/// Error type used inside `conn.transaction(..)` closures so handlers can
/// abort a transaction with a domain response instead of a bare diesel error.
#[derive(Debug)]
pub enum TxError {
    Db(DieselError),
    Api(ApiErrorResponse),
}

impl From<DieselError> for TxError {
    fn from(e: DieselError) -> Self {
        TxError::Db(e)
    }
}

impl From<ApiErrorResponse> for TxError {
    fn from(e: ApiErrorResponse) -> Self {
        TxError::Api(e)
    }
}

impl TxError {
    pub fn into_response(self) -> ApiErrorResponse {
        match self {
            TxError::Api(resp) => resp,
            TxError::Db(e) => {
                error!(error = %e, "Transaction failed");
                ApiError::db_error()
            }
        }
    }
}

/// Maps a diesel error to a response, translating constraint violations.
pub fn map_db_error(
    e: DieselError,
    unique_message: &str,
    fk_message: &str,
) -> ApiErrorResponse {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ApiError::conflict(unique_message, "ALREADY_EXISTS")
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            ApiError::conflict(fk_message, "REFERENCED_RECORD")
        }
        DieselError::NotFound => ApiError::not_found("Registro não encontrado.", "NOT_FOUND"),
        other => {
            error!(error = %other, "Database error");
            ApiError::db_error()
        }
    }
}

/// Surfaces the first field message of a `validator` failure; the portal
/// shows a single line.
pub fn validation_error(e: validator::ValidationErrors) -> ApiErrorResponse {
    let message = e
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Dados inválidos.".to_string());
    ApiError::validation(message)
}

/// Logs an unexpected diesel error and hides it behind a generic 500.
pub fn db_failure(e: DieselError) -> ApiErrorResponse {
    error!(error = %e, "Database error");
    ApiError::db_error()
}

pub fn get_db_conn(
    pool: &DbPool,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    ApiErrorResponse,
> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}
