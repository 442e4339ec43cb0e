use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("booking {0} already exists")]
    Conflict(i64),

    #[error("record not found")]
    NotFound,

    #[error("payment signature verification failed")]
    SignatureInvalid,

    #[error("payment provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("illegal status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("payment recorded for booking {booking_id} but the status update failed")]
    PartialSettlement { booking_id: i64 },

    #[error("unknown booking status: {0}")]
    UnknownStatus(String),

    #[error("amount {0} cannot be charged")]
    InvalidAmount(String),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),
}

impl From<diesel_async::pooled_connection::bb8::RunError> for ServiceError {
    fn from(err: diesel_async::pooled_connection::bb8::RunError) -> Self {
        ServiceError::Pool(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        // Internal detail stays in the logs; clients get a generic message.
        let (status, message) = match &self {
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServiceError::NotFound => (StatusCode::NOT_FOUND, "record not found".to_string()),
            ServiceError::SignatureInvalid => (
                StatusCode::BAD_REQUEST,
                "payment verification failed".to_string(),
            ),
            ServiceError::UpstreamUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "payment provider unavailable, please retry".to_string(),
            ),
            ServiceError::InvalidTransition { .. }
            | ServiceError::UnknownStatus(_)
            | ServiceError::InvalidAmount(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ServiceError::PartialSettlement { booking_id } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "payment recorded but booking {} is not yet marked paid; retry the status update",
                    booking_id
                ),
            ),
            ServiceError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            ServiceError::Pool(e) => {
                error!("pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failure_hides_crypto_detail() {
        let resp = ServiceError::SignatureInvalid.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_errors_map_to_500() {
        let resp = ServiceError::Database(diesel::result::Error::NotFound).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = ServiceError::NotFound.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn partial_settlement_names_the_booking() {
        let e = ServiceError::PartialSettlement { booking_id: 42 };
        assert!(e.to_string().contains("42"));
    }
}
