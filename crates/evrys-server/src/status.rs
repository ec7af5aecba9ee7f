//! Mapping of domain failures onto protocol status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use evrys_store::StoreError;
use evrys_types::{Code, ErrorBody};
use thiserror::Error;

/// API error type mapping to protocol codes and HTTP statuses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> Code {
        match self {
            ApiError::InvalidArgument(_) => Code::InvalidArgument,
            ApiError::FailedPrecondition(_) => Code::FailedPrecondition,
            ApiError::NotFound(_) => Code::NotFound,
            ApiError::Unavailable(_) => Code::Unavailable,
            ApiError::Internal(_) => Code::Internal,
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::InvalidArgument(msg)
            | ApiError::FailedPrecondition(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::InvalidCursor(_) => ApiError::InvalidArgument(err.to_string()),
            ref e if e.is_transient() => ApiError::Unavailable(err.to_string()),
            // Marshal failures and misconfiguration will not go away on retry.
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(ErrorBody {
            code,
            error: self.message(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed() -> evrys_store::BoxError {
        "backend said no".into()
    }

    #[test]
    fn store_errors_map_to_codes() {
        let cases = [
            (StoreError::NotFound { id: "x".into() }, Code::NotFound),
            (StoreError::InvalidCursor("bad".into()), Code::InvalidArgument),
            (
                StoreError::Connection { backend: "b", source: boxed() },
                Code::Unavailable,
            ),
            (
                StoreError::Put { backend: "b", source: boxed() },
                Code::Unavailable,
            ),
            (
                StoreError::Query { backend: "b", source: boxed() },
                Code::Unavailable,
            ),
            (
                StoreError::Marshal { from: "event", to: "json", source: boxed() },
                Code::Internal,
            ),
            (
                StoreError::Validation {
                    config: "c",
                    field: "f",
                    reason: "r".into(),
                },
                Code::Internal,
            ),
        ];

        for (err, expected) in cases {
            let label = err.to_string();
            assert_eq!(ApiError::from(err).code(), expected, "{label}");
        }
    }

    #[test]
    fn response_carries_status_and_body() {
        let response = ApiError::FailedPrecondition("event type must be set".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
