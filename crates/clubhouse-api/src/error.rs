use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use clubhouse_lifecycle::Rejection;
use clubhouse_types::api::ErrorBody;

/// Every failure a handler can surface, already phrased for the member.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("admin role required")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("no active registration for this event")]
    NotRegistered,
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// Refund provider failure, passed through verbatim.
    #[error("{0}")]
    Refund(String),
    #[error("something went wrong, please try again")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Rejected(Rejection::Closed) => StatusCode::CONFLICT,
            Self::Rejected(Rejection::PaymentRequired) => StatusCode::PAYMENT_REQUIRED,
            Self::NotRegistered | Self::InvalidState(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Refund(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Rejected(Rejection::Closed) => "registration_closed",
            Self::Rejected(Rejection::PaymentRequired) => "payment_required",
            Self::NotRegistered => "not_registered",
            Self::InvalidState(_) => "invalid_state",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::Refund(_) => "refund_failed",
            Self::Internal(_) => "retryable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("Internal error: {:#}", e);
        }
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
