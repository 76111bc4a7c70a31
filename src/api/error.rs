//! Maps [`DomainError`] onto the `{"error": {"code": ..., "message": ...}}`
//! body of §6.1, following the `IntoResponse`-on-an-enum idiom of
//! `astria-sequencer-relayer/src/api.rs`'s `Healthz`/`Readyz`.

use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
    Json,
};
use serde::Serialize;

use crate::domain::DomainError;

pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST_PARAMETERS"),
            DomainError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            DomainError::AlreadyExists => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            DomainError::AuctionEnded => (StatusCode::CONFLICT, "AUCTION_ENDED"),
            DomainError::BidTooLow { .. } => (StatusCode::BAD_REQUEST, "BID_TOO_LOW"),
            DomainError::SellerCannotBid => (StatusCode::CONFLICT, "SELLER_CANNOT_BID"),
            DomainError::Transient(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
            DomainError::CircuitOpen(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            DomainError::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
