//! Maps [`CoreError`] onto the JSON error body and status code every HTTP
//! handler in this module returns on failure (spec.md 7).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::CoreError;

pub struct ApiError(CoreError);

impl<E: Into<CoreError>> From<E> for ApiError {
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.message,
            kind: format!("{:?}", self.0.kind),
        };
        (status, Json(body)).into_response()
    }
}
