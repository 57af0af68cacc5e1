use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use linkfolio_types::api::ErrorResponse;

/// Handler failures. Backend causes are logged and replaced by a generic
/// message before anything reaches the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Backend {
        message: &'static str,
        cause: anyhow::Error,
    },
}

impl ApiError {
    /// `map_err` adapter: `.map_err(ApiError::backend("..."))`.
    pub fn backend<E: Into<anyhow::Error>>(message: &'static str) -> impl FnOnce(E) -> Self {
        move |cause| ApiError::Backend {
            message,
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Backend { message, cause } = &self {
            error!("{}: {:#}", message, cause);
        }

        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
