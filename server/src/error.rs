use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use places_core::{AuthError, QueryError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Query(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(AuthError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Message safe to show to the caller; server-side failures stay in the log.
    fn public_message(&self) -> String {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            return "Internal Server Error".into();
        }
        if status == StatusCode::UNAUTHORIZED {
            tracing::debug!(error = %self, "rejected token");
            return "Unauthorized".into();
        }
        self.to_string()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { error: self.public_message() })).into_response()
    }
}

/// Same mapping as [`ApiError`], plain-text body for the HTML pages.
#[derive(Debug)]
pub struct PageError(pub ApiError);

impl From<ApiError> for PageError {
    fn from(e: ApiError) -> Self { PageError(e) }
}

impl From<QueryError> for PageError {
    fn from(e: QueryError) -> Self { PageError(e.into()) }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        (self.0.status(), self.0.public_message()).into_response()
    }
}
