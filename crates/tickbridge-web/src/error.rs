use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tickbridge_core::{Endpoint, RouteFailure, SourceError, SourceErrorKind, ValidationError};

/// Handler-level failures mapped to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to fetch {endpoint} data")]
    Source {
        endpoint: Endpoint,
        #[source]
        error: SourceError,
    },
}

impl ApiError {
    pub fn route(endpoint: Endpoint, failure: RouteFailure) -> Self {
        Self::Source {
            endpoint,
            error: failure.error,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Source { error, .. } => match error.kind() {
                SourceErrorKind::UnsupportedEndpoint => StatusCode::BAD_REQUEST,
                SourceErrorKind::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Source { error, .. } if status.is_server_error() => {
                tracing::error!(code = error.code(), error = %error, "{}", self);
                ErrorBody {
                    message: self.to_string(),
                    error: Some(error.to_string()),
                }
            }
            // Caller mistakes report the core message directly.
            Self::Source { error, .. } => ErrorBody {
                message: error.to_string(),
                error: None,
            },
            _ => ErrorBody {
                message: self.to_string(),
                error: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
