use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use storefront_core::errors::{ApplicationError, InterfaceError};
use storefront_db::RepositoryError;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

/// Correlation id supplied by the caller, or a fresh one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("unknown login provider `{provider}`")]
    UnknownProvider { provider: String, correlation_id: String },
    #[error("anti-forgery token is missing or invalid")]
    AntiForgery { correlation_id: String },
    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

impl WebError {
    pub fn application(error: ApplicationError, correlation_id: &str) -> Self {
        Self::Interface(error.into_interface(correlation_id))
    }

    pub fn repository(error: RepositoryError, correlation_id: &str) -> Self {
        error!(
            event_name = "web.repository.failed",
            correlation_id = %correlation_id,
            error = %error,
            "repository call failed"
        );
        Self::application(ApplicationError::Persistence(error.to_string()), correlation_id)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownProvider { .. } | Self::AntiForgery { .. } => StatusCode::BAD_REQUEST,
            Self::Interface(InterfaceError::BadRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::Interface(InterfaceError::ServiceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Interface(InterfaceError::Internal { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::UnknownProvider { provider, correlation_id } => ErrorBody {
                error: format!("Unknown login provider `{provider}`."),
                correlation_id: correlation_id.clone(),
            },
            Self::AntiForgery { correlation_id } => ErrorBody {
                error: "The anti-forgery token is missing or invalid.".to_string(),
                correlation_id: correlation_id.clone(),
            },
            Self::Interface(interface) => ErrorBody {
                error: interface.user_message().to_string(),
                correlation_id: interface.correlation_id().to_string(),
            },
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        warn!(
            event_name = "web.request.failed",
            correlation_id = %body.correlation_id,
            status = status.as_u16(),
            error = %self,
            "request failed"
        );
        (status, Json(body)).into_response()
    }
}
