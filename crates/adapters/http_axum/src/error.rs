//! HTTP error response mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use devicehub_domain::error::{DeviceHubError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`DeviceHubError`] to an HTTP response with appropriate status code.
pub struct ApiError(DeviceHubError);

impl From<DeviceHubError> for ApiError {
    fn from(err: DeviceHubError) -> Self {
        Self(err)
    }
}

/// Undecodable or wrongly typed bodies are validation failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ValidationError::MalformedBody(rejection.body_text()).into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            DeviceHubError::Validation(_) | DeviceHubError::Precondition(_) => {
                StatusCode::BAD_REQUEST
            }
            DeviceHubError::NotFound(_) => StatusCode::NOT_FOUND,
            DeviceHubError::Conflict(_) => StatusCode::CONFLICT,
            DeviceHubError::DataIntegrity(_) | DeviceHubError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            DeviceHubError::DataIntegrity(err) => {
                tracing::error!(error = %err, "data integrity error");
                "internal server error".to_string()
            }
            DeviceHubError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
