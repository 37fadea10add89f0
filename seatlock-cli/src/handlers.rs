use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use seatlock_core::types::Participant;
use seatlock_core::QueueError;

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn validate_user_id(user_id: &str) -> Result<(), String> {
    if user_id.trim().is_empty() {
        Err("user_id is required".to_string())
    } else {
        Ok(())
    }
}

fn validate_email(email: Option<&str>) -> Result<(), String> {
    match email {
        Some(email) if !email.contains('@') => {
            Err(format!("Invalid user_email '{}'", email))
        }
        _ => Ok(()),
    }
}

// ─── Request Types ──────────────────────────────────────────────────────────

/// Body of every queue operation. Only `user_id` matters for heartbeat,
/// leave and release; the display fields are stored on join and claim.
#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl ParticipantRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_user_id(&self.user_id)?;
        validate_email(self.user_email.as_deref())?;
        Ok(())
    }

    pub fn participant(&self) -> Participant {
        Participant {
            user_id: self.user_id.clone(),
            user_email: self.user_email.clone(),
            user_name: self.user_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user_id: String,
}

/// Opens a viewing session, or keeps one alive when `session_id` is given.
#[derive(Debug, Deserialize)]
pub struct ViewerRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_resources: usize,
    /// Resources with at least one live viewer session
    pub watched_resources: usize,
    pub version: String,
}

#[derive(Serialize)]
pub struct ViewerSessionResponse {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct ViewerExitResponse {
    pub removed: bool,
}

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_email: Option<String>,
}

/// A failed request: HTTP status plus the JSON error envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                code,
                error: error.into(),
                holder: None,
                holder_email: None,
            },
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", error)
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        let message = err.to_string();
        match err {
            QueueError::NotFound { .. } => Self::not_found(message),
            QueueError::Conflict {
                holder,
                holder_email,
                ..
            } => {
                let mut api = Self::new(StatusCode::CONFLICT, "CONFLICT", message);
                api.body.holder = Some(holder);
                api.body.holder_email = holder_email;
                api
            }
            QueueError::Transient(_) | QueueError::RetriesExhausted { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "BUSY", message)
            }
            QueueError::InvalidRequest(_) => Self::bad_request(message),
            QueueError::Storage(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.body.code, error = %self.body.error, "Request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
