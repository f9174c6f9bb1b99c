//! Error types for cifra-api
//!
//! Handlers return [`ApiError`]; its [`IntoResponse`] implementation renders the
//! production form of the error envelope and attaches an [`ApiFailure`] to the
//! response so the error middleware can log it and, outside production, add
//! diagnostic `details`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cifra_common::db::DbError;
use cifra_common::validation::ValidationErrors;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::ErrorEnvelope;

/// Message returned for every unexpected failure
pub const GENERAL_ERROR_MESSAGE: &str = "An error occurred while processing your request";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request failed schema validation (400)
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Malformed JSON body or query string (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request body over the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A procedure rejected the request on business grounds (400)
    #[error("{0}")]
    BusinessRule(String),

    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Anything else (500); the cause never reaches a production client
    #[error("An error occurred while processing your request")]
    General(#[source] DbError),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::BusinessRuleViolation { message } => ApiError::BusinessRule(message),
            other => ApiError::General(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::BusinessRule(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::General(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::BusinessRule(_) => "BUSINESS_RULE_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::General(_) => "GENERAL_ERROR",
        }
    }

    /// Describe this error for rendering and logging
    pub fn failure(&self) -> ApiFailure {
        let (message, details, diagnostics) = match self {
            ApiError::Validation(errors) => (
                "Validation failed".to_string(),
                serde_json::to_value(&errors.issues).ok(),
                None,
            ),
            ApiError::General(cause) => (
                GENERAL_ERROR_MESSAGE.to_string(),
                None,
                Some(error_chain(cause)),
            ),
            ApiError::BadRequest(message)
            | ApiError::PayloadTooLarge(message)
            | ApiError::BusinessRule(message)
            | ApiError::NotFound(message) => (message.clone(), None, None),
        };

        ApiFailure {
            status: self.status(),
            code: self.code(),
            message,
            details,
            diagnostics,
        }
    }
}

/// Render an error and its sources as `outer: inner: root`, skipping
/// sources already quoted by an outer message
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !chain.contains(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        source = cause.source();
    }
    chain
}

/// Everything the error middleware needs to log and re-render a failure
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    /// Client-safe details, always sent
    pub details: Option<Value>,
    /// Internal detail, sent only outside production
    pub diagnostics: Option<String>,
}

impl ApiFailure {
    /// Failure for a panic caught while handling a request
    pub fn panic(diagnostics: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_SERVER_ERROR",
            message: "Internal Server Error".to_string(),
            details: None,
            diagnostics: Some(diagnostics),
        }
    }

    /// Render the error envelope, exposing diagnostics as `details` if asked
    pub fn render(&self, expose_diagnostics: bool) -> Response {
        let details = self.details.clone().or_else(|| {
            self.diagnostics
                .clone()
                .filter(|_| expose_diagnostics)
                .map(Value::String)
        });
        let body = ErrorEnvelope::new(self.code, self.message.clone(), details);
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(self.clone());
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.failure().render(false)
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
