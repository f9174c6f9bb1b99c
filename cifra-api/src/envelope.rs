//! Response envelope
//!
//! Success: `{"success": true, "data": ..., "timestamp": "..."}`
//!
//! Error: `{"success": false, "error": {"code", "message", "details"?}, "timestamp": "..."}`

use axum::Json;
use cifra_common::time::iso_timestamp;
use serde::Serialize;
use serde_json::Value;

/// Successful response body
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: iso_timestamp(),
        }
    }
}

/// Wrap `data` in a success envelope
pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::success(data))
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Failed response body
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details,
            },
            timestamp: iso_timestamp(),
        }
    }
}
