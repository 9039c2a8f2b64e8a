//! Failure normalization for backend calls.
//!
//! Every failed request, whether it got a response or not, is mapped into a
//! [`NormalizedError`] before it reaches a caller. Callers branch on
//! [`ErrorKind`] only, never on raw status codes or response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to error text, used for form highlighting.
pub type FieldErrors = BTreeMap<String, String>;

/// Closed set of failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    Validation,
    ServerError,
    NetworkError,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directive the caller is expected to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    RedirectToLogin,
}

/// The single error shape consumed by callers of the API client.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct NormalizedError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RecoveryAction>,
}

impl NormalizedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field_errors: None,
            action: None,
        }
    }

    /// Local validation failure, produced before any request is sent.
    pub fn validation(field_errors: FieldErrors) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: VALIDATION_MESSAGE.to_string(),
            field_errors: Some(field_errors),
            action: None,
        }
    }

    pub fn requires_login(&self) -> bool {
        self.action == Some(RecoveryAction::RedirectToLogin)
    }

    /// Failures worth retrying: the backend was unreachable or broke.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::NetworkError | ErrorKind::ServerError)
    }
}

/// Raw outcome of a failed HTTP call, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpFailure {
    /// The server answered with a non-2xx status.
    Status { status: u16, body: Option<Value> },
    /// The request went out but no response came back.
    NoResponse { reason: String },
    /// The request was never sent, or the client failed locally.
    NotSent { reason: String },
}

const BAD_REQUEST_MESSAGE: &str = "Bad request. Please check your input.";
const UNAUTHENTICATED_MESSAGE: &str = "Authentication failed. Please log in again.";
const FORBIDDEN_MESSAGE: &str =
    "Access denied. You do not have permission to perform this action.";
const NOT_FOUND_MESSAGE: &str = "Resource not found.";
const VALIDATION_MESSAGE: &str = "Validation error. Please check your input.";
const SERVER_ERROR_MESSAGE: &str = "Server error. Please try again later.";
const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your internet connection.";
const UNKNOWN_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// Keys that carry human-readable text rather than field errors.
const MESSAGE_KEYS: [&str; 3] = ["message", "detail", "error"];

/// Map a failed call into a [`NormalizedError`].
///
/// Server-provided `message`, `detail` or `error` text replaces the default
/// message but never changes the kind.
pub fn normalize(failure: &HttpFailure) -> NormalizedError {
    let normalized = match failure {
        HttpFailure::Status { status, body } => normalize_status(*status, body.as_ref()),
        HttpFailure::NoResponse { .. } => {
            NormalizedError::new(ErrorKind::NetworkError, NETWORK_ERROR_MESSAGE)
        }
        HttpFailure::NotSent { .. } => {
            NormalizedError::new(ErrorKind::UnknownError, UNKNOWN_ERROR_MESSAGE)
        }
    };

    match failure {
        HttpFailure::Status { status, .. } => tracing::warn!(
            status,
            kind = %normalized.kind,
            "API request failed"
        ),
        HttpFailure::NoResponse { reason } | HttpFailure::NotSent { reason } => tracing::warn!(
            kind = %normalized.kind,
            reason = %reason,
            "API request failed without a response"
        ),
    }

    normalized
}

fn normalize_status(status: u16, body: Option<&Value>) -> NormalizedError {
    let (kind, default_message) = match status {
        400 => (ErrorKind::BadRequest, BAD_REQUEST_MESSAGE.to_string()),
        401 => (ErrorKind::Unauthenticated, UNAUTHENTICATED_MESSAGE.to_string()),
        403 => (ErrorKind::Forbidden, FORBIDDEN_MESSAGE.to_string()),
        404 => (ErrorKind::NotFound, NOT_FOUND_MESSAGE.to_string()),
        422 => (ErrorKind::Validation, VALIDATION_MESSAGE.to_string()),
        s if s >= 500 => (ErrorKind::ServerError, SERVER_ERROR_MESSAGE.to_string()),
        s => (ErrorKind::UnknownError, format!("Request failed with status {}.", s)),
    };

    let message = body.and_then(server_message).unwrap_or(default_message);

    let field_errors = match kind {
        ErrorKind::Validation => body.and_then(|b| {
            explicit_field_errors(b).or_else(|| top_level_field_errors(b))
        }),
        ErrorKind::BadRequest => body.and_then(explicit_field_errors),
        _ => None,
    };

    let action = (kind == ErrorKind::Unauthenticated).then_some(RecoveryAction::RedirectToLogin);

    NormalizedError {
        kind,
        message,
        field_errors,
        action,
    }
}

/// First non-empty string among the message-bearing keys.
fn server_message(body: &Value) -> Option<String> {
    MESSAGE_KEYS.iter().find_map(|key| {
        body.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn explicit_field_errors(body: &Value) -> Option<FieldErrors> {
    match body.get("errors") {
        Some(Value::Object(map)) => collect_field_errors(map.iter()),
        _ => None,
    }
}

fn top_level_field_errors(body: &Value) -> Option<FieldErrors> {
    let map = body.as_object()?;
    collect_field_errors(
        map.iter()
            .filter(|(k, _)| !MESSAGE_KEYS.contains(&k.as_str()) && k.as_str() != "success"),
    )
}

fn collect_field_errors<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Option<FieldErrors> {
    let errors: FieldErrors = entries
        .filter_map(|(field, value)| field_text(value).map(|text| (field.clone(), text)))
        .collect();
    (!errors.is_empty()).then_some(errors)
}

/// DRF reports either a single string or a list of strings per field.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}
