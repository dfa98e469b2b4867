//! Backend API error types

use std::fmt;

use crate::wizard::GatewayError;

/// Errors that can occur when talking to the console backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized - token missing, invalid or expired
    Unauthorized,
    /// 403 Forbidden - token lacks the required role
    Forbidden,
    /// Connection, TLS or timeout failure
    NetworkError { message: String },
    /// Any other non-success status
    HttpError {
        status: u16,
        /// `message` taken from the error body, if there was one
        message: Option<String>,
    },
    /// Success status with a body we could not read
    Decode { message: String },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Forbidden)
    }

    /// 4xx other than the auth statuses
    pub fn is_client_error(&self) -> bool {
        matches!(self, ApiError::HttpError { status, .. } if (400..500).contains(status))
    }

    pub fn network(message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: Option<String>) -> Self {
        ApiError::HttpError { status, message }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ApiError::Decode {
            message: message.into(),
        }
    }

    /// Map a non-success response to an error
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            _ => ApiError::http(status, error_message(body)),
        }
    }
}

/// Pull a human-readable message out of an error body
///
/// Accepts `{ "message": .. }`, `{ "error": .. }` and the nested
/// `{ "error": { "message": .. } }` shape.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| value.pointer("/error/message").and_then(|m| m.as_str()))
        .or_else(|| value.get("error").and_then(|m| m.as_str()))?;
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized (401)"),
            ApiError::Forbidden => write!(f, "Forbidden (403) - insufficient permissions"),
            ApiError::NetworkError { message } => write!(f, "Network error - {}", message),
            ApiError::HttpError { status, message } => match message {
                Some(message) => write!(f, "HTTP {} - {}", status, message),
                None => write!(f, "HTTP {}", status),
            },
            ApiError::Decode { message } => write!(f, "Unreadable response - {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ApiError> for GatewayError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::HttpError {
                status,
                message: Some(message),
            } if (400..500).contains(&status) => GatewayError::rejected(message),
            ApiError::Unauthorized => GatewayError::transport("Not authenticated"),
            ApiError::Forbidden => GatewayError::transport("Not authorized"),
            // Server faults and bodies without a message fall back to the generic banner
            ApiError::HttpError { .. } | ApiError::NetworkError { .. } | ApiError::Decode { .. } => {
                GatewayError::silent()
            }
        }
    }
}
