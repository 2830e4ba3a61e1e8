//! Error types and HTTP response conversion

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::response::Response;

/// Result type alias using the framework error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the framework
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No route matched the request
    #[error("Not found: {0}")]
    NotFound(String),

    /// A route exists for the path under a different method
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Schema validation rejected the request
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body was malformed, oversized, or of an incompatible type
    #[error("Body parse error: {0}")]
    BodyParse(String),

    /// A store type was accessed before being registered with the application
    #[error("Store not registered: {0}")]
    StoreNotRegistered(&'static str),

    /// Route registration conflict (startup failure)
    #[error("Duplicate route: {method} {path}")]
    DuplicatePath {
        /// HTTP method of the conflicting registration
        method: Method,
        /// Path of the conflicting registration
        path: String,
    },

    /// Route registered with a method outside the supported set (startup failure)
    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),

    /// Invalid route pattern (startup failure)
    #[error("Invalid route pattern '{path}': {reason}")]
    InvalidPattern {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Plugin dependency resolution failed: missing required dep, cycle, or conflict
    #[error("Plugin resolution failed: {0}")]
    PluginResolution(String),

    /// A plugin lifecycle phase failed (startup failure)
    #[error("Plugin '{name}' failed during {phase}: {message}")]
    PluginLifecycle {
        /// Plugin name
        name: String,
        /// Phase that failed
        phase: &'static str,
        /// Failure detail
        message: String,
    },

    /// A shutdown hook exceeded its timeout (logged; shutdown continues)
    #[error("Shutdown hook '{name}' timed out after {timeout:?}")]
    HookTimeout {
        /// Hook name
        name: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Emitted while the server is draining
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Unhandled failure from user code
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Intentional response sentinel: a handler or hook chose this exact
    /// response as its error outcome; it is sent as-is without double-logging.
    #[error("intentional response ({})", .0.status)]
    Response(Box<Response>),
}

impl Error {
    /// The HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Validation(_) | Self::BodyParse(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Response(response) => response.status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error category
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::BodyParse(_) => "BODY_PARSE_ERROR",
            Self::StoreNotRegistered(_) => "STORE_NOT_REGISTERED",
            Self::DuplicatePath { .. } => "DUPLICATE_PATH",
            Self::UnknownMethod(_) => "UNKNOWN_METHOD",
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
            Self::PluginResolution(_) => "PLUGIN_RESOLUTION",
            Self::PluginLifecycle { .. } => "PLUGIN_LIFECYCLE",
            Self::HookTimeout { .. } => "HOOK_TIMEOUT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Response(_) => "RESPONSE",
        }
    }

    /// Whether this error aborts startup rather than a single request
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::DuplicatePath { .. }
                | Self::UnknownMethod(_)
                | Self::InvalidPattern { .. }
                | Self::PluginResolution(_)
                | Self::PluginLifecycle { .. }
        )
    }

    /// Convert into the user-visible response
    ///
    /// `expose_detail` includes the full error message in the body; it is
    /// false in production so 500s carry only a generic message.
    pub fn into_response(self, expose_detail: bool) -> Response {
        if let Self::Response(response) = self {
            return *response;
        }
        self.to_response(expose_detail)
    }

    /// Build the user-visible response without consuming the error
    ///
    /// The intentional-response sentinel cannot be moved out of a borrow;
    /// callers handle [`Error::Response`] before reaching this point, and a
    /// stray sentinel degrades to its status with a generic body.
    pub fn to_response(&self, expose_detail: bool) -> Response {
        let status = self.status();
        let message = match self {
            Self::NotFound(path) => format!("Route not found: {}", path),
            Self::MethodNotAllowed(path) => format!("Method not allowed: {}", path),
            Self::Validation(msg) | Self::BodyParse(msg) => msg.clone(),
            Self::StoreNotRegistered(name) => {
                format!("Store '{}' was never registered with the application", name)
            }
            Self::ServiceUnavailable => "Server is shutting down".to_string(),
            other if expose_detail => other.to_string(),
            _ => "Internal server error".to_string(),
        };
        Response::json(status, &ErrorResponse::with_code(status, self.code(), message))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    /// Create error response with a code
    pub fn with_code(
        status: StatusCode,
        code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}
