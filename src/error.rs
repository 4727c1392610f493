//! Error types for quarry
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for quarry
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors (always raised, never catalogued)
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidArgument { field: String, message: String },

    // ============================================================================
    // Per-Row Data Errors (catalogued when errors=Catalog)
    // ============================================================================
    #[error("API error: {message}")]
    Api { message: String },

    #[error("Item '{id}' not found")]
    ItemNotFound { id: String },

    #[error("Formula compile failed: {message}")]
    FormulaCompile { message: String },

    #[error("Type mismatch in column \"{column}\": {message}")]
    TypeMismatch { column: String, message: String },

    // ============================================================================
    // Pagination Integrity Errors (fatal for the row regardless of errors policy)
    // ============================================================================
    #[error(
        "Too much data: found too many capsules with same start time. Increase \
         pull_page_size.\ncapsule count: {count}\nstart: {start}\nend: {end}"
    )]
    TooMuchData { count: usize, start: i64, end: i64 },

    #[error(
        "Server returned a page with no timestamps while more data was expected. \
         pull_page_size may be set to 1; try a higher value.\nformula: {formula}\n\
         parameters: {parameters:?}\nstart: {start}\nend: {end}"
    )]
    EmptyPage {
        formula: String,
        parameters: Vec<String>,
        start: i64,
        end: i64,
    },

    // ============================================================================
    // Cancellation (always fatal to the entire call, bypasses catalog)
    // ============================================================================
    #[error("Operation interrupted")]
    Interrupted,

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Data Processing Errors
    // ============================================================================
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an API error
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create an item-not-found error
    pub fn item_not_found(id: impl Into<String>) -> Self {
        Self::ItemNotFound { id: id.into() }
    }

    /// Create a formula compile error
    pub fn formula_compile(message: impl Into<String>) -> Self {
        Self::FormulaCompile {
            message: message.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Configuration errors indicate a call the system cannot attempt and
    /// are never recovered into the status ledger.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::InvalidArgument { .. })
    }

    /// Pagination integrity errors are fatal for their row but must not stop
    /// the other rows, even when errors=Raise.
    pub fn is_pagination_integrity(&self) -> bool {
        matches!(self, Error::TooMuchData { .. } | Error::EmptyPage { .. })
    }

    /// Check if this error is retryable at the HTTP layer
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for quarry
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::item_not_found("F8543");
        assert_eq!(err.to_string(), "Item 'F8543' not found");

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::config("x").is_config());
        assert!(!Error::api("x").is_config());

        assert!(Error::TooMuchData {
            count: 1000,
            start: 0,
            end: 10
        }
        .is_pagination_integrity());
        assert!(Error::EmptyPage {
            formula: "$signal".into(),
            parameters: vec![],
            start: 0,
            end: 10
        }
        .is_pagination_integrity());
        assert!(!Error::Interrupted.is_pagination_integrity());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited {
            retry_after_seconds: 60
        }
        .is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::http_status(500, "").is_retryable());
        assert!(!Error::http_status(400, "").is_retryable());
        assert!(!Error::config("test").is_retryable());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
