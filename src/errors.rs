use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for the swift-mobility core
#[derive(Debug)]
pub enum SwiftError {
    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    BackendRejected { status: u16, message: String },
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Local persistence errors
    StorageRead(String),
    StorageWrite(String),

    // Business logic errors
    BookingNotFound(String),
    UnlockRequestNotFound(String),
    VehicleNotFound(String),
    StationNotFound(String),
    ActiveBookingConflict(String),
    InvalidBookingStatus { booking_id: String, status: String, expected: String },
    UnlockNotConfirmed(String),
    GeolocationUnavailable(String),

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration and setup errors
    ConfigurationError(String),
    MissingEnvironmentVariable(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for SwiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwiftError::NetworkTimeout => write!(f, "Network request timed out"),
            SwiftError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            SwiftError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            SwiftError::BackendRejected { status, message } => {
                write!(f, "Backend rejected request ({}): {}", status, message)
            }
            SwiftError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            SwiftError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            SwiftError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            SwiftError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            SwiftError::StorageRead(msg) => write!(f, "Local storage read error: {}", msg),
            SwiftError::StorageWrite(msg) => write!(f, "Local storage write error: {}", msg),

            SwiftError::BookingNotFound(id) => write!(f, "Booking not found: {}", id),
            SwiftError::UnlockRequestNotFound(id) => write!(f, "Unlock request not found: {}", id),
            SwiftError::VehicleNotFound(id) => write!(f, "Vehicle not found: {}", id),
            SwiftError::StationNotFound(id) => write!(f, "Station not found: {}", id),
            SwiftError::ActiveBookingConflict(id) => {
                write!(f, "Another booking is already active: {}", id)
            }
            SwiftError::InvalidBookingStatus { booking_id, status, expected } => {
                write!(f, "Booking {} is '{}', expected '{}'", booking_id, status, expected)
            }
            SwiftError::UnlockNotConfirmed(id) => {
                write!(f, "Unlock request {} has not been confirmed", id)
            }
            SwiftError::GeolocationUnavailable(msg) => {
                write!(f, "Geolocation unavailable: {}", msg)
            }

            SwiftError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            SwiftError::MissingRequiredField(field) => write!(f, "Missing required field: {}", field),
            SwiftError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            SwiftError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            SwiftError::MissingEnvironmentVariable(var) => {
                write!(f, "Missing environment variable: {}", var)
            }
        }
    }
}

impl std::error::Error for SwiftError {}

// Convenience type alias for Results
pub type SwiftResult<T> = Result<T, SwiftError>;

// Conversion implementations for common error types
impl From<reqwest::Error> for SwiftError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SwiftError::NetworkTimeout
        } else if err.is_connect() {
            SwiftError::NetworkConnection(err.to_string())
        } else {
            SwiftError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SwiftError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            SwiftError::JsonParsing(err.to_string())
        } else {
            SwiftError::JsonSerialization(err.to_string())
        }
    }
}

impl From<uuid::Error> for SwiftError {
    fn from(err: uuid::Error) -> Self {
        SwiftError::InvalidFormat(format!("Invalid UUID: {}", err))
    }
}

impl From<chrono::ParseError> for SwiftError {
    fn from(err: chrono::ParseError) -> Self {
        SwiftError::InvalidFormat(format!("Invalid date/time format: {}", err))
    }
}

impl SwiftError {
    /// True for failures worth retrying once connectivity returns.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SwiftError::NetworkTimeout
                | SwiftError::NetworkConnection(_)
                | SwiftError::HttpClient(_)
                | SwiftError::BackendRejected { status: 500..=599, .. }
        )
    }
}

// Helper functions for creating common errors
impl SwiftError {
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        SwiftError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn booking_not_found(booking_id: impl Into<String>) -> Self {
        SwiftError::BookingNotFound(booking_id.into())
    }

    pub fn unlock_request_not_found(request_id: impl Into<String>) -> Self {
        SwiftError::UnlockRequestNotFound(request_id.into())
    }

    pub fn storage_write(msg: impl Into<String>) -> Self {
        SwiftError::StorageWrite(msg.into())
    }

    pub fn invalid_status(
        booking_id: impl Into<String>,
        status: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        SwiftError::InvalidBookingStatus {
            booking_id: booking_id.into(),
            status: status.into(),
            expected: expected.into(),
        }
    }
}
