//! Error types and handling for Chargeguard
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Chargeguard operations
pub type Result<T> = std::result::Result<T, ChargeGuardError>;

/// Main error type for Chargeguard
#[derive(Debug, Error)]
pub enum ChargeGuardError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// OAuth token acquisition/refresh errors
    #[error("Token error: {message}")]
    Token { message: String },

    /// Charger API errors (status probe, stop command, malformed payload)
    #[error("Charger error: {message}")]
    Charger { message: String },

    /// Vehicle telematics API errors
    #[error("Vehicle error: {message}")]
    Vehicle { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },
}

impl ChargeGuardError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Config {
            message: message.into(),
        }
    }

    /// Create a new token error
    pub fn token<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Token {
            message: message.into(),
        }
    }

    /// Create a new charger error
    pub fn charger<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Charger {
            message: message.into(),
        }
    }

    /// Create a new vehicle error
    pub fn vehicle<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Vehicle {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Network {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ChargeGuardError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ChargeGuardError::Timeout {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ChargeGuardError {
    fn from(err: std::io::Error) -> Self {
        ChargeGuardError::io(err.to_string())
    }
}

impl From<serde_json::Error> for ChargeGuardError {
    fn from(err: serde_json::Error) -> Self {
        ChargeGuardError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChargeGuardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChargeGuardError::timeout(err.to_string())
        } else {
            ChargeGuardError::network(err.to_string())
        }
    }
}
