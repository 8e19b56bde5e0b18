//! Error types for the softphone core
//!
//! Errors are categorized to help with recovery strategies:
//!
//! - **Transport Errors** - Signaling client or session failures, usually recoverable with retry
//! - **Registration Errors** - The signaling layer refused or lost the registration
//! - **Call Errors** - The requested call is unknown or in the wrong state
//! - **Media Errors** - Capture or track replacement failures
//! - **Configuration Errors** - Invalid settings, can't recover without fixing config
//!
//! Most public call-control operations never return these errors: transport
//! failures are logged and surfaced as `None`/`false` so a UI stays responsive.
//! The errors surface from setup paths such as [`PhoneBuilder::build`] and the
//! conference room connection.
//!
//! [`PhoneBuilder::build`]: crate::phone::PhoneBuilder::build

use thiserror::Error;

use crate::call::CallId;

/// Result type for phone operations
pub type PhoneResult<T> = Result<T, PhoneError>;

/// Result type returned by transport collaborators
pub type TransportResult<T> = Result<T, TransportError>;

/// A failure reported by the signaling transport or one of its sessions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {reason}")]
pub struct TransportError {
    /// Transport operation that failed (e.g. "answer", "register")
    pub operation: String,
    /// Transport-provided reason
    pub reason: String,
}

impl TransportError {
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Comprehensive error type for phone and room operations
#[derive(Error, Debug, Clone)]
pub enum PhoneError {
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    #[error("No call session could be resolved for {operation}")]
    NoSession { operation: String },

    #[error("Call failed: {reason}")]
    CallFailed { reason: String },

    #[error("Media error: {details}")]
    MediaError { details: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Missing required configuration: {field}")]
    MissingConfiguration { field: String },

    #[error("Conference not found for extension {extension}")]
    ConferenceNotFound { extension: String },

    #[error("Room is not connected")]
    RoomNotConnected,

    #[error("External service error: {service} - {reason}")]
    ExternalServiceError { service: String, reason: String },

    #[error("Operation timeout after {duration_ms}ms")]
    OperationTimeout { duration_ms: u64 },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl PhoneError {
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed { reason: reason.into() }
    }

    pub fn call_failed(reason: impl Into<String>) -> Self {
        Self::CallFailed { reason: reason.into() }
    }

    pub fn external_service(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalServiceError {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Whether retrying the failed operation can reasonably succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            PhoneError::Transport(_)
            | PhoneError::OperationTimeout { .. }
            | PhoneError::ExternalServiceError { .. } => true,

            PhoneError::InvalidConfiguration { .. }
            | PhoneError::MissingConfiguration { .. }
            | PhoneError::ConferenceNotFound { .. } => false,

            _ => false,
        }
    }

    /// Coarse grouping used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            PhoneError::Transport(_) => "transport",

            PhoneError::RegistrationFailed { .. } => "registration",

            PhoneError::CallNotFound { .. }
            | PhoneError::NoSession { .. }
            | PhoneError::CallFailed { .. } => "call",

            PhoneError::MediaError { .. } => "media",

            PhoneError::InvalidConfiguration { .. } | PhoneError::MissingConfiguration { .. } => {
                "configuration"
            }

            PhoneError::ConferenceNotFound { .. } | PhoneError::RoomNotConnected => "room",

            PhoneError::ExternalServiceError { .. }
            | PhoneError::OperationTimeout { .. }
            | PhoneError::InternalError { .. } => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_recoverable() {
        let err: PhoneError = TransportError::new("register", "socket closed").into();
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "transport");
        assert_eq!(err.to_string(), "Transport failed: register failed: socket closed");
    }

    #[test]
    fn configuration_errors_are_final() {
        let err = PhoneError::InvalidConfiguration {
            field: "audio_output_volume".to_string(),
            reason: "must be within 0.0..=1.0".to_string(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "configuration");
    }
}
