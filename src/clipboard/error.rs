//! Selection Sync Error Types
//!
//! Error taxonomy for the synchronization engine. Only transport-level
//! failures are fatal; everything else is logged and swallowed by the
//! dispatcher so that a misbehaving peer can never take the daemon down.

use crate::clipboard::service::Window;
use thiserror::Error;

/// Result type for selection sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Selection sync error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connection to the selection service is gone for good
    #[error("Selection service connection lost: {0}")]
    ConnectionFatal(String),

    /// Malformed or unexpected notification
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Another client holds the selection after claim + verify
    #[error("Ownership claim on {selection} failed (current owner: {owner:?})")]
    OwnershipClaimFailed {
        /// Selection name
        selection: String,
        /// Owner observed after the claim, if any
        owner: Option<Window>,
    },

    /// Conversion produced zero bytes or an absent property
    #[error("No data available from {0}")]
    DataUnavailable(String),

    /// A configured name could not be resolved by the service
    #[error("Could not resolve name: {0}")]
    UnresolvedName(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Data size exceeds limit
    #[error("Data size {0} exceeds maximum allowed {1}")]
    DataSizeExceeded(usize, usize),

    /// Non-fatal error reported by the selection service
    #[error("Selection service error: {0}")]
    Service(String),
}

impl SyncError {
    /// Whether this error must terminate the event loop
    pub fn is_fatal(&self) -> bool {
        recovery_action(self) == RecoveryAction::Fail
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Transport lost
    Connection,
    /// Peer sent something we did not expect
    Protocol,
    /// Lost an ownership race
    Ownership,
    /// Nothing (or too much) to synchronize
    Data,
    /// Startup configuration problems
    Configuration,
    /// Service reported a recoverable error
    Service,
}

/// Classify error for recovery strategy selection
pub fn classify_error(error: &SyncError) -> ErrorType {
    match error {
        SyncError::ConnectionFatal(_) => ErrorType::Connection,
        SyncError::ProtocolViolation(_) => ErrorType::Protocol,
        SyncError::OwnershipClaimFailed { .. } => ErrorType::Ownership,
        SyncError::DataUnavailable(_) | SyncError::DataSizeExceeded(_, _) => ErrorType::Data,
        SyncError::UnresolvedName(_) | SyncError::InvalidConfig(_) => ErrorType::Configuration,
        SyncError::Service(_) => ErrorType::Service,
    }
}

/// Recovery action to take after error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Abandon this sync cycle / request and keep running
    Skip,
    /// Propagate the error and stop
    Fail,
}

/// Determine recovery action for error
///
/// Configuration errors only occur during startup, where they are fatal.
pub fn recovery_action(error: &SyncError) -> RecoveryAction {
    match classify_error(error) {
        ErrorType::Connection | ErrorType::Configuration => RecoveryAction::Fail,
        ErrorType::Protocol | ErrorType::Ownership | ErrorType::Data | ErrorType::Service => {
            RecoveryAction::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let error = SyncError::ConnectionFatal("broken pipe".to_string());
        assert_eq!(classify_error(&error), ErrorType::Connection);

        let error = SyncError::OwnershipClaimFailed {
            selection: "CLIPBOARD".to_string(),
            owner: Some(0x400001),
        };
        assert_eq!(classify_error(&error), ErrorType::Ownership);

        let error = SyncError::DataUnavailable("PRIMARY".to_string());
        assert_eq!(classify_error(&error), ErrorType::Data);

        let error = SyncError::DataSizeExceeded(20, 10);
        assert_eq!(classify_error(&error), ErrorType::Data);

        let error = SyncError::UnresolvedName("CLIPBOARD".to_string());
        assert_eq!(classify_error(&error), ErrorType::Configuration);
    }

    #[test]
    fn test_only_transport_and_startup_errors_are_fatal() {
        assert!(SyncError::ConnectionFatal("eof".into()).is_fatal());
        assert!(SyncError::InvalidConfig("same selection twice".into()).is_fatal());

        assert!(!SyncError::ProtocolViolation("stray notify".into()).is_fatal());
        assert!(!SyncError::DataUnavailable("PRIMARY".into()).is_fatal());
        assert!(!SyncError::Service("BadWindow".into()).is_fatal());
        assert!(!SyncError::OwnershipClaimFailed {
            selection: "CLIPBOARD".into(),
            owner: None,
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let error = SyncError::OwnershipClaimFailed {
            selection: "CLIPBOARD".to_string(),
            owner: Some(42),
        };
        assert_eq!(
            error.to_string(),
            "Ownership claim on CLIPBOARD failed (current owner: Some(42))"
        );
    }
}
