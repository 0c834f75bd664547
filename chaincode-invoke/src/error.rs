//! Error types for chaincode invocation

use crate::types::TxValidationCode;
use std::fmt;
use thiserror::Error;

/// Result type for invocation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Invocation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Proposal broadcast or commit could not be dispatched or completed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller-supplied request is unusable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// At least one endorsing peer did not return status 200
    #[error("Proposal rejected: {reason}")]
    ProposalRejected {
        /// Message of the last bad response
        reason: String,
    },

    /// Ordering service rejected the transaction
    #[error("Failed to order the transaction. Error code: {status}")]
    OrderingFailed {
        /// Orderer status detail
        status: String,
    },

    /// Ordering was acknowledged but the commit could not be confirmed
    #[error("Commit of transaction {tx_id} unconfirmed: {reason}")]
    CommitUnconfirmed {
        /// Transaction ID
        tx_id: String,
        /// Timeout or event stream failure
        reason: String,
    },

    /// Committing peers marked the transaction invalid
    #[error("Transaction {tx_id} invalidated at commit: {code}")]
    CommitInvalid {
        /// Transaction ID
        tx_id: String,
        /// Validation code
        code: TxValidationCode,
    },

    /// Read set invalidated by a concurrent write
    #[error("MVCC read conflict for transaction {tx_id}")]
    Conflict {
        /// Transaction ID
        tx_id: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Stable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Transport failure
    Transport,
    /// Invalid request
    InvalidRequest,
    /// Endorsement rejected
    ProposalRejected,
    /// Ordering rejected
    OrderingFailed,
    /// Commit not confirmed
    CommitUnconfirmed,
    /// Commit invalidated
    CommitInvalid,
    /// Optimistic-concurrency conflict
    MvccReadConflict,
    /// Configuration
    Config,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ProposalRejected => "PROPOSAL_REJECTED",
            ErrorCode::OrderingFailed => "ORDERING_FAILED",
            ErrorCode::CommitUnconfirmed => "COMMIT_UNCONFIRMED",
            ErrorCode::CommitInvalid => "COMMIT_INVALID",
            ErrorCode::MvccReadConflict => "MVCC_READ_CONFLICT",
            ErrorCode::Config => "CONFIG",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify the error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Transport(_) => ErrorCode::Transport,
            Error::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Error::ProposalRejected { .. } => ErrorCode::ProposalRejected,
            Error::OrderingFailed { .. } => ErrorCode::OrderingFailed,
            Error::CommitUnconfirmed { .. } => ErrorCode::CommitUnconfirmed,
            Error::CommitInvalid { .. } => ErrorCode::CommitInvalid,
            Error::Conflict { .. } => ErrorCode::MvccReadConflict,
            Error::Config(_) => ErrorCode::Config,
            Error::Metrics(_) | Error::Serialization(_) | Error::Io(_) | Error::Other(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Whether a fresh attempt may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        self.code() == ErrorCode::MvccReadConflict
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_is_retryable() {
        let conflict = Error::Conflict {
            tx_id: "abc".to_string(),
        };
        assert_eq!(conflict.code(), ErrorCode::MvccReadConflict);
        assert!(conflict.is_retryable());

        let rejected = Error::ProposalRejected {
            reason: "MVCC_READ_CONFLICT".to_string(),
        };
        assert!(!rejected.is_retryable());

        let unconfirmed = Error::CommitUnconfirmed {
            tx_id: "abc".to_string(),
            reason: "Timed out waiting for block event".to_string(),
        };
        assert!(!unconfirmed.is_retryable());
    }

    #[test]
    fn test_ordering_failed_message() {
        let err = Error::OrderingFailed {
            status: "BAD_REQUEST".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to order the transaction. Error code: BAD_REQUEST"
        );
    }
}
