//! Unified error system for the nilVM client
//!
//! Every fallible operation in the workspace returns [`NilError`]. Transport
//! failures are carried as a closed [`TransportError`] enumeration produced by
//! the transport layer, so recoverability is decided by matching on tags and
//! never by inspecting message text.

use crate::types::PartyId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status codes a node can answer an RPC with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcCode {
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl RpcCode {
    /// Codes that indicate a transient condition on the node or the path to it.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            RpcCode::DeadlineExceeded
                | RpcCode::ResourceExhausted
                | RpcCode::Unavailable
                | RpcCode::DataLoss
        )
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcCode::Canceled => "canceled",
            RpcCode::Unknown => "unknown",
            RpcCode::InvalidArgument => "invalid_argument",
            RpcCode::DeadlineExceeded => "deadline_exceeded",
            RpcCode::NotFound => "not_found",
            RpcCode::AlreadyExists => "already_exists",
            RpcCode::PermissionDenied => "permission_denied",
            RpcCode::ResourceExhausted => "resource_exhausted",
            RpcCode::FailedPrecondition => "failed_precondition",
            RpcCode::Aborted => "aborted",
            RpcCode::OutOfRange => "out_of_range",
            RpcCode::Unimplemented => "unimplemented",
            RpcCode::Internal => "internal",
            RpcCode::Unavailable => "unavailable",
            RpcCode::DataLoss => "data_loss",
            RpcCode::Unauthenticated => "unauthenticated",
        };
        f.write_str(name)
    }
}

/// Low-level failures raised below the RPC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFailure {
    /// Generic network error (reset, unreachable host, broken stream)
    Network,
    /// The request was aborted before a reply arrived
    Aborted,
    /// The transport gave up waiting
    Timeout,
    /// The node refused the connection
    ConnectionRefused,
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkFailure::Network => "network",
            NetworkFailure::Aborted => "aborted",
            NetworkFailure::Timeout => "timeout",
            NetworkFailure::ConnectionRefused => "connection_refused",
        };
        f.write_str(name)
    }
}

/// Failure reported by a node transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TransportError {
    /// The node answered with a non-OK status
    #[error("rpc failed with status {code}: {message}")]
    Status {
        /// Status code returned by the node
        code: RpcCode,
        /// Message attached to the status
        message: String,
    },

    /// The call never produced a status
    #[error("network failure ({kind}): {message}")]
    Network {
        /// Kind of network failure
        kind: NetworkFailure,
        /// Description from the underlying transport
        message: String,
    },
}

impl TransportError {
    /// Create a status error
    pub fn status(code: RpcCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(kind: NetworkFailure, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Status code, if the node answered at all
    pub fn code(&self) -> Option<RpcCode> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Network { .. } => None,
        }
    }

    /// Message attached to the failure
    pub fn message(&self) -> &str {
        match self {
            Self::Status { message, .. } | Self::Network { message, .. } => message,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Every low-level network failure is transient; status failures are
    /// transient only for the codes listed in [`RpcCode::is_transient`].
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Status { code, .. } => code.is_transient(),
            Self::Network { .. } => true,
        }
    }
}

/// Unified error type for all client operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum NilError {
    /// Caller supplied parameters failed validation
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// A node call failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A share was addressed to a party that is not part of the cluster
    #[error("Failed to match share party {party} with a known node")]
    UnmatchedParty {
        /// Party identifier carried by the share
        party: PartyId,
    },

    /// Nodes returned different results for the same operation
    #[error("Nodes disagree on the result: {message}")]
    Disagreement {
        /// Description of the differing results
        message: String,
    },

    /// No node produced a result
    #[error("Cannot collapse an empty result set")]
    EmptyResult,

    /// The leader's quote does not correspond to the request
    #[error("Quote mismatch: {message}")]
    QuoteMismatch {
        /// What did not match
        message: String,
    },

    /// The leader rejected the payment for lack of funds
    #[error("Insufficient balance: {message}")]
    InsufficientBalance {
        /// Message returned by the leader
        message: String,
    },

    /// Payment chain interaction failed
    #[error("Chain error: {message}")]
    Chain {
        /// Error message from the chain client
        message: String,
    },

    /// The masking capability failed
    #[error("Masking error: {message}")]
    Masking {
        /// Error message from the masker
        message: String,
    },

    /// A node reported a failed computation
    #[error("Compute error: {message}")]
    Compute {
        /// Error message reported by the node
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl NilError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a disagreement error
    pub fn disagreement(message: impl Into<String>) -> Self {
        Self::Disagreement {
            message: message.into(),
        }
    }

    /// Create a quote mismatch error
    pub fn quote_mismatch(message: impl Into<String>) -> Self {
        Self::QuoteMismatch {
            message: message.into(),
        }
    }

    /// Create an insufficient balance error
    pub fn insufficient_balance(message: impl Into<String>) -> Self {
        Self::InsufficientBalance {
            message: message.into(),
        }
    }

    /// Create a chain error
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Create a masking error
    pub fn masking(message: impl Into<String>) -> Self {
        Self::Masking {
            message: message.into(),
        }
    }

    /// Create a compute error
    pub fn compute(message: impl Into<String>) -> Self {
        Self::Compute {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the retry engine may attempt the failed unit of work again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_recoverable(),
            _ => false,
        }
    }

    /// The transport failure behind this error, if any
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Standard Result type for client operations
pub type Result<T> = std::result::Result<T, NilError>;

impl From<bincode::Error> for NilError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<serde_json::Error> for NilError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<uuid::Error> for NilError {
    fn from(err: uuid::Error) -> Self {
        Self::invalid(format!("malformed uuid: {err}"))
    }
}

impl From<std::io::Error> for NilError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::InvalidInput => {
                Self::invalid(err.to_string())
            }
            _ => Self::internal(err.to_string()),
        }
    }
}
