//! Error types for gitlab-shell

use thiserror::Error;

use crate::pktline::PktLineError;

/// Main error type for gitlab-shell
#[derive(Debug, Error)]
pub enum ShellError {
    /// Wrong number of process arguments for a Gitaly handler
    #[error("expected 2 arguments (gitaly address, request JSON), got {0}")]
    ArgumentCount(usize),

    /// No Gitaly address was provided
    #[error("no gitaly address given")]
    EmptyAddress,

    /// The Gitaly address could not be used to build a connection
    #[error("invalid gitaly address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// gRPC transport failure (connection setup, TLS, etc.)
    #[error("gitaly transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The backend call ended with a non-OK gRPC status
    #[error("gitaly call failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// The call was cancelled before the backend finished
    #[error("gitaly call cancelled")]
    Cancelled,

    /// The internal API rejected the request or returned an error
    #[error("{0}")]
    Api(String),

    /// The internal API answered with a body we could not decode
    #[error("Parsing failed")]
    Parsing,

    /// HTTP-level failure talking to the internal API
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The internal API denied access to the repository
    #[error("{0}")]
    AccessDenied(String),

    /// The SSH command is not one we serve
    #[error("Disallowed command")]
    DisallowedCommand,

    /// Neither a key id nor a username identified the caller
    #[error("who='' is invalid")]
    InvalidWho,

    /// Repository path failed validation
    #[error("Wrong repository path: {0}")]
    InvalidRepoPath(String),

    /// Malformed pkt-line stream
    #[error("pkt-line error: {0}")]
    PktLine(#[from] PktLineError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request payload could not be decoded
    #[error("invalid request JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ShellError
pub type Result<T> = std::result::Result<T, ShellError>;

impl ShellError {
    /// Create an internal API error from a message
    pub fn api(msg: impl Into<String>) -> Self {
        ShellError::Api(msg.into())
    }

    /// Create an HTTP error from a message
    pub fn http(msg: impl Into<String>) -> Self {
        ShellError::Http(msg.into())
    }

    /// Create a config error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        ShellError::Config(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        ShellError::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}
