use std::io;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PeerError {
    /// A call to the fleet membership provider failed
    #[error("Provider error during {operation}: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },

    #[error("No auto scaling group found")]
    NoGroupFound,

    #[error("Metadata service returned no instance id")]
    NoInstanceId,

    /// The transport reported a failure for one peer
    #[error("Request to peer {peer} failed: {message}")]
    PeerRequest { peer: String, message: String },

    /// The request could not be built or handed to the transport at all
    #[error("Request to peer {peer} could not be issued: {message}")]
    RequestNotIssued { peer: String, message: String },

    #[error("Peer {peer} has no usable address")]
    MissingAddress { peer: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("YAML error: {0}")]
    Yaml(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;

impl PeerError {
    pub fn provider(operation: &'static str, message: impl ToString) -> Self {
        PeerError::Provider {
            operation,
            message: message.to_string(),
        }
    }

    pub fn peer_request(peer: impl Into<String>, message: impl ToString) -> Self {
        PeerError::PeerRequest {
            peer: peer.into(),
            message: message.to_string(),
        }
    }

    pub fn not_issued(peer: impl Into<String>, message: impl ToString) -> Self {
        PeerError::RequestNotIssued {
            peer: peer.into(),
            message: message.to_string(),
        }
    }
}

impl From<&str> for PeerError {
    fn from(s: &str) -> Self {
        PeerError::Server(s.to_string())
    }
}

impl From<String> for PeerError {
    fn from(s: String) -> Self {
        PeerError::Server(s)
    }
}

impl From<io::Error> for PeerError {
    fn from(e: io::Error) -> Self {
        PeerError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PeerError {
    fn from(e: serde_json::Error) -> Self {
        PeerError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for PeerError {
    fn from(e: serde_yaml::Error) -> Self {
        PeerError::Yaml(e.to_string())
    }
}
