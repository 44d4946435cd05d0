//! Unified error types for containerd-events

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for containerd-events
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The address could not be turned into a channel endpoint
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Transport-level errors while building the channel
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The streaming call could not be started
    #[error("Failed to initialize the RPC call: {0}")]
    InitializationFailed(String),

    /// A read failed before a normal end of stream
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(Box<tonic::Status>),

    /// The call finished with a non-OK status
    #[error("gRPC error: {0}")]
    Rpc(Box<tonic::Status>),

    /// The call was terminated before it completed on its own
    #[error("The request was aborted")]
    Aborted,

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protobuf payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new invalid address error
    pub fn invalid_address<S: Into<String>>(msg: S) -> Self {
        Error::InvalidAddress(msg.into())
    }

    /// Create a new initialization failure
    pub fn initialization_failed<S: Into<String>>(msg: S) -> Self {
        Error::InitializationFailed(msg.into())
    }

    /// Create a new stream interruption error
    pub fn stream_interrupted(status: tonic::Status) -> Self {
        Error::StreamInterrupted(Box::new(status))
    }

    /// Create a new gRPC status error
    pub fn rpc(status: tonic::Status) -> Self {
        Error::Rpc(Box::new(status))
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the call ended because termination was requested
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// gRPC status code carried by the error, if any
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            Error::StreamInterrupted(status) | Error::Rpc(status) => Some(status.code()),
            _ => None,
        }
    }
}

/// Convert Error to gRPC Status
impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Rpc(status) | Error::StreamInterrupted(status) => *status,
            Error::Aborted => tonic::Status::cancelled(err.to_string()),
            Error::InitializationFailed(_) => tonic::Status::unavailable(err.to_string()),
            Error::InvalidAddress(_) | Error::Configuration(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}
