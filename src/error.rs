//! Custom error types for the application.
//!
//! Each concern owns a small `thiserror` enum, and `ScopeError` consolidates them
//! for callers that only want one error type:
//!
//! - **`RecordError`**: a structured record does not satisfy the `"Time"` + channel
//!   field contract, or one of its numeric payloads cannot be read as a sample value.
//! - **`StoreError`**: store-level rejections. Egress for a channel that was never
//!   ingressed is `UnknownChannel`; it is counted as a drop, never fatal.
//! - **`ListenerError`**: socket bind/listen/accept/read/write failures. These are the
//!   only errors allowed to end an ingestion run. `is_retryable()` tells the owner
//!   whether binding again is worth trying.
//!
//! By using `#[from]`, `ScopeError` can be created from any of the above with `?`.

use std::net::SocketAddr;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ScopeError>;

/// A structured record was rejected by the decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    #[error("Record has no \"Time\" field")]
    MissingTime,

    #[error("Record has no channel field")]
    MissingChannel,

    #[error("Record has more than one channel field candidate: {0:?}")]
    AmbiguousChannel(Vec<String>),

    #[error("Field '{field}' is not a sample value: {reason}")]
    InvalidNumber { field: String, reason: String },

    #[error("Record is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Store-level rejections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Channel '{0}' does not exist in store")]
    UnknownChannel(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),
}

/// Connection-level failures of the ingestion listener.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("No client connected within {0} ms")]
    AcceptTimeout(u64),

    #[error("Read from {peer} failed: {source}")]
    Read {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Write to {peer} failed: {source}")]
    Write {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start listener runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Listener thread panicked")]
    ThreadPanicked,
}

impl ListenerError {
    /// Whether the owner may retry binding and serving after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ListenerError::Bind { .. }
                | ListenerError::Listen { .. }
                | ListenerError::Accept(_)
                | ListenerError::AcceptTimeout(_)
        )
    }
}

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Connection error: {0}")]
    Connection(#[from] ListenerError),
}

impl From<figment::Error> for ScopeError {
    fn from(value: figment::Error) -> Self {
        ScopeError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_accept_failures_are_retryable() {
        let addr: SocketAddr = "127.0.0.1:8888".parse().unwrap();
        let bind = ListenerError::Bind {
            addr,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_retryable());
        assert!(ListenerError::AcceptTimeout(100).is_retryable());
    }

    #[test]
    fn read_failures_are_terminal() {
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let read = ListenerError::Read {
            peer,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionReset),
        };
        assert!(!read.is_retryable());
        assert!(!ListenerError::ThreadPanicked.is_retryable());
    }

    #[test]
    fn record_error_converts_into_store_error() {
        let err: StoreError = RecordError::MissingTime.into();
        assert_eq!(err, StoreError::MalformedRecord(RecordError::MissingTime));
        assert!(err.to_string().contains("Time"));
    }
}
