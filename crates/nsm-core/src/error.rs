//! Error types for the mesh chain elements
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for chain element operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the mesh chain elements
#[derive(Error, Debug)]
pub enum Error {
    /// Failure reported by a network service chain element
    #[error("Network service error: {0}")]
    NetworkService(String),

    /// Failure reported by an endpoint registry element
    #[error("Registry error: {0}")]
    Registry(String),

    /// A monitor stream rejected an event
    #[error("Monitor stream error: {0}")]
    Stream(String),

    /// The serialized executor is no longer accepting work
    #[error("Executor closed")]
    ExecutorClosed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (config files, rendered output)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a network service error
    pub fn network_service(msg: impl Into<String>) -> Self {
        Self::NetworkService(msg.into())
    }

    /// Create a registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a monitor stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
