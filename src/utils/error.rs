//! Error Handling Module
//!
//! Defines the error type shared by model construction, configuration and
//! the preview tooling. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for custom CNN operations
#[derive(Error, Debug)]
pub enum CnnError {
    /// Invalid model or layer configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A layer would produce an empty or otherwise impossible output shape
    #[error("Shape error: {0}")]
    Shape(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error loading, converting or saving an image
    #[error("Image error at '{0}': {1}")]
    Image(PathBuf, String),

    /// Tensor data could not be read back from the backend
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience Result type for custom CNN operations
pub type Result<T> = std::result::Result<T, CnnError>;
