//! Error types for the epsilon renderer.

use thiserror::Error;

/// Main error type for renderer operations.
///
/// Every variant is fatal at the point of detection; nothing in the core
/// retries.
#[derive(Error, Debug)]
pub enum Error {
    /// No compute adapter matched the requested device
    #[error("No compute device available: {0}")]
    NoAdapter(String),

    /// Device context could not be created
    #[error("Failed to initialize context: {0}")]
    Context(String),

    /// Command queue could not be created
    #[error("Failed to initialize command queue: {0}")]
    Queue(String),

    /// Buffer or image allocation failed
    #[error("Failed to allocate memory object <{label}>: {reason}")]
    Memory { label: String, reason: String },

    /// Program object could not be created
    #[error("Failed to initialize program: {0}")]
    Program(String),

    /// Program failed to compile; the compiler log is attached
    #[error("Failed to build program:\n{log}")]
    Build { log: String },

    /// Entry point could not be created from a built program
    #[error("Failed to initialize kernel '{entry}': {reason}")]
    Kernel { entry: String, reason: String },

    /// Device capabilities could not be queried
    #[error("Failed to query device: {0}")]
    DeviceQuery(String),

    /// Argument slot binding rejected by the backend
    #[error("Failed to bind argument slot {slot}: {reason}")]
    Bind { slot: u32, reason: String },

    /// Host/device transfer failed
    #[error("Transfer failed on <{label}>: {reason}")]
    Transfer { label: String, reason: String },

    /// Device reported a failure while running queued work
    #[error("Device execution error: {0}")]
    Device(String),

    /// Kernel dispatch or the end-of-pass wait failed
    #[error("Kernel execution failed during pass {pass}: {reason}")]
    Dispatch { pass: usize, reason: String },

    /// Render torn down before its last pass; no output was written
    #[error("Render stopped after {completed} of {passes} passes")]
    Incomplete { completed: usize, passes: usize },

    /// Scene resource missing or unreadable
    #[error("Scene resource '{id}' unavailable: {source}")]
    SceneResource {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// Scene resource readable but malformed
    #[error("Invalid scene data: {0}")]
    InvalidScene(String),

    /// Invalid render configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Output image encoding failed
    #[error("Image output failed: {0}")]
    Image(#[from] image::ImageError),

    /// JSON parse error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a memory allocation error.
    pub fn memory(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Memory {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Create a bind error.
    pub fn bind(slot: u32, reason: impl Into<String>) -> Self {
        Self::Bind {
            slot,
            reason: reason.into(),
        }
    }

    /// Create a transfer error.
    pub fn transfer(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid scene error.
    pub fn invalid_scene(msg: impl Into<String>) -> Self {
        Self::InvalidScene(msg.into())
    }
}

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, Error>;
