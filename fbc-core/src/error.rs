//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias using FbcError
pub type Result<T> = std::result::Result<T, FbcError>;

/// Main error type for capture operations
#[derive(Debug, Error)]
pub enum FbcError {
    /// Capture backend call failed; carries the backend status code and
    /// the backend's last-error string
    #[error("Backend error (status {status}): {message}")]
    Backend { status: i32, message: String },

    /// Cross-API memory bridge error (export or import of GPU memory)
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// Render API error
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource acquisition error (library load, symbol resolution)
    #[error("Resource error: {0}")]
    Resource(String),

    /// Capture session not active
    #[error("No active capture session")]
    NoActiveSession,

    /// Session already open
    #[error("Capture session already open")]
    SessionAlreadyOpen,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FbcError>,
    },
}

impl FbcError {
    /// Create a backend error from a status code and message
    pub fn backend(status: i32, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Create a bridge error
    pub fn bridge(msg: impl Into<String>) -> Self {
        Self::Bridge(msg.into())
    }

    /// Create a render error
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resource error
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<libloading::Error> for FbcError {
    fn from(err: libloading::Error) -> Self {
        Self::Resource(err.to_string())
    }
}
