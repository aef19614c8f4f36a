//! Unified error types for the reader core.

use std::fmt;

/// Application-specific errors.
#[derive(Debug)]
pub enum AppError {
    /// Error opening, decoding or resizing a page image
    ImageLoad(String),
    /// Error scanning a directory for page images
    DirectoryScan(String),
    /// Error reading or parsing the reader configuration
    Config(String),
    /// Error handing reading progress to the persistence collaborator
    Progress(String),
    /// Error starting or joining the preload worker thread
    Worker(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ImageLoad(msg) => write!(f, "Image load error: {}", msg),
            AppError::DirectoryScan(msg) => write!(f, "Directory scan error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Progress(msg) => write!(f, "Progress save error: {}", msg),
            AppError::Worker(msg) => write!(f, "Preload worker error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::ImageLoad(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::DirectoryScan(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Type alias for Results in this crate.
pub type Result<T> = std::result::Result<T, AppError>;
