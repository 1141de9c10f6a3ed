use std::fmt;

/// Central error types for the sitesnap agent
#[derive(Debug)]
pub enum AppError {
    /// Database error (rusqlite)
    Database(rusqlite::Error),
    /// Filesystem error
    Filesystem(std::io::Error),
    /// Durable queue error
    Queue(photo_queue::QueueError),
    /// Delivery error from an immediate send
    Dispatch(photo_queue::DispatchError),
    /// Image processing error
    ImageProcessing(photo_queue::ThumbnailError),
    /// Validation error (e.g. invalid inputs)
    Validation(String),
    /// Resource not found
    NotFound(String),
    /// General error
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
            AppError::Queue(e) => write!(f, "Queue error: {}", e),
            AppError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
            AppError::ImageProcessing(e) => write!(f, "Image processing error: {}", e),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Conversions from other error types
impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e)
    }
}

impl From<photo_queue::QueueError> for AppError {
    fn from(e: photo_queue::QueueError) -> Self {
        AppError::Queue(e)
    }
}

impl From<photo_queue::DispatchError> for AppError {
    fn from(e: photo_queue::DispatchError) -> Self {
        AppError::Dispatch(e)
    }
}

impl From<photo_queue::ThumbnailError> for AppError {
    fn from(e: photo_queue::ThumbnailError) -> Self {
        AppError::ImageProcessing(e)
    }
}
