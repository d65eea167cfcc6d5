//! Server error types.

use bookshelf_protocol::ErrorCode;
use bookshelf_storage::StorageError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] bookshelf_protocol::ProtocolError),

    #[error("invalid book: {0}")]
    Core(#[from] bookshelf_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocol(u16),

    #[error("book not found: {0}")]
    BookNotFound(String),

    #[error("book already exists: {0}")]
    BookExists(String),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Converts to protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Io(_) => ErrorCode::InternalError,
            ServerError::Protocol(_) => ErrorCode::BadRequest,
            ServerError::Core(_) => ErrorCode::BadRequest,
            ServerError::Storage(StorageError::DuplicateIsbn(_)) => ErrorCode::AlreadyExists,
            ServerError::Storage(_) => ErrorCode::Unavailable,
            ServerError::Json(_) => ErrorCode::BadRequest,
            ServerError::InvalidRequest(_) => ErrorCode::BadRequest,
            ServerError::UnsupportedProtocol(_) => ErrorCode::UnsupportedProtocol,
            ServerError::BookNotFound(_) => ErrorCode::NotFound,
            ServerError::BookExists(_) => ErrorCode::AlreadyExists,
            ServerError::ShuttingDown => ErrorCode::Unavailable,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }
}
