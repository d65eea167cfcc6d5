//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("stored book is malformed: {0}")]
    Core(#[from] bookshelf_core::CoreError),

    #[error("duplicate isbn rejected by unique index: {0}")]
    DuplicateIsbn(String),
}
