//! # bookshelf-storage
//!
//! Storage layer for bookshelf.
//!
//! This crate provides:
//! - The `BookCollection` abstraction over a single book collection
//! - `BookCursor`, a scoped lazy stream over every stored book
//! - A MongoDB backend and an in-memory backend

pub mod collection;
pub mod error;
pub mod memory;
pub mod mongo;

pub use collection::{BookCollection, BookCursor};
pub use error::StorageError;
pub use memory::MemoryCollection;
pub use mongo::{MongoCollection, MongoConfig};
