//! # bookshelf-core
//!
//! Book domain model for bookshelf.
//!
//! This crate provides:
//! - The `Book` record shared by the server, storage and client layers
//! - The entity mapper between wire messages, books and stored documents
//! - The sample catalogue seeded into an empty collection

pub mod book;
pub mod error;
pub mod mapper;
pub mod sample;

pub use book::Book;
pub use error::CoreError;
pub use mapper::{isbn_filter, FIELD_AUTHOR, FIELD_ISBN, FIELD_TITLE};
pub use sample::sample_books;
