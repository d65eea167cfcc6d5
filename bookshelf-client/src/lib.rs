//! # bookshelf-client
//!
//! Client library for bookshelf.
//!
//! This crate provides:
//! - Async TCP connection with request/response correlation
//! - High-level API for the book operations
//! - `BookStream` for consuming LIST_BOOKS lazily

pub mod client;
pub mod connection;
pub mod error;

pub use client::{BookStream, Client};
pub use connection::{Connection, ConnectionConfig, StreamMessage};
pub use error::ClientError;
