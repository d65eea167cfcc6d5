//! # bookshelf-server
//!
//! TCP server for bookshelf.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Protocol framing and message dispatch
//! - Session management
//! - The book service and its command handlers
//! - Layered configuration (defaults, YAML file, environment)

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod service;
pub mod session;

pub use config::{Config, ConfigError, DatabaseConfig, NetworkConfig, StorageBackend};
pub use error::ServerError;
pub use handler::CommandHandler;
pub use server::{Server, ServerConfig};
pub use service::BookService;
pub use session::Session;
