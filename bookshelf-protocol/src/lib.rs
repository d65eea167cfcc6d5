//! # bookshelf-protocol
//!
//! Wire protocol implementation for bookshelf (BKRP - bookshelf RPC).
//!
//! This crate provides:
//! - Binary framing with length prefix and CRC32C validation
//! - JSON message serialization/deserialization
//! - Request/Response envelope types and stream items for LIST_BOOKS
//! - Error codes and protocol constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder, Message};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{Frame, FrameFlags, FRAME_HEADER_SIZE, MAGIC};
pub use message::{
    BookMessage, Operation, Request, Response, ResponseError, ResponseMeta, ResponseStatus,
    StreamItem,
};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for the bookshelf server.
pub const DEFAULT_PORT: u16 = 8082;

/// Maximum frame payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
