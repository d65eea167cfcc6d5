//! JSON message types for BKRP requests, responses and stream items.

use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// BKRP operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    // Session management
    Hello,
    Ping,
    Bye,

    // Book catalogue
    AddBook,
    GetBook,
    UpdateBook,
    DeleteBook,
    ListBooks,
}

impl Operation {
    /// Returns the wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Hello => "HELLO",
            Operation::Ping => "PING",
            Operation::Bye => "BYE",
            Operation::AddBook => "ADD_BOOK",
            Operation::GetBook => "GET_BOOK",
            Operation::UpdateBook => "UPDATE_BOOK",
            Operation::DeleteBook => "DELETE_BOOK",
            Operation::ListBooks => "LIST_BOOKS",
        }
    }

    /// Returns whether the reply to this operation is a stream of items.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Operation::ListBooks)
    }
}

/// Request message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Message type, always "request".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Unique request ID for correlation.
    pub id: String,

    /// Operation to perform.
    pub op: Operation,

    /// Operation-specific parameters.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<String>, op: Operation) -> Self {
        Self {
            msg_type: "request".to_string(),
            id: id.into(),
            op,
            params: Value::Object(Default::default()),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Whether this error is retryable.
    pub retryable: bool,

    /// Additional error details.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl ResponseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.is_retryable(),
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Response metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Server timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,

    /// Additional metadata fields (for forward compatibility).
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ResponseMeta {
    /// Metadata stamped with the current server time.
    pub fn now() -> Self {
        Self {
            server_time: Some(Utc::now()),
            extra: HashMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.server_time.is_none() && self.extra.is_empty()
    }
}

/// Response message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Message type, always "response".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Request ID this response correlates to.
    pub id: String,

    /// Response status.
    pub status: ResponseStatus,

    /// Result payload (for successful responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error details (for error responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,

    /// Response metadata.
    #[serde(default, skip_serializing_if = "ResponseMeta::is_empty")]
    pub meta: ResponseMeta,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            msg_type: "response".to_string(),
            id: id.into(),
            status: ResponseStatus::Ok,
            result: Some(result),
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    pub fn error(id: impl Into<String>, error: ResponseError) -> Self {
        Self {
            msg_type: "response".to_string(),
            id: id.into(),
            status: ResponseStatus::Error,
            result: None,
            error: Some(error),
            meta: ResponseMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// One element of a streamed reply (LIST_BOOKS).
///
/// Items share the request ID of the call that opened the stream; the stream
/// is closed by a regular [`Response`] carrying the same ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamItem {
    /// Message type, always "item".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Request ID of the streaming call.
    pub id: String,

    /// Zero-based position of this item in the stream.
    pub seq: u64,

    /// The streamed book.
    pub book: BookMessage,
}

impl StreamItem {
    pub fn new(id: impl Into<String>, seq: u64, book: BookMessage) -> Self {
        Self {
            msg_type: "item".to_string(),
            id: id.into(),
            seq,
            book,
        }
    }
}

// ============================================================================
// Operation-specific parameter types
// ============================================================================

/// Parameters for HELLO request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloParams {
    pub protocol_version: u16,
    #[serde(default)]
    pub client_name: Option<String>,
}

/// Result for HELLO response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResult {
    pub protocol_version: u16,
    pub server_name: String,
    pub server_version: String,
}

/// Wire representation of a book.
///
/// Every field is optional on the wire so that an absent field can be
/// reported as a precondition failure rather than a decoding error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
}

/// Parameters for GET_BOOK and DELETE_BOOK requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsbnParams {
    pub value: String,
}

/// Parameters for UPDATE_BOOK request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBookParams {
    /// Lookup key of the book to replace.
    pub isbn: String,
    /// Replacement record; its isbn may differ from the lookup key.
    pub new_book: BookMessage,
}

/// Result for DELETE_BOOK response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteBookResult {
    pub success: bool,
}

/// Result closing a LIST_BOOKS stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBooksResult {
    /// Number of items sent before this response.
    pub count: u64,
}
