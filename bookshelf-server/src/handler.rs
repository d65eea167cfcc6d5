//! Command handlers.

use crate::error::ServerError;
use crate::service::BookService;
use crate::session::{Session, SessionState};
use bookshelf_core::Book;
use bookshelf_protocol::message::*;
use bookshelf_protocol::PROTOCOL_VERSION;
use bookshelf_storage::{BookCursor, StorageError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Server identity reported in HELLO.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "bookshelf".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Command handler.
pub struct CommandHandler {
    service: Arc<BookService>,
    info: ServerInfo,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(service: Arc<BookService>) -> Self {
        Self {
            service,
            info: ServerInfo::default(),
        }
    }

    /// Handles a unary request and returns its response.
    pub async fn handle(&self, session: &mut Session, request: &Request) -> Response {
        session.record_request();

        let result = match request.op {
            Operation::Hello => self.handle_hello(session, &request.params),
            Operation::Ping => Ok(json!({"pong": true})),
            Operation::Bye => self.handle_bye(session),
            Operation::AddBook => self.handle_add_book(&request.params).await,
            Operation::GetBook => self.handle_get_book(&request.params).await,
            Operation::UpdateBook => self.handle_update_book(&request.params).await,
            Operation::DeleteBook => self.handle_delete_book(&request.params).await,
            Operation::ListBooks => Err(ServerError::InvalidRequest(
                "LIST_BOOKS replies with a stream".to_string(),
            )),
        };

        Self::into_response(&request.id, result)
    }

    /// Opens the cursor backing a LIST_BOOKS stream.
    ///
    /// On failure the returned response is the one to send in place of the
    /// stream.
    pub async fn open_list(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> Result<BookCursor, Response> {
        session.record_request();
        self.service
            .list_all()
            .await
            .map_err(|e| Self::into_response(&request.id, Err(e)))
    }

    /// Builds the response that closes a LIST_BOOKS stream.
    pub fn list_end(request_id: &str, result: Result<u64, ServerError>) -> Response {
        let result =
            result.and_then(|count| Ok(serde_json::to_value(ListBooksResult { count })?));
        Self::into_response(request_id, result)
    }

    fn into_response(id: &str, result: Result<Value, ServerError>) -> Response {
        let response = match result {
            Ok(value) => Response::ok(id, value),
            Err(e) => {
                let mut error = ResponseError::new(e.error_code(), e.to_string());
                if let ServerError::BookNotFound(isbn)
                | ServerError::BookExists(isbn)
                | ServerError::Storage(StorageError::DuplicateIsbn(isbn)) = &e
                {
                    error = error.with_detail("isbn", isbn.as_str());
                }
                Response::error(id, error)
            }
        };
        response.with_meta(ResponseMeta::now())
    }

    fn handle_hello(&self, session: &mut Session, params: &Value) -> Result<Value, ServerError> {
        let hello: HelloParams = parse_params(params)?;

        if hello.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::UnsupportedProtocol(hello.protocol_version));
        }

        session.complete_handshake(hello.protocol_version, hello.client_name);

        let result = HelloResult {
            protocol_version: PROTOCOL_VERSION,
            server_name: self.info.name.clone(),
            server_version: self.info.version.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_bye(&self, session: &mut Session) -> Result<Value, ServerError> {
        session.set_state(SessionState::Closing);
        Ok(json!({"goodbye": true}))
    }

    async fn handle_add_book(&self, params: &Value) -> Result<Value, ServerError> {
        let msg: BookMessage = parse_params(params)?;
        let book = Book::try_from(msg)?;
        let added = self.service.add(book).await?;
        Ok(serde_json::to_value(BookMessage::from(added))?)
    }

    async fn handle_get_book(&self, params: &Value) -> Result<Value, ServerError> {
        let isbn: IsbnParams = parse_params(params)?;
        let book = self.service.get(&isbn.value).await?;
        Ok(serde_json::to_value(BookMessage::from(book))?)
    }

    async fn handle_update_book(&self, params: &Value) -> Result<Value, ServerError> {
        let update: UpdateBookParams = parse_params(params)?;
        let new_book = Book::try_from(update.new_book)?;
        let updated = self.service.update(&update.isbn, new_book).await?;
        Ok(serde_json::to_value(BookMessage::from(updated))?)
    }

    async fn handle_delete_book(&self, params: &Value) -> Result<Value, ServerError> {
        let isbn: IsbnParams = parse_params(params)?;
        self.service.delete(&isbn.value).await?;
        Ok(serde_json::to_value(DeleteBookResult { success: true })?)
    }
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ServerError> {
    serde_json::from_value(params.clone()).map_err(|e| ServerError::InvalidRequest(e.to_string()))
}
