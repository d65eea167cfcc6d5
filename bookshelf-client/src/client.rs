//! High-level client API.

use crate::connection::{Connection, ConnectionConfig, StreamMessage};
use crate::error::ClientError;
use bookshelf_core::Book;
use bookshelf_protocol::message::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// High-level client for a bookshelf server.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the server and starts the background read loop.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await?;

        let conn = self.conn.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.read_loop().await {
                tracing::debug!("read loop ended: {}", e);
            }
        });
        Ok(())
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    async fn request(&self, op: Operation, params: Value) -> Result<Value, ClientError> {
        let response = self.conn.request(op, params).await?;

        if let Some(err) = response.error {
            return Err(err.into());
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn request_book(&self, op: Operation, params: Value) -> Result<Book, ClientError> {
        let result = self.request(op, params).await?;
        let message: BookMessage = serde_json::from_value(result)?;
        Ok(Book::try_from(message)?)
    }

    /// Pings the server.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(Operation::Ping, json!({})).await?;
        Ok(())
    }

    /// Adds a book. Fails with ALREADY_EXISTS when the isbn is taken.
    pub async fn add_book(&self, book: &Book) -> Result<Book, ClientError> {
        let params = serde_json::to_value(BookMessage::from(book))?;
        self.request_book(Operation::AddBook, params).await
    }

    /// Gets a book by isbn.
    pub async fn get_book(&self, isbn: &str) -> Result<Book, ClientError> {
        let params = serde_json::to_value(IsbnParams {
            value: isbn.to_string(),
        })?;
        self.request_book(Operation::GetBook, params).await
    }

    /// Replaces the book stored under `isbn` with `new_book`.
    pub async fn update_book(&self, isbn: &str, new_book: &Book) -> Result<Book, ClientError> {
        let params = serde_json::to_value(UpdateBookParams {
            isbn: isbn.to_string(),
            new_book: BookMessage::from(new_book),
        })?;
        self.request_book(Operation::UpdateBook, params).await
    }

    /// Deletes the book stored under `isbn`.
    pub async fn delete_book(&self, isbn: &str) -> Result<bool, ClientError> {
        let params = serde_json::to_value(IsbnParams {
            value: isbn.to_string(),
        })?;
        let result = self.request(Operation::DeleteBook, params).await?;
        let result: DeleteBookResult = serde_json::from_value(result)?;
        Ok(result.success)
    }

    /// Lists every stored book. Books arrive one at a time as the server
    /// reads them.
    pub async fn list_books(&self) -> Result<BookStream, ClientError> {
        let rx = self.conn.open_stream(Operation::ListBooks, json!({})).await?;
        Ok(BookStream {
            rx,
            timeout: self.conn.config().request_timeout,
            received: 0,
            finished: false,
        })
    }
}

/// Books streamed back by [`Client::list_books`].
pub struct BookStream {
    rx: mpsc::UnboundedReceiver<StreamMessage>,
    timeout: Duration,
    received: u64,
    finished: bool,
}

impl BookStream {
    /// Waits for the next book.
    ///
    /// Returns `None` once the server has closed the stream. A server-side
    /// failure after some books were sent surfaces as a final error.
    pub async fn next(&mut self) -> Option<Result<Book, ClientError>> {
        if self.finished {
            return None;
        }

        let message = match tokio::time::timeout(self.timeout, self.rx.recv()).await {
            Ok(message) => message,
            Err(_) => {
                self.finished = true;
                return Some(Err(ClientError::Timeout));
            }
        };

        match message {
            Some(StreamMessage::Item(item)) => {
                self.received += 1;
                Some(Book::try_from(item.book).map_err(ClientError::from))
            }
            Some(StreamMessage::End(response)) => {
                self.finished = true;
                match response.error {
                    Some(err) => Some(Err(err.into())),
                    None => {
                        if let Some(result) = response.result {
                            match serde_json::from_value::<ListBooksResult>(result) {
                                Ok(end) if end.count != self.received => tracing::warn!(
                                    "stream ended with count={} but {} books received",
                                    end.count,
                                    self.received
                                ),
                                _ => {}
                            }
                        }
                        None
                    }
                }
            }
            None => {
                self.finished = true;
                Some(Err(ClientError::ConnectionClosed))
            }
        }
    }

    /// Drains the stream into a vector, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<Book>, ClientError> {
        let mut books = Vec::new();
        while let Some(book) = self.next().await {
            books.push(book?);
        }
        Ok(books)
    }

    /// Returns the number of books received so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}
