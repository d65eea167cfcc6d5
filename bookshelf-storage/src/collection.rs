//! Book collection abstraction.

use crate::error::StorageError;
use async_trait::async_trait;
use bookshelf_core::Book;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A single collection of books keyed by isbn.
///
/// Methods map one-to-one onto database filter/update primitives. No
/// uniqueness is enforced here; callers check before inserting.
#[async_trait]
pub trait BookCollection: Send + Sync {
    /// Counts the books whose isbn equals `isbn`.
    async fn count_by_isbn(&self, isbn: &str) -> Result<u64, StorageError>;

    /// Returns the first book whose isbn equals `isbn`.
    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StorageError>;

    /// Inserts a book.
    async fn insert(&self, book: &Book) -> Result<(), StorageError>;

    /// Overwrites title, author and isbn of the first book matching `isbn`.
    ///
    /// Returns the number of matched books (0 or 1).
    async fn replace_by_isbn(&self, isbn: &str, book: &Book) -> Result<u64, StorageError>;

    /// Removes the first book matching `isbn`.
    ///
    /// Returns the number of removed books (0 or 1).
    async fn delete_by_isbn(&self, isbn: &str) -> Result<u64, StorageError>;

    /// Opens a cursor over every book in natural order.
    async fn find_all(&self) -> Result<BookCursor, StorageError>;

    /// Human-readable location of the collection, used in logs.
    fn describe(&self) -> String;

    /// Releases the underlying connection.
    async fn close(&self);
}

/// Lazy stream over stored books.
///
/// The underlying database cursor is held until the value is dropped, on
/// every exit path.
pub struct BookCursor {
    inner: BoxStream<'static, Result<Book, StorageError>>,
    yielded: u64,
}

impl BookCursor {
    pub fn new(stream: impl Stream<Item = Result<Book, StorageError>> + Send + 'static) -> Self {
        tracing::debug!("book cursor opened");
        Self {
            inner: stream.boxed(),
            yielded: 0,
        }
    }

    /// Returns the next book, or `None` once the cursor is exhausted.
    pub async fn next_book(&mut self) -> Option<Result<Book, StorageError>> {
        self.next().await
    }

    /// Number of books produced so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }
}

impl Stream for BookCursor {
    type Item = Result<Book, StorageError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(_))) = &poll {
            self.yielded += 1;
        }
        poll
    }
}

impl Drop for BookCursor {
    fn drop(&mut self) {
        tracing::debug!(yielded = self.yielded, "book cursor released");
    }
}

impl std::fmt::Debug for BookCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookCursor")
            .field("yielded", &self.yielded)
            .finish()
    }
}
