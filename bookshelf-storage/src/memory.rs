//! In-memory book collection.
//!
//! Stores the same documents the MongoDB backend would, in insertion order.
//! Used for development runs without a database and throughout the tests.

use crate::collection::{BookCollection, BookCursor};
use crate::error::StorageError;
use async_trait::async_trait;
use bookshelf_core::{Book, FIELD_ISBN};
use bson::{Bson, Document};
use futures::stream;
use parking_lot::RwLock;
use std::sync::Arc;

/// Book collection held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    documents: Arc<RwLock<Vec<Document>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a raw document without mapping it.
    pub fn insert_document(&self, document: Document) {
        self.documents.write().push(document);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn position(documents: &[Document], isbn: &str) -> Option<usize> {
        documents.iter().position(|d| matches_isbn(d, isbn))
    }
}

fn matches_isbn(document: &Document, isbn: &str) -> bool {
    matches!(document.get(FIELD_ISBN), Some(Bson::String(value)) if value == isbn)
}

#[async_trait]
impl BookCollection for MemoryCollection {
    async fn count_by_isbn(&self, isbn: &str) -> Result<u64, StorageError> {
        let documents = self.documents.read();
        Ok(documents.iter().filter(|d| matches_isbn(d, isbn)).count() as u64)
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        let documents = self.documents.read();
        match documents.iter().find(|d| matches_isbn(d, isbn)) {
            Some(document) => Ok(Some(Book::try_from(document)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, book: &Book) -> Result<(), StorageError> {
        self.documents.write().push(Document::from(book));
        Ok(())
    }

    async fn replace_by_isbn(&self, isbn: &str, book: &Book) -> Result<u64, StorageError> {
        let mut documents = self.documents.write();
        match Self::position(&documents, isbn) {
            Some(idx) => {
                // Mirror `$set`: overwrite the three fields, keep anything else.
                let document = &mut documents[idx];
                for (key, value) in Document::from(book) {
                    document.insert(key, value);
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_by_isbn(&self, isbn: &str) -> Result<u64, StorageError> {
        let mut documents = self.documents.write();
        match Self::position(&documents, isbn) {
            Some(idx) => {
                documents.remove(idx);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_all(&self) -> Result<BookCursor, StorageError> {
        let documents = Arc::clone(&self.documents);
        let books = stream::unfold(0usize, move |idx| {
            let documents = Arc::clone(&documents);
            async move {
                let document = documents.read().get(idx).cloned()?;
                let book = Book::try_from(&document).map_err(StorageError::from);
                Some((book, idx + 1))
            }
        });
        Ok(BookCursor::new(books))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn close(&self) {}
}
