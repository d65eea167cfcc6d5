//! Conversions between wire messages, books and stored documents.
//!
//! Every conversion into a [`Book`] requires all three fields and fails with
//! [`CoreError::MissingField`] on the first absent one. No normalization is
//! applied.

use crate::book::Book;
use crate::error::CoreError;
use bookshelf_protocol::BookMessage;
use bson::{doc, Bson, Document};

/// Document field holding the isbn.
pub const FIELD_ISBN: &str = "isbn";
/// Document field holding the title.
pub const FIELD_TITLE: &str = "title";
/// Document field holding the author.
pub const FIELD_AUTHOR: &str = "author";

impl TryFrom<BookMessage> for Book {
    type Error = CoreError;

    fn try_from(msg: BookMessage) -> Result<Self, Self::Error> {
        let title = msg.title.ok_or(CoreError::MissingField { field: FIELD_TITLE })?;
        let author = msg.author.ok_or(CoreError::MissingField {
            field: FIELD_AUTHOR,
        })?;
        let isbn = msg.isbn.ok_or(CoreError::MissingField { field: FIELD_ISBN })?;
        Ok(Book {
            isbn,
            title,
            author,
        })
    }
}

impl From<&Book> for BookMessage {
    fn from(book: &Book) -> Self {
        BookMessage {
            title: Some(book.title.clone()),
            author: Some(book.author.clone()),
            isbn: Some(book.isbn.clone()),
        }
    }
}

impl From<Book> for BookMessage {
    fn from(book: Book) -> Self {
        BookMessage {
            title: Some(book.title),
            author: Some(book.author),
            isbn: Some(book.isbn),
        }
    }
}

impl TryFrom<&Document> for Book {
    type Error = CoreError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        Ok(Book {
            isbn: string_field(document, FIELD_ISBN)?,
            title: string_field(document, FIELD_TITLE)?,
            author: string_field(document, FIELD_AUTHOR)?,
        })
    }
}

impl From<&Book> for Document {
    fn from(book: &Book) -> Self {
        doc! {
            FIELD_ISBN: book.isbn.as_str(),
            FIELD_TITLE: book.title.as_str(),
            FIELD_AUTHOR: book.author.as_str(),
        }
    }
}

/// Builds the equality filter selecting books by isbn.
pub fn isbn_filter(isbn: &str) -> Document {
    doc! { FIELD_ISBN: isbn }
}

fn string_field(document: &Document, field: &'static str) -> Result<String, CoreError> {
    match document.get(field) {
        Some(Bson::String(value)) => Ok(value.clone()),
        Some(_) => Err(CoreError::InvalidFieldType { field }),
        None => Err(CoreError::MissingField { field }),
    }
}
