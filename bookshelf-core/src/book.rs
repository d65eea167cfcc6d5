//! The book record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalogue entry.
///
/// Two books are equivalent when all three fields are equal; the isbn is the
/// lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Book {
    /// Identifier used for every lookup.
    pub isbn: String,

    pub title: String,

    pub author: String,
}

impl Book {
    /// Creates a new book.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        isbn: impl Into<String>,
    ) -> Self {
        Self {
            isbn: isbn.into(),
            title: title.into(),
            author: author.into(),
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ Author: {}, Title: {}, Isbn: {} }}",
            self.author, self.title, self.isbn
        )
    }
}
