//! The book service.
//!
//! Each operation translates into filter/update calls on the collection.
//! Uniqueness of isbn is checked before insert; two concurrent adds of the
//! same isbn can both pass the check unless the backend carries a unique
//! index.

use crate::error::ServerError;
use bookshelf_core::Book;
use bookshelf_storage::{BookCollection, BookCursor};
use std::sync::Arc;
use std::time::Instant;

/// CRUD operations over a single book collection keyed by isbn.
pub struct BookService {
    books: Arc<dyn BookCollection>,
}

impl BookService {
    pub fn new(books: Arc<dyn BookCollection>) -> Self {
        Self { books }
    }

    /// Inserts every sample whose isbn is not already stored.
    ///
    /// Returns the number of inserted books.
    pub async fn seed(&self, samples: &[Book]) -> Result<usize, ServerError> {
        let started = Instant::now();
        let mut added = 0;
        for book in samples {
            if self.books.count_by_isbn(&book.isbn).await? == 0 {
                self.books.insert(book).await?;
                added += 1;
            }
        }

        if added > 0 {
            tracing::info!(
                "Added {} sample books in {} ms",
                added,
                started.elapsed().as_millis()
            );
        } else {
            tracing::debug!("Sample books already present");
        }
        Ok(added)
    }

    /// Adds a book unless its isbn is already taken.
    pub async fn add(&self, book: Book) -> Result<Book, ServerError> {
        tracing::info!(isbn = %book.isbn, "Adding book");
        if self.books.count_by_isbn(&book.isbn).await? > 0 {
            tracing::warn!(isbn = %book.isbn, "Book already exists");
            return Err(ServerError::BookExists(book.isbn));
        }
        self.books.insert(&book).await?;
        Ok(book)
    }

    /// Returns the first book stored under `isbn`.
    pub async fn get(&self, isbn: &str) -> Result<Book, ServerError> {
        tracing::info!(%isbn, "Getting book");
        match self.books.find_by_isbn(isbn).await? {
            Some(book) => Ok(book),
            None => {
                tracing::warn!(%isbn, "Book not found");
                Err(ServerError::BookNotFound(isbn.to_string()))
            }
        }
    }

    /// Replaces the book stored under `isbn` and echoes `new_book`.
    pub async fn update(&self, isbn: &str, new_book: Book) -> Result<Book, ServerError> {
        tracing::info!(%isbn, new_isbn = %new_book.isbn, "Updating book");
        if self.books.replace_by_isbn(isbn, &new_book).await? == 0 {
            tracing::warn!(%isbn, "Book not found");
            return Err(ServerError::BookNotFound(isbn.to_string()));
        }
        Ok(new_book)
    }

    /// Removes one book stored under `isbn`.
    pub async fn delete(&self, isbn: &str) -> Result<(), ServerError> {
        tracing::info!(%isbn, "Deleting book");
        if self.books.delete_by_isbn(isbn).await? == 0 {
            tracing::warn!(%isbn, "Book not found");
            return Err(ServerError::BookNotFound(isbn.to_string()));
        }
        Ok(())
    }

    /// Opens a cursor over every stored book.
    pub async fn list_all(&self) -> Result<BookCursor, ServerError> {
        tracing::info!("Listing all books");
        Ok(self.books.find_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_core::sample_books;
    use bookshelf_storage::MemoryCollection;

    fn dune() -> Book {
        Book::new("Dune", "Frank Herbert", "0441013597")
    }

    fn test_service() -> (MemoryCollection, BookService) {
        let collection = MemoryCollection::new();
        let service = BookService::new(Arc::new(collection.clone()));
        (collection, service)
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (collection, service) = test_service();
        let samples = sample_books();

        assert_eq!(service.seed(&samples).await.unwrap(), samples.len());
        assert_eq!(service.seed(&samples).await.unwrap(), 0);
        assert_eq!(collection.len(), samples.len());
    }

    #[tokio::test]
    async fn test_seed_skips_existing_isbn() {
        let (collection, service) = test_service();
        let samples = sample_books();
        let custom = Book::new("My Eragon", "Someone", samples[1].isbn.clone());
        service.add(custom.clone()).await.unwrap();

        assert_eq!(service.seed(&samples).await.unwrap(), samples.len() - 1);
        assert_eq!(collection.len(), samples.len());
        assert_eq!(service.get(&custom.isbn).await.unwrap(), custom);
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let (_collection, service) = test_service();
        assert_eq!(service.add(dune()).await.unwrap(), dune());
        assert_eq!(service.get("0441013597").await.unwrap(), dune());
    }

    #[tokio::test]
    async fn test_add_duplicate_keeps_first() {
        let (collection, service) = test_service();
        service.add(dune()).await.unwrap();

        let clash = Book::new("Not Dune", "Someone Else", "0441013597");
        assert!(matches!(
            service.add(clash).await,
            Err(ServerError::BookExists(isbn)) if isbn == "0441013597"
        ));
        assert_eq!(collection.len(), 1);
        assert_eq!(service.get("0441013597").await.unwrap(), dune());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (_collection, service) = test_service();
        assert!(matches!(
            service.get("nothing").await,
            Err(ServerError::BookNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_leaves_collection_unchanged() {
        let (collection, service) = test_service();
        service.add(dune()).await.unwrap();

        let result = service
            .update("nothing", Book::new("T", "A", "nothing"))
            .await;
        assert!(matches!(result, Err(ServerError::BookNotFound(_))));
        assert_eq!(collection.len(), 1);
        assert_eq!(service.get("0441013597").await.unwrap(), dune());
    }

    #[tokio::test]
    async fn test_update_same_and_changed_isbn() {
        let (_collection, service) = test_service();
        service.add(dune()).await.unwrap();

        let revised = Book::new("Dune", "F. Herbert", "0441013597");
        assert_eq!(
            service.update("0441013597", revised.clone()).await.unwrap(),
            revised
        );
        assert_eq!(service.get("0441013597").await.unwrap(), revised);

        let moved = Book::new("Dune", "Frank Herbert", "9780441013593");
        service.update("0441013597", moved.clone()).await.unwrap();
        assert!(service.get("0441013597").await.is_err());
        assert_eq!(service.get("9780441013593").await.unwrap(), moved);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_collection, service) = test_service();
        assert!(matches!(
            service.delete("0441013597").await,
            Err(ServerError::BookNotFound(_))
        ));

        service.add(dune()).await.unwrap();
        service.delete("0441013597").await.unwrap();
        assert!(service.get("0441013597").await.is_err());
    }

    #[tokio::test]
    async fn test_list_all() {
        let (_collection, service) = test_service();
        let samples = sample_books();
        service.seed(&samples).await.unwrap();

        let mut cursor = service.list_all().await.unwrap();
        let mut listed = Vec::new();
        while let Some(book) = cursor.next_book().await {
            listed.push(book.unwrap());
        }
        assert_eq!(listed, samples);
    }
}
