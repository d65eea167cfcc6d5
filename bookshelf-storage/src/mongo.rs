//! MongoDB book collection.

use crate::collection::{BookCollection, BookCursor};
use crate::error::StorageError;
use async_trait::async_trait;
use bookshelf_core::{isbn_filter, Book, FIELD_ISBN};
use bson::{doc, Document};
use futures::StreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use std::time::Duration;

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Connection settings for the MongoDB backend.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub collection: String,
    /// Create a unique index on `isbn` at startup.
    pub unique_isbn_index: bool,
    /// Time allowed to reach the server before startup fails.
    pub connect_timeout: Duration,
}

impl MongoConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: "bookshelf".to_string(),
            collection: "books".to_string(),
            unique_isbn_index: false,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Connection string for the configured endpoint.
    pub fn uri(&self) -> String {
        format!("mongodb://{}:{}", self.host, self.port)
    }
}

/// Book collection stored in MongoDB.
pub struct MongoCollection {
    client: Client,
    books: Collection<Document>,
    location: String,
}

impl MongoCollection {
    /// Connects to the server and verifies it is reachable.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(config.uri()).await?;
        options.app_name = Some("bookshelf".to_string());
        options.server_selection_timeout = Some(config.connect_timeout);
        options.connect_timeout = Some(config.connect_timeout);

        let client = Client::with_options(options)?;
        let database = client.database(&config.database);
        database.run_command(doc! { "ping": 1 }).await?;

        let books = database.collection::<Document>(&config.collection);
        if config.unique_isbn_index {
            let index = IndexModel::builder()
                .keys(doc! { FIELD_ISBN: 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            books.create_index(index).await?;
            tracing::info!(collection = %config.collection, "Unique isbn index ensured");
        }

        let location = format!(
            "{}:{}/{}.{}",
            config.host, config.port, config.database, config.collection
        );
        tracing::info!(%location, "Connected to MongoDB");

        Ok(Self {
            client,
            books,
            location,
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl BookCollection for MongoCollection {
    async fn count_by_isbn(&self, isbn: &str) -> Result<u64, StorageError> {
        Ok(self.books.count_documents(isbn_filter(isbn)).await?)
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        match self.books.find_one(isbn_filter(isbn)).await? {
            Some(document) => Ok(Some(Book::try_from(&document)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, book: &Book) -> Result<(), StorageError> {
        match self.books.insert_one(Document::from(book)).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(StorageError::DuplicateIsbn(book.isbn.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn replace_by_isbn(&self, isbn: &str, book: &Book) -> Result<u64, StorageError> {
        let update = doc! { "$set": Document::from(book) };
        match self.books.update_one(isbn_filter(isbn), update).await {
            Ok(result) => Ok(result.matched_count),
            Err(err) if is_duplicate_key(&err) => {
                Err(StorageError::DuplicateIsbn(book.isbn.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_by_isbn(&self, isbn: &str) -> Result<u64, StorageError> {
        let result = self.books.delete_one(isbn_filter(isbn)).await?;
        Ok(result.deleted_count)
    }

    async fn find_all(&self) -> Result<BookCursor, StorageError> {
        let cursor = self.books.find(doc! {}).await?;
        let books = cursor.map(|item| -> Result<Book, StorageError> {
            let document = item?;
            Ok(Book::try_from(&document)?)
        });
        Ok(BookCursor::new(books))
    }

    fn describe(&self) -> String {
        format!("mongodb://{}", self.location)
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        tracing::info!(location = %self.location, "MongoDB connection closed");
    }
}
