//! Command execution.

use crate::Commands;
use bookshelf_client::{Client, ClientError};
use bookshelf_core::Book;
use colored::Colorize;

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, ClientError> {
    match cmd {
        // Handled by the caller.
        Commands::Repl => Ok(String::new()),

        Commands::Ping => {
            client.ping().await?;
            Ok("PONG".green().to_string())
        }

        Commands::List => list(client).await,

        Commands::Add {
            title,
            author,
            isbn,
        } => add(client, Book::new(title, author, isbn)).await,

        Commands::Get { isbn } => get(client, &isbn).await,

        Commands::Update {
            isbn,
            title,
            author,
            new_isbn,
        } => {
            let new_isbn = new_isbn.unwrap_or_else(|| isbn.clone());
            update(client, &isbn, Book::new(title, author, new_isbn)).await
        }

        Commands::Delete { isbn } => delete(client, &isbn).await,
    }
}

pub async fn list(client: &Client) -> Result<String, ClientError> {
    let mut stream = client.list_books().await?;
    let mut output = String::new();
    while let Some(book) = stream.next().await {
        output.push_str(&format_book(&book?));
        output.push('\n');
    }

    if stream.received() == 0 {
        return Ok("No books stored".yellow().to_string());
    }
    output.push_str(&format!("{} book(s)", stream.received()).dimmed().to_string());
    Ok(output)
}

pub async fn add(client: &Client, book: Book) -> Result<String, ClientError> {
    let added = client.add_book(&book).await?;
    Ok(format!("{} {}", "Added".green(), format_book(&added)))
}

pub async fn get(client: &Client, isbn: &str) -> Result<String, ClientError> {
    let book = client.get_book(isbn).await?;
    Ok(format_book(&book))
}

pub async fn update(client: &Client, isbn: &str, new_book: Book) -> Result<String, ClientError> {
    let updated = client.update_book(isbn, &new_book).await?;
    Ok(format!("{} {}", "Updated".green(), format_book(&updated)))
}

pub async fn delete(client: &Client, isbn: &str) -> Result<String, ClientError> {
    client.delete_book(isbn).await?;
    Ok(format!("{} book {}", "Deleted".green(), isbn.cyan()))
}

fn format_book(book: &Book) -> String {
    format!(
        "{} by {} ({})",
        book.title.bold(),
        book.author,
        book.isbn.cyan()
    )
}
