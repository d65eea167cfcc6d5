//! bookshelf-cli - Command-line interface for bookshelf
//!
//! Provides both an interactive menu and one-shot command execution.

mod commands;
mod repl;

use bookshelf_client::{Client, ConnectionConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bookshelf-cli")]
#[command(about = "Command-line interface for the bookshelf catalogue")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, env = "BOOKSHELF_SERVER", default_value = "127.0.0.1:8082")]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive menu
    Repl,

    /// Ping the server
    Ping,

    /// List every book
    List,

    /// Add a book
    Add {
        /// Book title
        #[arg(short, long)]
        title: String,

        /// Book author
        #[arg(short, long)]
        author: String,

        /// Book isbn
        #[arg(short, long)]
        isbn: String,
    },

    /// Get a book by isbn
    Get {
        /// Book isbn
        isbn: String,
    },

    /// Replace the book stored under an isbn
    Update {
        /// Isbn of the stored book
        isbn: String,

        /// New title
        #[arg(short, long)]
        title: String,

        /// New author
        #[arg(short, long)]
        author: String,

        /// New isbn (defaults to the current one)
        #[arg(long)]
        new_isbn: Option<String>,
    },

    /// Delete a book by isbn
    Delete {
        /// Book isbn
        isbn: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = ConnectionConfig::new(cli.server.clone())
        .with_client_name("bookshelf-cli")
        .with_request_timeout(Duration::from_secs(cli.timeout));
    let client = Client::new(config);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, &cli.server).await?;
        }
        Some(cmd) => {
            tracing::debug!("Connecting to {}", cli.server);
            client.connect().await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let result = commands::execute(&client, cmd).await;
            let _ = client.close().await;

            match result {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
