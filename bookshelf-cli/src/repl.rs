//! Interactive menu.

use crate::commands;
use bookshelf_client::{Client, ClientError};
use bookshelf_core::Book;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::path::PathBuf;

const MENU: &str = "[l] list  [a] add  [g] get  [u] update  [d] delete  [q] quit";

/// What the menu should do with one line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    List,
    Add,
    Get,
    Update,
    Delete,
    Quit,
    Unknown,
}

impl MenuAction {
    fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "" | "q" | "quit" | "exit" => MenuAction::Quit,
            "l" | "list" => MenuAction::List,
            "a" | "add" => MenuAction::Add,
            "g" | "get" => MenuAction::Get,
            "u" | "update" => MenuAction::Update,
            "d" | "delete" => MenuAction::Delete,
            _ => MenuAction::Unknown,
        }
    }
}

type LineEditor = Editor<(), DefaultHistory>;

pub async fn run(client: Client, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "bookshelf CLI".bold().cyan());
    println!("Connecting to {}...", addr);

    client.connect().await?;
    println!("{}", "Connected!".green());

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: LineEditor = Editor::with_config(config)?;

    let history_path = history_path();
    let _ = rl.load_history(&history_path);

    loop {
        println!("{}", MENU.dimmed());
        let prompt = format!("{} ", "bookshelf>".cyan());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        };

        let result = match MenuAction::parse(&line) {
            MenuAction::Quit => break,
            MenuAction::Unknown => {
                println!("{}: unknown choice '{}'\n", "Error".red(), line.trim());
                continue;
            }
            MenuAction::List => commands::list(&client).await,
            MenuAction::Add => match read_book(&mut rl, "")? {
                Some(book) => commands::add(&client, book).await,
                None => continue,
            },
            MenuAction::Get => match read_field(&mut rl, "isbn")? {
                Some(isbn) => commands::get(&client, &isbn).await,
                None => continue,
            },
            MenuAction::Update => match read_update(&mut rl)? {
                Some((isbn, book)) => commands::update(&client, &isbn, book).await,
                None => continue,
            },
            MenuAction::Delete => match read_field(&mut rl, "isbn")? {
                Some(isbn) => commands::delete(&client, &isbn).await,
                None => continue,
            },
        };

        match result {
            Ok(output) => println!("{}\n", output),
            Err(e) => {
                println!("{}: {}\n", "Error".red(), e);
                if matches!(e, ClientError::ConnectionClosed | ClientError::NotConnected) {
                    break;
                }
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

fn history_path() -> PathBuf {
    home::home_dir()
        .map(|h| h.join(".bookshelf_history"))
        .unwrap_or_else(|| ".bookshelf_history".into())
}

/// Prompts until a non-empty value is entered and returns it as typed.
/// `None` when the user aborts.
fn read_field(rl: &mut LineEditor, name: &str) -> Result<Option<String>, ReadlineError> {
    loop {
        match rl.readline(&format!("  {}: ", name)) {
            Ok(value) => {
                if let Some(value) = accept_field(value) {
                    return Ok(Some(value));
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err),
        }
    }
}

/// Empty input is refused; anything else is kept verbatim.
fn accept_field(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn read_book(rl: &mut LineEditor, prefix: &str) -> Result<Option<Book>, ReadlineError> {
    let Some(title) = read_field(rl, &format!("{}title", prefix))? else {
        return Ok(None);
    };
    let Some(author) = read_field(rl, &format!("{}author", prefix))? else {
        return Ok(None);
    };
    let Some(isbn) = read_field(rl, &format!("{}isbn", prefix))? else {
        return Ok(None);
    };
    Ok(Some(Book::new(title, author, isbn)))
}

fn read_update(rl: &mut LineEditor) -> Result<Option<(String, Book)>, ReadlineError> {
    let Some(isbn) = read_field(rl, "isbn of the book to update")? else {
        return Ok(None);
    };
    Ok(read_book(rl, "new ")?.map(|book| (isbn, book)))
}
