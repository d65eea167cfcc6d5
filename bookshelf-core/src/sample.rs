//! Sample catalogue seeded into a fresh collection.

use crate::book::Book;

const SAMPLES: &[(&str, &str, &str)] = &[
    (
        "Harry Potter and the Deathly Hallows",
        "J. K. Rowling",
        "0-545-01022-5",
    ),
    ("Eragon", "Christopher Paolini", "0-375-82668-8"),
    ("Measuring the World", "Daniel Kehlmann", "3-498-03528-2"),
    ("Elantris", "Brandon Sanderson", "0765311771"),
    (
        "The Hitchhiker's Guide to the Galaxy",
        "Douglas Adams",
        "0345391802",
    ),
    ("The Martian", "Andy Weir", "0553418025"),
    ("Guards! Guards!", "Terry Pratchett", "0062225758"),
    ("Alice in Wonderland", "Lewis Carroll", "3458317422"),
    (
        "Life, the Universe and Everything",
        "Douglas Adams",
        "0345391829",
    ),
];

/// Returns the sample books in seeding order.
pub fn sample_books() -> Vec<Book> {
    SAMPLES
        .iter()
        .map(|(title, author, isbn)| Book::new(*title, *author, *isbn))
        .collect()
}
