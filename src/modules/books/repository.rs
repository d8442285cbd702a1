//! Persistence operations for the `books` table.
//!
//! Every function takes one borrowed connection, so the caller decides the
//! scope of the storage handle. Absence is reported as `None`/`false`; only
//! store failures become `StorageError`.

use catalog_db::{SqliteConnection, StorageResult};
use catalog_kernel::SchemaStatement;
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, Row};

use super::models::{Book, CreateBook, UpdateBook};

const SELECT_PAGE: &str = "SELECT id, title, author, year, genre, description
     FROM books
     ORDER BY id
     LIMIT ?1 OFFSET ?2";

const SELECT_BY_ID: &str = "SELECT id, title, author, year, genre, description
     FROM books
     WHERE id = ?1";

const INSERT_BOOK: &str = "INSERT INTO books (title, author, year, genre, description)
     VALUES (?1, ?2, ?3, ?4, ?5)
     RETURNING id, title, author, year, genre, description";

const UPDATE_BOOK: &str = "UPDATE books
     SET title = ?1, author = ?2, year = ?3, genre = ?4, description = ?5
     WHERE id = ?6";

const DELETE_BOOK: &str = "DELETE FROM books WHERE id = ?1";

const COUNT_BOOKS: &str = "SELECT COUNT(*) AS total FROM books";

/// Table and index definitions owned by the books module.
pub fn schema() -> Vec<SchemaStatement> {
    vec![
        SchemaStatement {
            id: "001_books_table",
            sql: "CREATE TABLE IF NOT EXISTS books (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       VARCHAR(255) NOT NULL,
                author      VARCHAR(255) NOT NULL,
                year        INTEGER NOT NULL,
                genre       VARCHAR(100) NOT NULL,
                description TEXT
            )",
        },
        SchemaStatement {
            id: "002_books_title_index",
            sql: "CREATE INDEX IF NOT EXISTS ix_books_title ON books (title)",
        },
        SchemaStatement {
            id: "003_books_author_index",
            sql: "CREATE INDEX IF NOT EXISTS ix_books_author ON books (author)",
        },
    ]
}

/// Map a `books` row onto the entity by column name.
fn book_from_row(row: &SqliteRow) -> Result<Book, sqlx::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        year: row.try_get("year")?,
        genre: row.try_get("genre")?,
        description: row.try_get("description")?,
    })
}

/// Page through books in ascending id order.
pub async fn list(conn: &mut SqliteConnection, skip: i64, limit: i64) -> StorageResult<Vec<Book>> {
    let rows = sqlx::query(SELECT_PAGE)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *conn)
        .await?;

    let books = rows
        .iter()
        .map(book_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(skip, limit, returned = books.len(), "listed books");
    Ok(books)
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> StorageResult<Option<Book>> {
    let row = sqlx::query(SELECT_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(book_from_row).transpose()?)
}

/// Insert a book and return it with its assigned id.
///
/// `RETURNING` makes the insert and the read-back a single statement.
pub async fn create(conn: &mut SqliteConnection, new_book: CreateBook) -> StorageResult<Book> {
    let row = sqlx::query(INSERT_BOOK)
        .bind(&new_book.title)
        .bind(&new_book.author)
        .bind(new_book.year)
        .bind(&new_book.genre)
        .bind(&new_book.description)
        .fetch_one(&mut *conn)
        .await?;

    let book = book_from_row(&row)?;
    tracing::debug!(book_id = book.id, "inserted book");
    Ok(book)
}

/// Merge `changes` into the stored book.
///
/// Read, merge and write run in one `IMMEDIATE` transaction, so the write
/// lock is held from the read onwards and concurrent updaters queue on the
/// busy timeout. A missing row returns `None` and the transaction is rolled
/// back untouched.
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    changes: UpdateBook,
) -> StorageResult<Option<Book>> {
    let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

    let Some(row) = sqlx::query(SELECT_BY_ID)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(None);
    };

    let mut book = book_from_row(&row)?;
    if changes.is_empty() {
        return Ok(Some(book));
    }
    book.apply(changes);

    sqlx::query(UPDATE_BOOK)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year)
        .bind(&book.genre)
        .bind(&book.description)
        .bind(book.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!(book_id = book.id, "updated book");
    Ok(Some(book))
}

/// Remove a book; `false` when there was nothing to remove.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> StorageResult<bool> {
    let result = sqlx::query(DELETE_BOOK)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let removed = result.rows_affected() > 0;
    tracing::debug!(book_id = id, removed, "deleted book");
    Ok(removed)
}

pub async fn count(conn: &mut SqliteConnection) -> StorageResult<i64> {
    let row = sqlx::query(COUNT_BOOKS).fetch_one(&mut *conn).await?;
    Ok(row.try_get("total")?)
}

/// Insert the sample books into an empty table. Returns how many were added.
pub async fn seed_samples(conn: &mut SqliteConnection) -> StorageResult<usize> {
    if count(&mut *conn).await? > 0 {
        return Ok(0);
    }

    let samples = sample_books();
    let total = samples.len();
    let mut tx = conn.begin().await?;
    for sample in samples {
        create(&mut tx, sample).await?;
    }
    tx.commit().await?;

    Ok(total)
}

fn sample_books() -> Vec<CreateBook> {
    let sample = |title: &str, author: &str, year: i32, genre: &str, description: &str| CreateBook {
        title: title.to_string(),
        author: author.to_string(),
        year,
        genre: genre.to_string(),
        description: Some(description.to_string()),
    };

    vec![
        sample(
            "To Kill a Mockingbird",
            "Harper Lee",
            1960,
            "Fiction",
            "A lawyer in the Depression-era South defends a black man charged with the rape of a white woman.",
        ),
        sample(
            "Harry Potter and the Philosopher's Stone",
            "J.K. Rowling",
            1997,
            "Fantasy",
            "A young wizard discovers his magical heritage and begins his journey at Hogwarts School of Witchcraft and Wizardry.",
        ),
        sample(
            "Pride and Prejudice",
            "Jane Austen",
            1813,
            "Romance",
            "The romantic relationship between Elizabeth Bennet and Mr. Darcy develops amid the social conventions of 19th-century England.",
        ),
        sample(
            "A Brief History of Time",
            "Stephen Hawking",
            1988,
            "Science",
            "Hawking attempts to explain complex cosmological theories to the general reader, from the Big Bang to black holes.",
        ),
    ]
}
