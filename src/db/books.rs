use rusqlite::{params, Connection, Error as SqlError, ErrorCode, OptionalExtension, Row};

use crate::error::{BackendError, BackendResult};
use crate::models::{Author, Book, BookDraft, BookListing, Subject};

pub fn fetch_authors(conn: &Connection) -> BackendResult<Vec<Author>> {
    let mut stmt = conn.prepare("SELECT id, name FROM authors ORDER BY name COLLATE NOCASE, id")?;
    let authors = stmt
        .query_map([], |row| {
            Ok(Author {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(authors)
}

pub fn fetch_subjects(conn: &Connection) -> BackendResult<Vec<Subject>> {
    let mut stmt =
        conn.prepare("SELECT id, name FROM subjects ORDER BY name COLLATE NOCASE, id")?;
    let subjects = stmt
        .query_map([], |row| {
            Ok(Subject {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subjects)
}

/// Authors are maintained outside the panel; this is what the CLI calls.
pub fn create_author(conn: &Connection, name: &str) -> BackendResult<Author> {
    conn.execute("INSERT INTO authors (name) VALUES (?1)", params![name])?;
    Ok(Author {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn create_subject(conn: &Connection, name: &str) -> BackendResult<Subject> {
    conn.execute("INSERT INTO subjects (name) VALUES (?1)", params![name])?;
    Ok(Subject {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

/// Every book with its author and subject resolved. Books whose references
/// are missing still show up, with blank names.
pub fn fetch_books(conn: &Connection) -> BackendResult<Vec<BookListing>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.title, b.quantity, b.author_id, b.subject_id, a.name, s.name
         FROM books b
         LEFT JOIN authors a ON a.id = b.author_id
         LEFT JOIN subjects s ON s.id = b.subject_id
         ORDER BY b.title COLLATE NOCASE, b.id",
    )?;

    let books = stmt
        .query_map([], |row| {
            let book = book_from_row(row)?;
            let author_name: Option<String> = row.get(5)?;
            let subject_name: Option<String> = row.get(6)?;
            Ok(BookListing {
                author: book
                    .author_id
                    .zip(author_name)
                    .map(|(id, name)| Author { id, name }),
                subject: book
                    .subject_id
                    .zip(subject_name)
                    .map(|(id, name)| Subject { id, name }),
                book,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(books)
}

pub fn fetch_book(conn: &Connection, id: i64) -> BackendResult<Book> {
    conn.query_row(
        "SELECT id, title, quantity, author_id, subject_id FROM books WHERE id = ?1",
        params![id],
        book_from_row,
    )
    .optional()?
    .ok_or_else(|| BackendError::NotFound(format!("Book {id}")))
}

pub fn create_book(conn: &Connection, draft: &BookDraft) -> BackendResult<()> {
    conn.execute(
        "INSERT INTO books (title, quantity, author_id, subject_id) VALUES (?1, ?2, ?3, ?4)",
        params![draft.title, draft.quantity, draft.author_id, draft.subject_id],
    )
    .map_err(map_constraint)?;
    Ok(())
}

pub fn update_book(conn: &Connection, id: i64, draft: &BookDraft) -> BackendResult<()> {
    let updated = conn
        .execute(
            "UPDATE books SET title = ?1, quantity = ?2, author_id = ?3, subject_id = ?4
             WHERE id = ?5",
            params![draft.title, draft.quantity, draft.author_id, draft.subject_id, id],
        )
        .map_err(map_constraint)?;

    if updated == 0 {
        Err(BackendError::NotFound(format!("Book {id}")))
    } else {
        Ok(())
    }
}

pub fn delete_book(conn: &Connection, id: i64) -> BackendResult<()> {
    let deleted = conn
        .execute("DELETE FROM books WHERE id = ?1", params![id])
        .map_err(map_constraint)?;

    if deleted == 0 {
        Err(BackendError::NotFound(format!("Book {id}")))
    } else {
        Ok(())
    }
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        quantity: row.get(2)?,
        author_id: row.get(3)?,
        subject_id: row.get(4)?,
    })
}

/// Foreign keys are the only constraint on books: an unknown author/subject on
/// write, or loans still referencing the book on delete.
fn map_constraint(err: SqlError) -> BackendError {
    if matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation)) {
        BackendError::remote("Book is referenced by loans or points at an unknown author/subject.")
    } else {
        err.into()
    }
}
