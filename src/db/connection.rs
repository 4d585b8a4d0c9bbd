use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Tables of the embedded store, created lazily in this order so foreign keys
/// always point at an existing table.
const SCHEMA: &[(&str, &str)] = &[
    (
        "students",
        "CREATE TABLE IF NOT EXISTS students (
            enrollment TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            birth_date TEXT,
            email TEXT NOT NULL DEFAULT '',
            scholarship INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "authors",
        "CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
    ),
    (
        "subjects",
        "CREATE TABLE IF NOT EXISTS subjects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
    ),
    (
        "books",
        "CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            author_id INTEGER REFERENCES authors(id),
            subject_id INTEGER REFERENCES subjects(id)
        )",
    ),
    (
        "loans",
        "CREATE TABLE IF NOT EXISTS loans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_enrollment TEXT NOT NULL REFERENCES students(enrollment),
            book_id INTEGER NOT NULL REFERENCES books(id),
            loan_date TEXT NOT NULL,
            return_date TEXT
        )",
    ),
    (
        "admins",
        "CREATE TABLE IF NOT EXISTS admins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL
        )",
    ),
    (
        "sessions",
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )",
    ),
];

/// Ensure the database file exists, run lazy migrations, and return a live
/// connection. Foreign keys are switched on so deleting a student or book
/// that loans still reference fails instead of leaving dangling rows.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }

    let conn = Connection::open(path).context("failed to open SQLite database")?;
    prepare(&conn)?;
    Ok(conn)
}

/// Fresh private database, used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign keys")?;

    for (table, sql) in SCHEMA {
        conn.execute(sql, [])
            .with_context(|| format!("failed to create {table} table"))?;
    }

    Ok(())
}
