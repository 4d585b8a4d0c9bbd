//! Embedded SQLite implementation of the data service, split across one
//! submodule per table group. `SqliteBackend` wires them to the `Backend`
//! trait and keeps the signed-in session in a `SessionStore`.

pub mod accounts;
pub mod books;
mod connection;
pub mod loans;
pub mod students;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::circulation::{self, StockUpdate};
use crate::error::{BackendError, BackendResult};
use crate::models::{
    Author, Book, BookDraft, BookListing, Loan, LoanListing, NewLoan, Session, Student, Subject,
};
use crate::session::SessionStore;

pub use connection::{open_database, open_in_memory};

/// How long a local session stays valid.
pub const SESSION_TTL_SECS: i64 = 8 * 60 * 60;

pub struct SqliteBackend {
    conn: Connection,
    sessions: SessionStore,
}

impl SqliteBackend {
    pub fn new(conn: Connection, sessions: SessionStore) -> Self {
        Self { conn, sessions }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Every table call requires a live session, like the hosted service's
    /// row-level policies do for the anon role.
    fn require_session(&self) -> BackendResult<()> {
        match self.current_session()? {
            Some(_) => Ok(()),
            None => Err(BackendError::Unauthenticated),
        }
    }
}

impl Backend for SqliteBackend {
    fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let session = accounts::sign_in(
            &self.conn,
            email,
            password,
            Utc::now().timestamp(),
            SESSION_TTL_SECS,
        )?;
        self.sessions.save(&session)?;
        info!(email = %session.email, "signed in (local)");
        Ok(session)
    }

    fn sign_out(&self) -> BackendResult<()> {
        if let Some(session) = self.sessions.load() {
            accounts::end_session(&self.conn, &session.access_token)?;
        }
        self.sessions.clear()?;
        info!("signed out (local)");
        Ok(())
    }

    fn current_session(&self) -> BackendResult<Option<Session>> {
        let Some(stored) = self.sessions.load() else {
            return Ok(None);
        };
        let found =
            accounts::find_session(&self.conn, &stored.access_token, Utc::now().timestamp())?;
        if found.is_none() {
            debug!("stored session is no longer valid");
            self.sessions.clear()?;
        }
        Ok(found)
    }

    fn fetch_students(&self) -> BackendResult<Vec<Student>> {
        self.require_session()?;
        students::fetch_students(&self.conn)
    }

    fn create_student(&self, student: &Student) -> BackendResult<()> {
        self.require_session()?;
        students::create_student(&self.conn, student)
    }

    fn update_student(&self, enrollment: &str, student: &Student) -> BackendResult<()> {
        self.require_session()?;
        students::update_student(&self.conn, enrollment, student)
    }

    fn delete_student(&self, enrollment: &str) -> BackendResult<()> {
        self.require_session()?;
        students::delete_student(&self.conn, enrollment)
    }

    fn fetch_authors(&self) -> BackendResult<Vec<Author>> {
        self.require_session()?;
        books::fetch_authors(&self.conn)
    }

    fn fetch_subjects(&self) -> BackendResult<Vec<Subject>> {
        self.require_session()?;
        books::fetch_subjects(&self.conn)
    }

    fn fetch_books(&self) -> BackendResult<Vec<BookListing>> {
        self.require_session()?;
        books::fetch_books(&self.conn)
    }

    fn fetch_book(&self, id: i64) -> BackendResult<Book> {
        self.require_session()?;
        books::fetch_book(&self.conn, id)
    }

    fn create_book(&self, draft: &BookDraft) -> BackendResult<()> {
        self.require_session()?;
        books::create_book(&self.conn, draft)
    }

    fn update_book(&self, id: i64, draft: &BookDraft) -> BackendResult<()> {
        self.require_session()?;
        books::update_book(&self.conn, id, draft)
    }

    fn delete_book(&self, id: i64) -> BackendResult<()> {
        self.require_session()?;
        books::delete_book(&self.conn, id)
    }

    fn fetch_loans(&self) -> BackendResult<Vec<LoanListing>> {
        self.require_session()?;
        loans::fetch_loans(&self.conn)
    }

    fn create_loan(&self, loan: &NewLoan) -> BackendResult<()> {
        self.require_session()?;
        loans::create_loan(&self.conn, loan)
    }

    fn set_loan_returned(&self, id: i64, returned_on: NaiveDate) -> BackendResult<()> {
        self.require_session()?;
        loans::set_loan_returned(&self.conn, id, returned_on)
    }

    /// Loan row and stock change commit together or not at all.
    fn lend(
        &self,
        student_enrollment: &str,
        book_id: i64,
        on: NaiveDate,
    ) -> BackendResult<StockUpdate> {
        self.require_session()?;
        let tx = self.conn.unchecked_transaction()?;

        let book = books::fetch_book(&tx, book_id)?;
        circulation::ensure_on_shelf(&book)?;
        loans::create_loan(
            &tx,
            &NewLoan {
                student_enrollment: student_enrollment.to_string(),
                book_id,
                loan_date: on,
            },
        )?;
        books::update_book(&tx, book_id, &circulation::with_stock_change(&book, -1))?;

        tx.commit()?;
        info!(book_id, student = student_enrollment, "book lent (local)");
        Ok(StockUpdate::Adjusted)
    }

    fn return_loan(&self, loan: &Loan, on: NaiveDate) -> BackendResult<StockUpdate> {
        self.require_session()?;
        circulation::ensure_outstanding(loan)?;
        let tx = self.conn.unchecked_transaction()?;

        loans::set_loan_returned(&tx, loan.id, on)?;
        let update = match books::fetch_book(&tx, loan.book_id) {
            Ok(book) => {
                books::update_book(&tx, book.id, &circulation::with_stock_change(&book, 1))?;
                StockUpdate::Adjusted
            }
            Err(BackendError::NotFound(_)) => StockUpdate::BookMissing,
            Err(err) => return Err(err),
        };

        tx.commit()?;
        info!(loan_id = loan.id, "loan returned (local)");
        Ok(update)
    }
}
