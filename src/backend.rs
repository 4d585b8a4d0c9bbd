//! The one seam between the screens and the data service. Each method maps to
//! a single table-scoped request (a read, optionally joined with display
//! names, or a one-row mutation) or to one of the three session calls.

use chrono::NaiveDate;

use crate::circulation::{self, StockUpdate};
use crate::error::BackendResult;
use crate::models::{
    Author, Book, BookDraft, BookListing, Loan, LoanListing, NewLoan, Session, Student, Subject,
};

#[cfg_attr(test, mockall::automock)]
pub trait Backend {
    /// Exchange credentials for a session and remember it.
    fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session>;
    /// Forget the current session on both sides.
    fn sign_out(&self) -> BackendResult<()>;
    /// The remembered session, if it is still usable.
    fn current_session(&self) -> BackendResult<Option<Session>>;

    fn fetch_students(&self) -> BackendResult<Vec<Student>>;
    fn create_student(&self, student: &Student) -> BackendResult<()>;
    /// Overwrite the row keyed by `enrollment` with `student`.
    fn update_student(&self, enrollment: &str, student: &Student) -> BackendResult<()>;
    fn delete_student(&self, enrollment: &str) -> BackendResult<()>;

    fn fetch_authors(&self) -> BackendResult<Vec<Author>>;
    fn fetch_subjects(&self) -> BackendResult<Vec<Subject>>;

    fn fetch_books(&self) -> BackendResult<Vec<BookListing>>;
    fn fetch_book(&self, id: i64) -> BackendResult<Book>;
    fn create_book(&self, draft: &BookDraft) -> BackendResult<()>;
    fn update_book(&self, id: i64, draft: &BookDraft) -> BackendResult<()>;
    fn delete_book(&self, id: i64) -> BackendResult<()>;

    fn fetch_loans(&self) -> BackendResult<Vec<LoanListing>>;
    fn create_loan(&self, loan: &NewLoan) -> BackendResult<()>;
    /// Record the return date of loan `id`.
    fn set_loan_returned(&self, id: i64, returned_on: NaiveDate) -> BackendResult<()>;

    /// Record a loan and take the copy off the shelf. An `Err` means no loan
    /// was stored.
    fn lend(
        &self,
        student_enrollment: &str,
        book_id: i64,
        on: NaiveDate,
    ) -> BackendResult<StockUpdate> {
        circulation::lend_sequentially(self, student_enrollment, book_id, on)
    }

    /// Close `loan` and put the copy back. An `Err` means the loan is still
    /// outstanding.
    fn return_loan(&self, loan: &Loan, on: NaiveDate) -> BackendResult<StockUpdate> {
        circulation::return_sequentially(self, loan, on)
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        (**self).sign_in(email, password)
    }

    fn sign_out(&self) -> BackendResult<()> {
        (**self).sign_out()
    }

    fn current_session(&self) -> BackendResult<Option<Session>> {
        (**self).current_session()
    }

    fn fetch_students(&self) -> BackendResult<Vec<Student>> {
        (**self).fetch_students()
    }

    fn create_student(&self, student: &Student) -> BackendResult<()> {
        (**self).create_student(student)
    }

    fn update_student(&self, enrollment: &str, student: &Student) -> BackendResult<()> {
        (**self).update_student(enrollment, student)
    }

    fn delete_student(&self, enrollment: &str) -> BackendResult<()> {
        (**self).delete_student(enrollment)
    }

    fn fetch_authors(&self) -> BackendResult<Vec<Author>> {
        (**self).fetch_authors()
    }

    fn fetch_subjects(&self) -> BackendResult<Vec<Subject>> {
        (**self).fetch_subjects()
    }

    fn fetch_books(&self) -> BackendResult<Vec<BookListing>> {
        (**self).fetch_books()
    }

    fn fetch_book(&self, id: i64) -> BackendResult<Book> {
        (**self).fetch_book(id)
    }

    fn create_book(&self, draft: &BookDraft) -> BackendResult<()> {
        (**self).create_book(draft)
    }

    fn update_book(&self, id: i64, draft: &BookDraft) -> BackendResult<()> {
        (**self).update_book(id, draft)
    }

    fn delete_book(&self, id: i64) -> BackendResult<()> {
        (**self).delete_book(id)
    }

    fn fetch_loans(&self) -> BackendResult<Vec<LoanListing>> {
        (**self).fetch_loans()
    }

    fn create_loan(&self, loan: &NewLoan) -> BackendResult<()> {
        (**self).create_loan(loan)
    }

    fn set_loan_returned(&self, id: i64, returned_on: NaiveDate) -> BackendResult<()> {
        (**self).set_loan_returned(id, returned_on)
    }

    fn lend(
        &self,
        student_enrollment: &str,
        book_id: i64,
        on: NaiveDate,
    ) -> BackendResult<StockUpdate> {
        (**self).lend(student_enrollment, book_id, on)
    }

    fn return_loan(&self, loan: &Loan, on: NaiveDate) -> BackendResult<StockUpdate> {
        (**self).return_loan(loan, on)
    }
}
