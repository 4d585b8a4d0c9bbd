//! Lending and returning. Both keep the book's `quantity` in step with
//! outstanding loans: lending takes one copy off the shelf, returning puts it
//! back.
//!
//! The loan row is the write that matters. Once it is stored the operation has
//! happened, and a stock change that fails afterwards is reported through
//! [`StockUpdate::Failed`] instead of as an error, so callers never retry a
//! loan that already exists. Backends that have transactions override
//! [`Backend::lend`] and [`Backend::return_loan`] and do both writes at once.

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{BackendError, BackendResult};
use crate::models::{Book, BookDraft, Loan, NewLoan};

/// What happened to the book's stock after the loan row was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockUpdate {
    Adjusted,
    /// The book row is gone, so there was nothing to restock.
    BookMissing,
    /// The loan row was written but the stock change was not.
    Failed(String),
}

/// Calendar date used for loan and return dates. The UTC date matches what the
/// hosted tables were historically filled with.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Refuse to lend a book with no copies left.
pub fn ensure_on_shelf(book: &Book) -> BackendResult<()> {
    if book.quantity <= 0 {
        return Err(BackendError::Rejected(format!(
            "No copies of \"{}\" left to lend.",
            book.title
        )));
    }
    Ok(())
}

/// Refuse to return a loan twice.
pub fn ensure_outstanding(loan: &Loan) -> BackendResult<()> {
    if !loan.is_outstanding() {
        return Err(BackendError::Rejected(
            "This loan has already been returned.".to_string(),
        ));
    }
    Ok(())
}

/// `book` as an update body with its stock moved by `delta`.
pub fn with_stock_change(book: &Book, delta: i64) -> BookDraft {
    BookDraft {
        quantity: book.quantity + delta,
        ..book.draft()
    }
}

/// Lend `book_id` to `student_enrollment` on `on`, one request per step.
pub fn lend_sequentially<B: Backend + ?Sized>(
    backend: &B,
    student_enrollment: &str,
    book_id: i64,
    on: NaiveDate,
) -> BackendResult<StockUpdate> {
    let book = backend.fetch_book(book_id)?;
    ensure_on_shelf(&book)?;

    backend.create_loan(&NewLoan {
        student_enrollment: student_enrollment.to_string(),
        book_id,
        loan_date: on,
    })?;
    info!(book_id, student = student_enrollment, "book lent");

    let update = match backend.update_book(book_id, &with_stock_change(&book, -1)) {
        Ok(()) => StockUpdate::Adjusted,
        Err(err) => {
            warn!(book_id, error = %err, "loan stored but stock not decremented");
            StockUpdate::Failed(err.to_string())
        }
    };
    Ok(update)
}

/// Close an outstanding loan on `on` and restock its book, one request per
/// step.
pub fn return_sequentially<B: Backend + ?Sized>(
    backend: &B,
    loan: &Loan,
    on: NaiveDate,
) -> BackendResult<StockUpdate> {
    ensure_outstanding(loan)?;

    backend.set_loan_returned(loan.id, on)?;
    info!(loan_id = loan.id, book_id = loan.book_id, "loan returned");

    let restock = backend
        .fetch_book(loan.book_id)
        .and_then(|book| backend.update_book(book.id, &with_stock_change(&book, 1)));
    let update = match restock {
        Ok(()) => StockUpdate::Adjusted,
        Err(BackendError::NotFound(_)) => StockUpdate::BookMissing,
        Err(err) => {
            warn!(book_id = loan.book_id, error = %err, "loan closed but stock not restored");
            StockUpdate::Failed(err.to_string())
        }
    };
    Ok(update)
}
