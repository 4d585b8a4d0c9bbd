use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode};

use crate::error::{BackendError, BackendResult};
use crate::models::{BookTitle, Loan, LoanListing, NewLoan, StudentName};

/// All loans, newest first, with the borrower's name and the book title.
pub fn fetch_loans(conn: &Connection) -> BackendResult<Vec<LoanListing>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.student_enrollment, l.book_id, l.loan_date, l.return_date,
                s.name, b.title
         FROM loans l
         LEFT JOIN students s ON s.enrollment = l.student_enrollment
         LEFT JOIN books b ON b.id = l.book_id
         ORDER BY l.loan_date DESC, l.id DESC",
    )?;

    let loans = stmt
        .query_map([], |row| {
            let student_name: Option<String> = row.get(5)?;
            let book_title: Option<String> = row.get(6)?;
            Ok(LoanListing {
                loan: Loan {
                    id: row.get(0)?,
                    student_enrollment: row.get(1)?,
                    book_id: row.get(2)?,
                    loan_date: row.get(3)?,
                    return_date: row.get(4)?,
                },
                student: student_name.map(|name| StudentName { name }),
                book: book_title.map(|title| BookTitle { title }),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(loans)
}

pub fn create_loan(conn: &Connection, loan: &NewLoan) -> BackendResult<()> {
    conn.execute(
        "INSERT INTO loans (student_enrollment, book_id, loan_date) VALUES (?1, ?2, ?3)",
        params![loan.student_enrollment, loan.book_id, loan.loan_date],
    )
    .map_err(|err| {
        if matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation)) {
            BackendError::remote("Loan points at an unknown student or book.")
        } else {
            err.into()
        }
    })?;
    Ok(())
}

pub fn set_loan_returned(conn: &Connection, id: i64, returned_on: NaiveDate) -> BackendResult<()> {
    let updated = conn.execute(
        "UPDATE loans SET return_date = ?1 WHERE id = ?2",
        params![returned_on, id],
    )?;

    if updated == 0 {
        Err(BackendError::NotFound(format!("Loan {id}")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{books, open_in_memory, students};
    use crate::models::{BookDraft, Student};

    fn seed(conn: &Connection) -> i64 {
        students::create_student(
            conn,
            &Student {
                enrollment: "2021001".into(),
                name: "Ana".into(),
                birth_date: None,
                email: String::new(),
                scholarship: true,
            },
        )
        .unwrap();
        books::create_book(
            conn,
            &BookDraft {
                title: "Cálculo I".into(),
                quantity: 2,
                author_id: None,
                subject_id: None,
            },
        )
        .unwrap();
        books::fetch_books(conn).unwrap()[0].book.id
    }

    #[test]
    fn loans_carry_display_names_and_return_state() {
        let conn = open_in_memory().unwrap();
        let book_id = seed(&conn);
        let lent = NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();
        create_loan(
            &conn,
            &NewLoan {
                student_enrollment: "2021001".into(),
                book_id,
                loan_date: lent,
            },
        )
        .unwrap();

        let loans = fetch_loans(&conn).unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].student_name(), "Ana");
        assert_eq!(loans[0].book_title(), "Cálculo I");
        assert!(loans[0].loan.is_outstanding());

        let back = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        set_loan_returned(&conn, loans[0].loan.id, back).unwrap();
        assert_eq!(fetch_loans(&conn).unwrap()[0].loan.return_date, Some(back));
    }

    #[test]
    fn student_with_loans_cannot_be_deleted() {
        let conn = open_in_memory().unwrap();
        let book_id = seed(&conn);
        create_loan(
            &conn,
            &NewLoan {
                student_enrollment: "2021001".into(),
                book_id,
                loan_date: NaiveDate::from_ymd_opt(2024, 8, 20).unwrap(),
            },
        )
        .unwrap();

        let err = students::delete_student(&conn, "2021001").unwrap_err();
        assert_eq!(err.to_string(), "Student 2021001 still has loans on record.");
    }

    #[test]
    fn unknown_references_are_rejected() {
        let conn = open_in_memory().unwrap();
        let result = create_loan(
            &conn,
            &NewLoan {
                student_enrollment: "ghost".into(),
                book_id: 42,
                loan_date: NaiveDate::from_ymd_opt(2024, 8, 20).unwrap(),
            },
        );
        assert!(matches!(result, Err(BackendError::Remote { .. })));
    }
}
