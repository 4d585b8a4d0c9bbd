use chrono::NaiveDate;
use tempfile::TempDir;

use library_admin::circulation::StockUpdate;
use library_admin::db::{self, SqliteBackend};
use library_admin::models::{BookDraft, Student};
use library_admin::session::SessionStore;
use library_admin::{Backend, BackendError};

const EMAIL: &str = "admin@ect.ufrn.br";
const PASSWORD: &str = "s3cret";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
        };
        let conn = db::open_database(&fixture.dir.path().join("library.sqlite")).unwrap();
        db::accounts::create_admin(&conn, EMAIL, PASSWORD).unwrap();
        db::books::create_author(&conn, "Stewart").unwrap();
        db::books::create_subject(&conn, "Cálculo").unwrap();
        fixture
    }

    /// A fresh backend over the same files, as a restarted panel would open.
    fn backend(&self) -> SqliteBackend {
        let conn = db::open_database(&self.dir.path().join("library.sqlite")).unwrap();
        SqliteBackend::new(
            conn,
            SessionStore::at(self.dir.path().join("session.json")),
        )
    }
}

fn ana() -> Student {
    Student {
        enrollment: "2021001".into(),
        name: "Ana Souza".into(),
        birth_date: NaiveDate::from_ymd_opt(2003, 4, 9),
        email: "ana@ufrn.br".into(),
        scholarship: true,
    }
}

#[test]
fn table_calls_require_a_session() {
    let fixture = Fixture::new();
    let backend = fixture.backend();

    assert!(matches!(
        backend.fetch_students(),
        Err(BackendError::Unauthenticated)
    ));
    assert_eq!(backend.current_session().unwrap(), None);
}

#[test]
fn session_survives_a_restart_until_sign_out() {
    let fixture = Fixture::new();
    let session = fixture.backend().sign_in(EMAIL, PASSWORD).unwrap();

    let restarted = fixture.backend();
    assert_eq!(restarted.current_session().unwrap(), Some(session));
    assert!(restarted.fetch_students().unwrap().is_empty());

    restarted.sign_out().unwrap();
    assert_eq!(fixture.backend().current_session().unwrap(), None);
}

#[test]
fn wrong_password_is_rejected() {
    let fixture = Fixture::new();
    let err = fixture.backend().sign_in(EMAIL, "nope").unwrap_err();
    assert_eq!(err.to_string(), "Invalid login credentials");
}

#[test]
fn student_and_book_crud() {
    let fixture = Fixture::new();
    let backend = fixture.backend();
    backend.sign_in(EMAIL, PASSWORD).unwrap();

    backend.create_student(&ana()).unwrap();
    let updated = Student {
        name: "Ana S. Lima".into(),
        ..ana()
    };
    backend.update_student("2021001", &updated).unwrap();
    assert_eq!(backend.fetch_students().unwrap(), vec![updated]);

    let author = backend.fetch_authors().unwrap().remove(0);
    let subject = backend.fetch_subjects().unwrap().remove(0);
    backend
        .create_book(&BookDraft {
            title: "Cálculo I".into(),
            quantity: 3,
            author_id: Some(author.id),
            subject_id: Some(subject.id),
        })
        .unwrap();
    let listing = backend.fetch_books().unwrap().remove(0);
    assert_eq!(listing.author_name(), "Stewart");
    assert_eq!(listing.subject_name(), "Cálculo");

    backend.delete_book(listing.book.id).unwrap();
    assert!(backend.fetch_books().unwrap().is_empty());
    assert!(matches!(
        backend.delete_book(listing.book.id),
        Err(BackendError::NotFound(_))
    ));

    backend.delete_student("2021001").unwrap();
    assert!(backend.fetch_students().unwrap().is_empty());
}

#[test]
fn lending_and_returning_track_stock() {
    let fixture = Fixture::new();
    let backend = fixture.backend();
    backend.sign_in(EMAIL, PASSWORD).unwrap();
    backend.create_student(&ana()).unwrap();
    backend
        .create_book(&BookDraft {
            title: "Física Básica".into(),
            quantity: 1,
            author_id: None,
            subject_id: None,
        })
        .unwrap();
    let book_id = backend.fetch_books().unwrap()[0].book.id;
    let day = NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();

    assert_eq!(
        backend.lend("2021001", book_id, day).unwrap(),
        StockUpdate::Adjusted
    );
    assert_eq!(backend.fetch_book(book_id).unwrap().quantity, 0);
    assert!(matches!(
        backend.lend("2021001", book_id, day),
        Err(BackendError::Rejected(_))
    ));

    let loan = backend.fetch_loans().unwrap().remove(0);
    assert_eq!(loan.student_name(), "Ana Souza");
    assert_eq!(loan.book_title(), "Física Básica");

    assert_eq!(
        backend.return_loan(&loan.loan, day).unwrap(),
        StockUpdate::Adjusted
    );
    assert_eq!(backend.fetch_book(book_id).unwrap().quantity, 1);

    let returned = backend.fetch_loans().unwrap().remove(0);
    assert_eq!(returned.loan.return_date, Some(day));
    assert!(backend.return_loan(&returned.loan, day).is_err());

    // Loans keep the student row referenced.
    assert!(backend.delete_student("2021001").is_err());
}

/// Make every stock change fail, the way a broken write would.
fn freeze_stock(backend: &SqliteBackend) {
    backend
        .connection()
        .execute_batch(
            "CREATE TRIGGER freeze_stock BEFORE UPDATE OF quantity ON books
             BEGIN SELECT RAISE(ABORT, 'stock is frozen'); END;",
        )
        .unwrap();
}

#[test]
fn failed_stock_change_rolls_the_loan_back() {
    let fixture = Fixture::new();
    let backend = fixture.backend();
    backend.sign_in(EMAIL, PASSWORD).unwrap();
    backend.create_student(&ana()).unwrap();
    backend
        .create_book(&BookDraft {
            title: "Física Básica".into(),
            quantity: 2,
            author_id: None,
            subject_id: None,
        })
        .unwrap();
    let book_id = backend.fetch_books().unwrap()[0].book.id;
    let day = NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();

    backend.lend("2021001", book_id, day).unwrap();
    freeze_stock(&backend);

    assert!(backend.lend("2021001", book_id, day).is_err());
    assert_eq!(backend.fetch_loans().unwrap().len(), 1);

    let loan = backend.fetch_loans().unwrap().remove(0);
    assert!(backend.return_loan(&loan.loan, day).is_err());
    assert!(backend.fetch_loans().unwrap()[0].loan.is_outstanding());
    assert_eq!(backend.fetch_book(book_id).unwrap().quantity, 1);
}
