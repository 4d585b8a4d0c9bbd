use chrono::NaiveDate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{eq, RestClient};
use crate::backend::Backend;
use crate::error::{BackendError, BackendResult};
use crate::models::{
    Author, Book, BookDraft, BookListing, LoanListing, NewLoan, Session, Student, Subject,
};

const STUDENTS: &str = "aluno";
const AUTHORS: &str = "autor";
const SUBJECTS: &str = "materia";
const BOOKS: &str = "livros";
const LOANS: &str = "livros_alugados";

const BOOK_COLUMNS: &str = "id,titulo,quantidade,id_autor,id_materia";
pub(crate) const BOOK_LISTING: &str = "id,titulo,quantidade,id_autor,id_materia,\
autor:id_autor(id,nome),materia:id_materia(id,nome_materia)";
pub(crate) const LOAN_LISTING: &str = "id,matricula_aluno,id_livro,data_aluguel,data_devolucao,\
aluno:matricula_aluno(nome),livro:id_livro(titulo)";

/// `Prefer` for inserts, where nothing needs to come back.
const RETURN_MINIMAL: &str = "return=minimal";
/// `Prefer` for updates and deletes, so a key that matched nothing shows up as
/// an empty array instead of a silent success.
const RETURN_REPRESENTATION: &str = "return=representation";

impl RestClient {
    fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        filters: &[(&str, String)],
    ) -> BackendResult<Vec<T>> {
        let mut query = vec![("select", columns.to_string())];
        query.extend(filters.iter().map(|(column, value)| (*column, value.clone())));

        let request = self.table_request(Method::GET, table)?.query(&query);
        let rows: Vec<T> = self.send_table(request)?.json()?;
        debug!(table, rows = rows.len(), "fetched");
        Ok(rows)
    }

    fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> BackendResult<()> {
        let request = self
            .table_request(Method::POST, table)?
            .header("Prefer", RETURN_MINIMAL)
            .json(row);
        self.send_table(request)?;
        debug!(table, "inserted");
        Ok(())
    }

    /// Patch the rows where `column = key`; `what` names the row in the
    /// not-found error.
    fn patch<T: Serialize + ?Sized>(
        &self,
        table: &str,
        column: &str,
        key: String,
        body: &T,
        what: String,
    ) -> BackendResult<()> {
        let request = self
            .table_request(Method::PATCH, table)?
            .query(&[(column, key)])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(body);
        let touched: Vec<Value> = self.send_table(request)?.json()?;
        if touched.is_empty() {
            return Err(BackendError::NotFound(what));
        }
        debug!(table, "updated");
        Ok(())
    }

    fn remove(&self, table: &str, column: &str, key: String, what: String) -> BackendResult<()> {
        let request = self
            .table_request(Method::DELETE, table)?
            .query(&[(column, key)])
            .header("Prefer", RETURN_REPRESENTATION);
        let touched: Vec<Value> = self.send_table(request)?.json()?;
        if touched.is_empty() {
            return Err(BackendError::NotFound(what));
        }
        debug!(table, "deleted");
        Ok(())
    }
}

impl Backend for RestClient {
    fn sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        self.password_sign_in(email, password)
    }

    fn sign_out(&self) -> BackendResult<()> {
        self.revoke()
    }

    fn current_session(&self) -> BackendResult<Option<Session>> {
        self.stored_session()
    }

    fn fetch_students(&self) -> BackendResult<Vec<Student>> {
        self.select(STUDENTS, "*", &[])
    }

    fn create_student(&self, student: &Student) -> BackendResult<()> {
        self.insert(STUDENTS, student)
    }

    fn update_student(&self, enrollment: &str, student: &Student) -> BackendResult<()> {
        self.patch(
            STUDENTS,
            "matricula",
            eq(enrollment),
            student,
            format!("Student {enrollment}"),
        )
    }

    fn delete_student(&self, enrollment: &str) -> BackendResult<()> {
        self.remove(
            STUDENTS,
            "matricula",
            eq(enrollment),
            format!("Student {enrollment}"),
        )
    }

    fn fetch_authors(&self) -> BackendResult<Vec<Author>> {
        self.select(AUTHORS, "id,nome", &[])
    }

    fn fetch_subjects(&self) -> BackendResult<Vec<Subject>> {
        self.select(SUBJECTS, "id,nome_materia", &[])
    }

    fn fetch_books(&self) -> BackendResult<Vec<BookListing>> {
        self.select(BOOKS, BOOK_LISTING, &[])
    }

    fn fetch_book(&self, id: i64) -> BackendResult<Book> {
        self.select::<Book>(BOOKS, BOOK_COLUMNS, &[("id", eq(id))])?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("Book {id}")))
    }

    fn create_book(&self, draft: &BookDraft) -> BackendResult<()> {
        self.insert(BOOKS, draft)
    }

    fn update_book(&self, id: i64, draft: &BookDraft) -> BackendResult<()> {
        self.patch(BOOKS, "id", eq(id), draft, format!("Book {id}"))
    }

    fn delete_book(&self, id: i64) -> BackendResult<()> {
        self.remove(BOOKS, "id", eq(id), format!("Book {id}"))
    }

    fn fetch_loans(&self) -> BackendResult<Vec<LoanListing>> {
        self.select(LOANS, LOAN_LISTING, &[])
    }

    fn create_loan(&self, loan: &NewLoan) -> BackendResult<()> {
        self.insert(LOANS, loan)
    }

    fn set_loan_returned(&self, id: i64, returned_on: NaiveDate) -> BackendResult<()> {
        self.patch(
            LOANS,
            "id",
            eq(id),
            &json!({ "data_devolucao": returned_on }),
            format!("Loan {id}"),
        )
    }
}
