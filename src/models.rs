//! Row types mirrored from the library tables. Field names are English in
//! Rust; the serde renames carry the column names used by the hosted tables so
//! the same structs decode PostgREST responses and encode insert/update bodies.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Treat JSON `null` as the type's default. Hosted rows are populated by hand
/// and frequently carry nulls in text columns the UI expects to be strings.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A registered student. `enrollment` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "matricula")]
    pub enrollment: String,
    #[serde(rename = "nome", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "data_nasc", default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(rename = "bolsista", default, deserialize_with = "null_as_default")]
    pub scholarship: bool,
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.enrollment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    #[serde(rename = "nome", default, deserialize_with = "null_as_default")]
    pub name: String,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    #[serde(rename = "nome_materia", default, deserialize_with = "null_as_default")]
    pub name: String,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A book row without joined display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    #[serde(rename = "titulo", default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(rename = "quantidade", default, deserialize_with = "null_as_default")]
    pub quantity: i64,
    #[serde(rename = "id_autor", default)]
    pub author_id: Option<i64>,
    #[serde(rename = "id_materia", default)]
    pub subject_id: Option<i64>,
}

impl Book {
    /// Editable columns of this row, ready to be sent back as an update.
    pub fn draft(&self) -> BookDraft {
        BookDraft {
            title: self.title.clone(),
            quantity: self.quantity,
            author_id: self.author_id,
            subject_id: self.subject_id,
        }
    }
}

/// Insert/update payload for a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookDraft {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "quantidade")]
    pub quantity: i64,
    #[serde(rename = "id_autor")]
    pub author_id: Option<i64>,
    #[serde(rename = "id_materia")]
    pub subject_id: Option<i64>,
}

/// A book joined with its author and subject for the list screen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookListing {
    #[serde(flatten)]
    pub book: Book,
    #[serde(rename = "autor", default)]
    pub author: Option<Author>,
    #[serde(rename = "materia", default)]
    pub subject: Option<Subject>,
}

impl BookListing {
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn subject_name(&self) -> &str {
        self.subject.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    #[serde(rename = "matricula_aluno")]
    pub student_enrollment: String,
    #[serde(rename = "id_livro")]
    pub book_id: i64,
    #[serde(rename = "data_aluguel")]
    pub loan_date: NaiveDate,
    #[serde(rename = "data_devolucao", default)]
    pub return_date: Option<NaiveDate>,
}

impl Loan {
    /// A loan is outstanding until a return date is recorded.
    pub fn is_outstanding(&self) -> bool {
        self.return_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLoan {
    #[serde(rename = "matricula_aluno")]
    pub student_enrollment: String,
    #[serde(rename = "id_livro")]
    pub book_id: i64,
    #[serde(rename = "data_aluguel")]
    pub loan_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StudentName {
    #[serde(rename = "nome", default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookTitle {
    #[serde(rename = "titulo", default, deserialize_with = "null_as_default")]
    pub title: String,
}

/// A loan joined with the borrower's name and the book title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoanListing {
    #[serde(flatten)]
    pub loan: Loan,
    #[serde(rename = "aluno", default)]
    pub student: Option<StudentName>,
    #[serde(rename = "livro", default)]
    pub book: Option<BookTitle>,
}

impl LoanListing {
    pub fn student_name(&self) -> &str {
        self.student.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }

    pub fn book_title(&self) -> &str {
        self.book.as_ref().map(|b| b.title.as_str()).unwrap_or("")
    }
}

/// An authenticated session. `expires_at` is a unix timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub email: String,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
