use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::models::{Author, BookDraft, BookListing, Loan, LoanListing, Student, Subject};

/// Input format for dates typed into forms.
pub(crate) const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Shared rendering for a `Label: value` form row. Empty required values show
/// a dim placeholder; the focused row is yellow.
fn field_line(
    field_name: &str,
    value: &str,
    placeholder: &str,
    is_active: bool,
) -> Line<'static> {
    let display = if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    };

    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else if value.is_empty() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::raw(format!("{field_name}: ")),
        Span::styled(display, style),
    ])
}

/// Login view state.
#[derive(Default, Clone)]
pub(crate) struct LoginForm {
    pub(crate) email: String,
    pub(crate) password: String,
    pub(crate) active: LoginField,
    pub(crate) error: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum LoginField {
    #[default]
    Email,
    Password,
}

impl LoginForm {
    pub(crate) fn toggle_field(&mut self) {
        self.active = match self.active {
            LoginField::Email => LoginField::Password,
            LoginField::Password => LoginField::Email,
        };
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        match self.active {
            LoginField::Email => self.email.push(ch),
            LoginField::Password => self.password.push(ch),
        }
        true
    }

    pub(crate) fn backspace(&mut self) {
        match self.active {
            LoginField::Email => {
                self.email.pop();
            }
            LoginField::Password => {
                self.password.pop();
            }
        }
    }

    /// The password row never shows what was typed.
    pub(crate) fn build_line(&self, field_name: &str, field: LoginField) -> Line<'static> {
        let is_active = self.active == field;
        match field {
            LoginField::Email => field_line(field_name, &self.email, "<required>", is_active),
            LoginField::Password => {
                let masked = "*".repeat(self.password.chars().count());
                field_line(field_name, &masked, "<required>", is_active)
            }
        }
    }

    pub(crate) fn value_len(&self, field: LoginField) -> usize {
        match field {
            LoginField::Email => self.email.chars().count(),
            LoginField::Password => self.password.chars().count(),
        }
    }
}

/// Add/edit state for a student. When `enrollment_locked` is set the key
/// column cannot be focused or changed.
#[derive(Default, Clone)]
pub(crate) struct StudentForm {
    pub(crate) enrollment: String,
    pub(crate) name: String,
    pub(crate) birth_date: String,
    pub(crate) email: String,
    pub(crate) scholarship: bool,
    pub(crate) enrollment_locked: bool,
    pub(crate) active: StudentField,
    pub(crate) error: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum StudentField {
    #[default]
    Enrollment,
    Name,
    BirthDate,
    Email,
    Scholarship,
}

impl StudentField {
    const ORDER: [StudentField; 5] = [
        StudentField::Enrollment,
        StudentField::Name,
        StudentField::BirthDate,
        StudentField::Email,
        StudentField::Scholarship,
    ];
}

impl StudentForm {
    pub(crate) fn from_student(student: &Student) -> Self {
        Self {
            enrollment: student.enrollment.clone(),
            name: student.name.clone(),
            birth_date: student
                .birth_date
                .map(|date| date.format(INPUT_DATE_FORMAT).to_string())
                .unwrap_or_default(),
            email: student.email.clone(),
            scholarship: student.scholarship,
            enrollment_locked: true,
            active: StudentField::Name,
            error: None,
        }
    }

    /// Move focus forward (`1`) or backward (`-1`), skipping a locked
    /// enrollment.
    pub(crate) fn cycle_field(&mut self, step: isize) {
        let len = StudentField::ORDER.len() as isize;
        let mut index = StudentField::ORDER
            .iter()
            .position(|field| *field == self.active)
            .unwrap_or(0) as isize;
        loop {
            index = (index + step).rem_euclid(len);
            let field = StudentField::ORDER[index as usize];
            if !(self.enrollment_locked && field == StudentField::Enrollment) {
                self.active = field;
                break;
            }
        }
    }

    pub(crate) fn toggle_scholarship(&mut self) {
        self.scholarship = !self.scholarship;
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        match self.active {
            StudentField::Enrollment => self.enrollment.push(ch),
            StudentField::Name => self.name.push(ch),
            StudentField::BirthDate => {
                if ch.is_ascii_digit() || ch == '-' {
                    self.birth_date.push(ch);
                } else {
                    return false;
                }
            }
            StudentField::Email => self.email.push(ch),
            StudentField::Scholarship => {
                if ch == ' ' {
                    self.toggle_scholarship();
                } else {
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn backspace(&mut self) {
        match self.active {
            StudentField::Enrollment => {
                self.enrollment.pop();
            }
            StudentField::Name => {
                self.name.pop();
            }
            StudentField::BirthDate => {
                self.birth_date.pop();
            }
            StudentField::Email => {
                self.email.pop();
            }
            StudentField::Scholarship => {}
        }
    }

    pub(crate) fn parse_inputs(&self) -> Result<Student> {
        let enrollment = self.enrollment.trim();
        if enrollment.is_empty() {
            return Err(anyhow!("Enrollment is required."));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(anyhow!("Name is required."));
        }
        let birth_date = match self.birth_date.trim() {
            "" => None,
            raw => Some(
                NaiveDate::parse_from_str(raw, INPUT_DATE_FORMAT)
                    .map_err(|_| anyhow!("Birth date must be YYYY-MM-DD."))?,
            ),
        };
        Ok(Student {
            enrollment: enrollment.to_string(),
            name: name.to_string(),
            birth_date,
            email: self.email.trim().to_string(),
            scholarship: self.scholarship,
        })
    }

    pub(crate) fn build_line(&self, field_name: &str, field: StudentField) -> Line<'static> {
        let is_active = self.active == field;
        match field {
            StudentField::Enrollment if self.enrollment_locked => Line::from(vec![
                Span::raw(format!("{field_name}: ")),
                Span::styled(self.enrollment.clone(), Style::default().fg(Color::Gray)),
            ]),
            StudentField::Enrollment => {
                field_line(field_name, &self.enrollment, "<required>", is_active)
            }
            StudentField::Name => field_line(field_name, &self.name, "<required>", is_active),
            StudentField::BirthDate => {
                field_line(field_name, &self.birth_date, "YYYY-MM-DD", is_active)
            }
            StudentField::Email => field_line(field_name, &self.email, "<optional>", is_active),
            StudentField::Scholarship => {
                let value = if self.scholarship { "[x] Yes" } else { "[ ] No" };
                field_line(field_name, value, "", is_active)
            }
        }
    }

    pub(crate) fn value_len(&self, field: StudentField) -> usize {
        match field {
            StudentField::Enrollment => self.enrollment.chars().count(),
            StudentField::Name => self.name.chars().count(),
            StudentField::BirthDate => self.birth_date.chars().count(),
            StudentField::Email => self.email.chars().count(),
            StudentField::Scholarship => 0,
        }
    }
}

/// One choice in a picker: the key that gets stored plus the text shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PickerOption<K> {
    pub(crate) key: K,
    pub(crate) label: String,
}

/// A one-line dropdown cycled with Left/Right. The selection is the option's
/// key, so two options with the same label stay distinct.
#[derive(Clone, Debug)]
pub(crate) struct Picker<K> {
    pub(crate) options: Vec<PickerOption<K>>,
    pub(crate) selected: Option<usize>,
}

impl<K> Default for Picker<K> {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            selected: None,
        }
    }
}

impl<K: PartialEq + Clone> Picker<K> {
    pub(crate) fn new(options: Vec<PickerOption<K>>, current: Option<&K>) -> Self {
        let selected = current.and_then(|key| options.iter().position(|o| &o.key == key));
        Self { options, selected }
    }

    /// Like [`Picker::new`], but a `current` key that is not among `options`
    /// is kept as an extra option instead of silently becoming "none".
    pub(crate) fn keeping(
        mut options: Vec<PickerOption<K>>,
        current: Option<&K>,
        missing_label: impl FnOnce(&K) -> String,
    ) -> Self {
        if let Some(key) = current {
            if !options.iter().any(|option| &option.key == key) {
                options.push(PickerOption {
                    key: key.clone(),
                    label: missing_label(key),
                });
            }
        }
        Self::new(options, current)
    }

    /// Step through the options; `None` (nothing chosen) sits before the
    /// first option.
    pub(crate) fn cycle(&mut self, step: isize) {
        if self.options.is_empty() {
            return;
        }
        let slots = self.options.len() as isize + 1;
        let current = self.selected.map(|i| i as isize + 1).unwrap_or(0);
        let next = (current + step).rem_euclid(slots);
        self.selected = if next == 0 {
            None
        } else {
            Some(next as usize - 1)
        };
    }

    pub(crate) fn selected_key(&self) -> Option<K> {
        self.selected
            .and_then(|i| self.options.get(i))
            .map(|option| option.key.clone())
    }

    pub(crate) fn selected_label(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.options.get(i))
            .map(|option| option.label.as_str())
    }

    fn display(&self) -> String {
        match self.selected_label() {
            Some(label) => format!("< {label} >"),
            None if self.options.is_empty() => String::new(),
            None => "< none >".to_string(),
        }
    }
}

/// Label for a reference the fetched list no longer contains.
fn unlisted_label(name: &str, noun: &str, id: i64) -> String {
    if name.is_empty() {
        format!("unknown {noun} #{id}")
    } else {
        format!("{name} (#{id})")
    }
}

/// Add/edit state for a book.
#[derive(Default, Clone)]
pub(crate) struct BookForm {
    pub(crate) title: String,
    pub(crate) quantity: String,
    pub(crate) author: Picker<i64>,
    pub(crate) subject: Picker<i64>,
    pub(crate) active: BookField,
    pub(crate) error: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum BookField {
    #[default]
    Title,
    Quantity,
    Author,
    Subject,
}

impl BookForm {
    pub(crate) fn new(authors: &[Author], subjects: &[Subject]) -> Self {
        Self {
            author: Picker::new(author_options(authors), None),
            subject: Picker::new(subject_options(subjects), None),
            ..Self::default()
        }
    }

    pub(crate) fn from_listing(
        listing: &BookListing,
        authors: &[Author],
        subjects: &[Subject],
    ) -> Self {
        let book = &listing.book;
        Self {
            title: book.title.clone(),
            quantity: book.quantity.to_string(),
            author: Picker::keeping(author_options(authors), book.author_id.as_ref(), |id| {
                unlisted_label(listing.author_name(), "author", *id)
            }),
            subject: Picker::keeping(
                subject_options(subjects),
                book.subject_id.as_ref(),
                |id| unlisted_label(listing.subject_name(), "subject", *id),
            ),
            active: BookField::Title,
            error: None,
        }
    }

    pub(crate) fn cycle_field(&mut self, step: isize) {
        const ORDER: [BookField; 4] = [
            BookField::Title,
            BookField::Quantity,
            BookField::Author,
            BookField::Subject,
        ];
        let index = ORDER.iter().position(|f| *f == self.active).unwrap_or(0) as isize;
        self.active = ORDER[(index + step).rem_euclid(ORDER.len() as isize) as usize];
    }

    /// Left/Right on a picker row.
    pub(crate) fn cycle_choice(&mut self, step: isize) {
        match self.active {
            BookField::Author => self.author.cycle(step),
            BookField::Subject => self.subject.cycle(step),
            BookField::Title | BookField::Quantity => {}
        }
    }

    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        match self.active {
            BookField::Title if !ch.is_control() => {
                self.title.push(ch);
                true
            }
            BookField::Quantity if ch.is_ascii_digit() => {
                self.quantity.push(ch);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn backspace(&mut self) {
        match self.active {
            BookField::Title => {
                self.title.pop();
            }
            BookField::Quantity => {
                self.quantity.pop();
            }
            BookField::Author | BookField::Subject => {}
        }
    }

    pub(crate) fn parse_inputs(&self) -> Result<BookDraft> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(anyhow!("Title is required."));
        }
        let quantity_raw = self.quantity.trim();
        if quantity_raw.is_empty() {
            return Err(anyhow!("Quantity is required."));
        }
        let quantity = quantity_raw
            .parse::<i64>()
            .map_err(|_| anyhow!("Quantity must be a whole number."))?;
        Ok(BookDraft {
            title: title.to_string(),
            quantity,
            author_id: self.author.selected_key(),
            subject_id: self.subject.selected_key(),
        })
    }

    pub(crate) fn build_line(&self, field_name: &str, field: BookField) -> Line<'static> {
        let is_active = self.active == field;
        match field {
            BookField::Title => field_line(field_name, &self.title, "<required>", is_active),
            BookField::Quantity => field_line(field_name, &self.quantity, "<required>", is_active),
            BookField::Author => {
                field_line(field_name, &self.author.display(), "<no authors>", is_active)
            }
            BookField::Subject => {
                field_line(field_name, &self.subject.display(), "<no subjects>", is_active)
            }
        }
    }

    pub(crate) fn value_len(&self, field: BookField) -> usize {
        match field {
            BookField::Title => self.title.chars().count(),
            BookField::Quantity => self.quantity.chars().count(),
            BookField::Author | BookField::Subject => 0,
        }
    }
}

fn author_options(authors: &[Author]) -> Vec<PickerOption<i64>> {
    authors
        .iter()
        .map(|author| PickerOption {
            key: author.id,
            label: author.name.clone(),
        })
        .collect()
}

fn subject_options(subjects: &[Subject]) -> Vec<PickerOption<i64>> {
    subjects
        .iter()
        .map(|subject| PickerOption {
            key: subject.id,
            label: subject.name.clone(),
        })
        .collect()
}

/// New-loan state: who borrows which book.
#[derive(Default, Clone)]
pub(crate) struct LoanForm {
    pub(crate) student: Picker<String>,
    pub(crate) book: Picker<i64>,
    pub(crate) active: LoanField,
    pub(crate) error: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum LoanField {
    #[default]
    Student,
    Book,
}

impl LoanForm {
    pub(crate) fn new(students: &[Student], books: &[BookListing]) -> Self {
        let students = students
            .iter()
            .map(|student| PickerOption {
                key: student.enrollment.clone(),
                label: student.to_string(),
            })
            .collect();
        let books = books
            .iter()
            .map(|listing| PickerOption {
                key: listing.book.id,
                label: format!("{} ({} on shelf)", listing.book.title, listing.book.quantity),
            })
            .collect();
        Self {
            student: Picker::new(students, None),
            book: Picker::new(books, None),
            active: LoanField::Student,
            error: None,
        }
    }

    pub(crate) fn toggle_field(&mut self) {
        self.active = match self.active {
            LoanField::Student => LoanField::Book,
            LoanField::Book => LoanField::Student,
        };
    }

    pub(crate) fn cycle_choice(&mut self, step: isize) {
        match self.active {
            LoanField::Student => self.student.cycle(step),
            LoanField::Book => self.book.cycle(step),
        }
    }

    pub(crate) fn parse_inputs(&self) -> Result<(String, i64)> {
        let student = self
            .student
            .selected_key()
            .ok_or_else(|| anyhow!("Student is required."))?;
        let book = self
            .book
            .selected_key()
            .ok_or_else(|| anyhow!("Book is required."))?;
        Ok((student, book))
    }

    pub(crate) fn build_line(&self, field_name: &str, field: LoanField) -> Line<'static> {
        let is_active = self.active == field;
        match field {
            LoanField::Student => {
                field_line(field_name, &self.student.display(), "<no students>", is_active)
            }
            LoanField::Book => field_line(field_name, &self.book.display(), "<no books>", is_active),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ConfirmStudentDelete {
    pub(crate) enrollment: String,
    pub(crate) name: String,
}

impl From<&Student> for ConfirmStudentDelete {
    fn from(student: &Student) -> Self {
        Self {
            enrollment: student.enrollment.clone(),
            name: student.name.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ConfirmBookDelete {
    pub(crate) id: i64,
    pub(crate) title: String,
}

impl From<&BookListing> for ConfirmBookDelete {
    fn from(listing: &BookListing) -> Self {
        Self {
            id: listing.book.id,
            title: listing.book.title.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ConfirmReturn {
    pub(crate) loan: Loan,
    pub(crate) student_name: String,
    pub(crate) book_title: String,
}

impl From<&LoanListing> for ConfirmReturn {
    fn from(listing: &LoanListing) -> Self {
        Self {
            loan: listing.loan.clone(),
            student_name: listing.student_name().to_string(),
            book_title: listing.book_title().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authors() -> Vec<Author> {
        vec![
            Author {
                id: 1,
                name: "Silva".into(),
            },
            Author {
                id: 2,
                name: "Silva".into(),
            },
        ]
    }

    #[test]
    fn password_is_masked() {
        let mut form = LoginForm::default();
        form.toggle_field();
        for ch in "hunter2".chars() {
            form.push_char(ch);
        }
        let line = form.build_line("Password", LoginField::Password);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "Password: *******");
        assert_eq!(form.password, "hunter2");
    }

    #[test]
    fn student_form_requires_enrollment_and_name() {
        let mut form = StudentForm::default();
        assert_eq!(
            form.parse_inputs().unwrap_err().to_string(),
            "Enrollment is required."
        );
        form.enrollment = "2021001".into();
        assert_eq!(
            form.parse_inputs().unwrap_err().to_string(),
            "Name is required."
        );
        form.name = "Ana".into();
        let student = form.parse_inputs().unwrap();
        assert_eq!(student.birth_date, None);
        assert!(!student.scholarship);
    }

    #[test]
    fn student_form_parses_birth_date() {
        let mut form = StudentForm {
            enrollment: "2021001".into(),
            name: "Ana".into(),
            birth_date: "2003-13-01".into(),
            ..StudentForm::default()
        };
        assert_eq!(
            form.parse_inputs().unwrap_err().to_string(),
            "Birth date must be YYYY-MM-DD."
        );
        form.birth_date = "2003-04-09".into();
        assert_eq!(
            form.parse_inputs().unwrap().birth_date,
            NaiveDate::from_ymd_opt(2003, 4, 9)
        );
    }

    #[test]
    fn editing_skips_the_locked_enrollment() {
        let student = Student {
            enrollment: "2021001".into(),
            name: "Ana".into(),
            birth_date: None,
            email: String::new(),
            scholarship: true,
        };
        let mut form = StudentForm::from_student(&student);
        assert_eq!(form.active, StudentField::Name);
        form.cycle_field(-1);
        assert_eq!(form.active, StudentField::Scholarship);
        form.cycle_field(1);
        assert_eq!(form.active, StudentField::Name);

        form.active = StudentField::Scholarship;
        assert!(form.push_char(' '));
        assert!(!form.parse_inputs().unwrap().scholarship);
    }

    #[test]
    fn picker_keeps_ids_for_duplicate_names() {
        let mut picker = Picker::new(author_options(&authors()), Some(&2));
        assert_eq!(picker.selected_key(), Some(2));

        picker.cycle(-1);
        assert_eq!(picker.selected_key(), Some(1));
        picker.cycle(-1);
        assert_eq!(picker.selected_key(), None);
        picker.cycle(-1);
        assert_eq!(picker.selected_key(), Some(2));
    }

    #[test]
    fn book_form_builds_a_draft_from_picked_ids() {
        let subjects = vec![Subject {
            id: 9,
            name: "Cálculo".into(),
        }];
        let mut form = BookForm::new(&authors(), &subjects);
        for ch in "Cálculo I".chars() {
            form.push_char(ch);
        }
        form.cycle_field(1);
        assert!(!form.push_char('x'));
        form.push_char('3');
        form.cycle_field(1);
        form.cycle_choice(1);
        form.cycle_choice(1);
        form.cycle_field(1);
        form.cycle_choice(1);

        let draft = form.parse_inputs().unwrap();
        assert_eq!(draft.title, "Cálculo I");
        assert_eq!(draft.quantity, 3);
        assert_eq!(draft.author_id, Some(2));
        assert_eq!(draft.subject_id, Some(9));
    }

    #[test]
    fn editing_keeps_references_missing_from_the_lists() {
        let listing = BookListing {
            book: crate::models::Book {
                id: 4,
                title: "Álgebra".into(),
                quantity: 1,
                author_id: Some(30),
                subject_id: Some(40),
            },
            author: Some(Author {
                id: 30,
                name: "Boldrini".into(),
            }),
            subject: None,
        };

        let form = BookForm::from_listing(&listing, &authors(), &[]);
        assert_eq!(form.author.selected_label(), Some("Boldrini (#30)"));
        assert_eq!(form.subject.selected_label(), Some("unknown subject #40"));

        let draft = form.parse_inputs().unwrap();
        assert_eq!(draft.author_id, Some(30));
        assert_eq!(draft.subject_id, Some(40));
    }

    #[test]
    fn loan_form_requires_both_choices() {
        let students = vec![Student {
            enrollment: "2021001".into(),
            name: "Ana".into(),
            birth_date: None,
            email: String::new(),
            scholarship: false,
        }];
        let mut form = LoanForm::new(&students, &[]);
        assert_eq!(
            form.parse_inputs().unwrap_err().to_string(),
            "Student is required."
        );
        form.cycle_choice(1);
        assert_eq!(
            form.parse_inputs().unwrap_err().to_string(),
            "Book is required."
        );
    }
}
