use crate::models::{BookListing, LoanListing, Student};

/// Rows that the inline search can narrow. `needle` is already lowercased.
pub(crate) trait Searchable: Clone {
    fn matches(&self, needle: &str) -> bool;
}

impl Searchable for Student {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }
}

impl Searchable for BookListing {
    fn matches(&self, needle: &str) -> bool {
        self.book.title.to_lowercase().contains(needle)
    }
}

impl Searchable for LoanListing {
    fn matches(&self, needle: &str) -> bool {
        self.student_name().to_lowercase().contains(needle)
            || self.book_title().to_lowercase().contains(needle)
    }
}

/// One section's rows as last fetched, the search-narrowed view of them, and
/// the inline error from the last failed call.
pub(crate) struct ListScreen<T> {
    pub(crate) items: Vec<T>,
    pub(crate) filtered: Vec<T>,
    pub(crate) filter: Option<String>,
    pub(crate) selected: usize,
    pub(crate) error: Option<String>,
    pub(crate) loaded: bool,
}

impl<T> Default for ListScreen<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            filtered: Vec::new(),
            filter: None,
            selected: 0,
            error: None,
            loaded: false,
        }
    }
}

impl<T: Searchable> ListScreen<T> {
    pub(crate) fn apply_filter(&mut self) {
        self.filtered = match &self.filter {
            Some(query) if !query.trim().is_empty() => {
                let needle = query.to_lowercase();
                self.items
                    .iter()
                    .filter(|item| item.matches(&needle))
                    .cloned()
                    .collect()
            }
            _ => self.items.clone(),
        };
        self.ensure_in_bounds();
    }

    pub(crate) fn set_filter(&mut self, filter: Option<String>) {
        self.filter = filter;
        self.apply_filter();
    }

    /// Replace the rows with a fresh fetch. Clears any earlier error.
    pub(crate) fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.error = None;
        self.loaded = true;
        self.apply_filter();
    }

    /// Record a failure without touching the rows already on screen.
    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub(crate) fn has_search(&self) -> bool {
        self.filter
            .as_ref()
            .map(|q| !q.trim().is_empty())
            .unwrap_or(false)
    }

    pub(crate) fn current(&self) -> Option<&T> {
        self.filtered.get(self.selected)
    }

    /// Select the first visible row matching `predicate`, if any.
    pub(crate) fn focus(&mut self, predicate: impl Fn(&T) -> bool) {
        if let Some(index) = self.filtered.iter().position(predicate) {
            self.selected = index;
        }
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.filtered.is_empty() {
            return;
        }
        let len = self.filtered.len() as isize;
        self.selected = (self.selected as isize + offset).clamp(0, len - 1) as usize;
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        self.selected = self.filtered.len().saturating_sub(1);
    }

    pub(crate) fn ensure_in_bounds(&mut self) {
        if self.filtered.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.filtered.len() {
            self.selected = self.filtered.len() - 1;
        }
    }
}

/// Sidebar entries of the home view.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Section {
    Students,
    Books,
    Loans,
}

impl Section {
    pub(crate) const ALL: [Section; 3] = [Section::Students, Section::Books, Section::Loans];

    pub(crate) fn title(self) -> &'static str {
        match self {
            Section::Students => "Students",
            Section::Books => "Books",
            Section::Loans => "Loans",
        }
    }

    /// Lowercase noun used in status messages.
    pub(crate) fn noun(self) -> &'static str {
        match self {
            Section::Students => "students",
            Section::Books => "books",
            Section::Loans => "loans",
        }
    }

    pub(crate) fn next(self) -> Self {
        match self {
            Section::Students => Section::Books,
            Section::Books => Section::Loans,
            Section::Loans => Section::Students,
        }
    }

    pub(crate) fn previous(self) -> Self {
        match self {
            Section::Students => Section::Loans,
            Section::Books => Section::Students,
            Section::Loans => Section::Books,
        }
    }
}

/// Everything shown after login.
pub(crate) struct HomeScreen {
    pub(crate) email: String,
    pub(crate) section: Section,
    pub(crate) students: ListScreen<Student>,
    pub(crate) books: ListScreen<BookListing>,
    pub(crate) loans: ListScreen<LoanListing>,
}

impl HomeScreen {
    pub(crate) fn new(email: String) -> Self {
        Self {
            email,
            section: Section::Students,
            students: ListScreen::default(),
            books: ListScreen::default(),
            loans: ListScreen::default(),
        }
    }

    pub(crate) fn set_filter(&mut self, section: Section, filter: Option<String>) {
        match section {
            Section::Students => self.students.set_filter(filter),
            Section::Books => self.books.set_filter(filter),
            Section::Loans => self.loans.set_filter(filter),
        }
    }

    pub(crate) fn filter(&self, section: Section) -> Option<&String> {
        match section {
            Section::Students => self.students.filter.as_ref(),
            Section::Books => self.books.filter.as_ref(),
            Section::Loans => self.loans.filter.as_ref(),
        }
    }

    pub(crate) fn set_error(&mut self, section: Section, message: impl Into<String>) {
        match section {
            Section::Students => self.students.set_error(message),
            Section::Books => self.books.set_error(message),
            Section::Loans => self.loans.set_error(message),
        }
    }

    /// Apply a selection movement to the visible section.
    pub(crate) fn move_selection(&mut self, offset: isize) {
        match self.section {
            Section::Students => self.students.move_selection(offset),
            Section::Books => self.books.move_selection(offset),
            Section::Loans => self.loans.move_selection(offset),
        }
    }

    pub(crate) fn select_first(&mut self) {
        match self.section {
            Section::Students => self.students.select_first(),
            Section::Books => self.books.select_first(),
            Section::Loans => self.loans.select_first(),
        }
    }

    pub(crate) fn select_last(&mut self) {
        match self.section {
            Section::Students => self.students.select_last(),
            Section::Books => self.books.select_last(),
            Section::Loans => self.loans.select_last(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, BookTitle, Loan, StudentName};
    use chrono::NaiveDate;

    fn student(enrollment: &str, name: &str) -> Student {
        Student {
            enrollment: enrollment.into(),
            name: name.into(),
            birth_date: None,
            email: String::new(),
            scholarship: false,
        }
    }

    fn loan(id: i64, student: &str, title: &str) -> LoanListing {
        LoanListing {
            loan: Loan {
                id,
                student_enrollment: format!("{id}"),
                book_id: id,
                loan_date: NaiveDate::from_ymd_opt(2024, 8, 20).unwrap(),
                return_date: None,
            },
            student: Some(StudentName {
                name: student.into(),
            }),
            book: Some(BookTitle {
                title: title.into(),
            }),
        }
    }

    #[test]
    fn student_search_is_case_insensitive_on_name() {
        let mut screen = ListScreen::default();
        screen.set_items(vec![
            student("1", "Ana Souza"),
            student("2", "Bruno Lima"),
            student("3", "Mariana"),
        ]);

        screen.set_filter(Some("ANA".into()));
        let names: Vec<&str> = screen.filtered.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ana Souza", "Mariana"]);

        screen.set_filter(Some("2".into()));
        assert!(screen.filtered.is_empty());

        screen.set_filter(None);
        assert_eq!(screen.filtered.len(), 3);
    }

    #[test]
    fn book_search_matches_title_only() {
        let listing = BookListing {
            book: Book {
                id: 1,
                title: "Cálculo I".into(),
                quantity: 1,
                author_id: None,
                subject_id: None,
            },
            author: None,
            subject: None,
        };
        assert!(listing.matches("cálculo"));
        assert!(!listing.matches("stewart"));
    }

    #[test]
    fn loan_search_matches_student_or_title() {
        let mut screen = ListScreen::default();
        screen.set_items(vec![
            loan(1, "Ana", "Física Básica"),
            loan(2, "Bruno", "Cálculo I"),
        ]);

        screen.set_filter(Some("física".into()));
        assert_eq!(screen.filtered.len(), 1);
        screen.set_filter(Some("bruno".into()));
        assert_eq!(screen.filtered[0].loan.id, 2);
    }

    #[test]
    fn errors_keep_rows_and_refetch_clears_them() {
        let mut screen = ListScreen::default();
        screen.set_items(vec![student("1", "Ana")]);
        screen.set_error("Failed to delete student: boom");
        assert_eq!(screen.items.len(), 1);
        assert!(screen.error.is_some());

        screen.set_items(vec![student("1", "Ana"), student("2", "Bia")]);
        assert!(screen.error.is_none());
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut screen = ListScreen::default();
        screen.set_items(vec![student("1", "Ana"), student("2", "Bia")]);
        screen.move_selection(10);
        assert_eq!(screen.selected, 1);
        screen.move_selection(-10);
        assert_eq!(screen.selected, 0);

        screen.select_last();
        screen.set_items(vec![student("1", "Ana")]);
        assert_eq!(screen.selected, 0);
    }
}
