use std::mem;

use anyhow::{Context, Result};
use crossterm::event::KeyCode;
use open::that as open_link;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap,
};
use ratatui::Frame;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::circulation::{self, StockUpdate};
use crate::models::{Author, BookListing, LoanListing, Student, Subject};

use super::forms::{
    BookField, BookForm, ConfirmBookDelete, ConfirmReturn, ConfirmStudentDelete, LoanField,
    LoanForm, LoginField, LoginForm, StudentField, StudentForm,
};
use super::helpers::{centered_rect, format_date, is_unauthenticated, surface_error, yes_no};
use super::screens::{HomeScreen, ListScreen, Searchable, Section};

/// Shown in the header and on the login view.
const APP_TITLE: &str = "Library ECT";
/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
const HEADER_HEIGHT: u16 = 3;
const SIDEBAR_WIDTH: u16 = 18;
/// Rows skipped by PageUp/PageDown.
const PAGE_STEP: isize = 10;
const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

/// Top-level route: the login view until a session exists, then home.
enum Screen {
    Login(LoginForm),
    Home(HomeScreen),
}

/// Modal state layered over the home view.
enum Mode {
    Normal,
    AddingStudent(StudentForm),
    EditingStudent { enrollment: String, form: StudentForm },
    ConfirmStudentDelete(ConfirmStudentDelete),
    AddingBook(BookForm),
    EditingBook { id: i64, form: BookForm },
    ConfirmBookDelete(ConfirmBookDelete),
    CreatingLoan(LoanForm),
    ConfirmReturn(ConfirmReturn),
    Searching(SearchState),
}

/// State for an active inline search.
struct SearchState {
    section: Section,
    query: String,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Warning,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Warning => Style::default().fg(Color::Yellow),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    backend: Box<dyn Backend>,
    screen: Screen,
    mode: Mode,
    status: Option<StatusMessage>,
}

impl App {
    /// Start on home when the backend still holds a session, otherwise on the
    /// login view.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        let mut app = Self {
            backend,
            screen: Screen::Login(LoginForm::default()),
            mode: Mode::Normal,
            status: None,
        };

        match app.backend.current_session() {
            Ok(Some(session)) => {
                info!(email = %session.email, "restored session");
                app.enter_home(session.email);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "could not restore session");
                app.set_status(
                    format!("Could not restore session: {err}"),
                    StatusKind::Error,
                );
            }
        }
        app
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mut mode = mem::replace(&mut self.mode, Mode::Normal);

        mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::AddingStudent(form) => self.handle_student_form(code, None, form)?,
            Mode::EditingStudent { enrollment, form } => {
                self.handle_student_form(code, Some(enrollment), form)?
            }
            Mode::ConfirmStudentDelete(confirm) => {
                self.handle_confirm_student_delete(code, confirm)?
            }
            Mode::AddingBook(form) => self.handle_book_form(code, None, form)?,
            Mode::EditingBook { id, form } => self.handle_book_form(code, Some(id), form)?,
            Mode::ConfirmBookDelete(confirm) => self.handle_confirm_book_delete(code, confirm)?,
            Mode::CreatingLoan(form) => self.handle_loan_form(code, form)?,
            Mode::ConfirmReturn(confirm) => self.handle_confirm_return(code, confirm)?,
            Mode::Searching(state) => self.handle_search(code, state)?,
        };

        // A handler that lost the session has already switched to the login view.
        if matches!(self.screen, Screen::Login(_)) {
            mode = Mode::Normal;
        }
        self.mode = mode;
        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        if matches!(self.screen, Screen::Login(_)) {
            self.handle_login_key(code, exit);
            return Ok(Mode::Normal);
        }

        let Some(section) = self.home().map(|home| home.section) else {
            return Ok(Mode::Normal);
        };

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                *exit = true;
            }
            KeyCode::Tab | KeyCode::Right => self.switch_section(section.next()),
            KeyCode::BackTab | KeyCode::Left => self.switch_section(section.previous()),
            KeyCode::Char('1') => self.switch_section(Section::Students),
            KeyCode::Char('2') => self.switch_section(Section::Books),
            KeyCode::Char('3') => self.switch_section(Section::Loans),
            KeyCode::Up => self.with_home(|home| home.move_selection(-1)),
            KeyCode::Down => self.with_home(|home| home.move_selection(1)),
            KeyCode::PageUp => self.with_home(|home| home.move_selection(-PAGE_STEP)),
            KeyCode::PageDown => self.with_home(|home| home.move_selection(PAGE_STEP)),
            KeyCode::Home => self.with_home(HomeScreen::select_first),
            KeyCode::End => self.with_home(HomeScreen::select_last),
            KeyCode::F(5) => {
                self.load_section(section);
            }
            KeyCode::Char('/') => {
                let query = self
                    .home()
                    .and_then(|home| home.filter(section).cloned())
                    .unwrap_or_default();
                return Ok(Mode::Searching(SearchState { section, query }));
            }
            KeyCode::Char('o') => self.logout(),
            KeyCode::Char('+') | KeyCode::Char('a') => return Ok(self.open_create_form(section)),
            KeyCode::Char('e') => return Ok(self.open_edit_form(section)),
            KeyCode::Char('-') | KeyCode::Char('d') | KeyCode::Delete => {
                return Ok(self.open_delete_confirm(section));
            }
            KeyCode::Char('r') if section == Section::Loans => {
                return Ok(self.open_return_confirm());
            }
            KeyCode::Enter if section == Section::Students => self.email_current_student(),
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_login_key(&mut self, code: KeyCode, exit: &mut bool) {
        let Screen::Login(form) = &mut self.screen else {
            return;
        };
        match code {
            KeyCode::Esc => {
                *exit = true;
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => form.toggle_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => self.submit_login(),
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }
    }

    fn handle_student_form(
        &mut self,
        code: KeyCode,
        editing: Option<String>,
        mut form: StudentForm,
    ) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                let message = if editing.is_some() {
                    "Edit cancelled."
                } else {
                    "Add student cancelled."
                };
                self.set_status(message, StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.cycle_field(1),
            KeyCode::BackTab | KeyCode::Up => form.cycle_field(-1),
            KeyCode::Left | KeyCode::Right if form.active == StudentField::Scholarship => {
                form.toggle_scholarship()
            }
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_student(editing.as_deref(), &form) {
                Ok(()) => keep_open = false,
                Err(err) => form.error = Some(self.note_failure(&err)),
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        Ok(match (keep_open, editing) {
            (false, _) => Mode::Normal,
            (true, Some(enrollment)) => Mode::EditingStudent { enrollment, form },
            (true, None) => Mode::AddingStudent(form),
        })
    }

    fn handle_book_form(
        &mut self,
        code: KeyCode,
        editing: Option<i64>,
        mut form: BookForm,
    ) -> Result<Mode> {
        let mut keep_open = true;
        match code {
            KeyCode::Esc => {
                let message = if editing.is_some() {
                    "Edit cancelled."
                } else {
                    "Add book cancelled."
                };
                self.set_status(message, StatusKind::Info);
                keep_open = false;
            }
            KeyCode::Tab | KeyCode::Down => form.cycle_field(1),
            KeyCode::BackTab | KeyCode::Up => form.cycle_field(-1),
            KeyCode::Left => form.cycle_choice(-1),
            KeyCode::Right => form.cycle_choice(1),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.save_book(editing, &form) {
                Ok(()) => keep_open = false,
                Err(err) => form.error = Some(self.note_failure(&err)),
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }

        Ok(match (keep_open, editing) {
            (false, _) => Mode::Normal,
            (true, Some(id)) => Mode::EditingBook { id, form },
            (true, None) => Mode::AddingBook(form),
        })
    }

    fn handle_loan_form(&mut self, code: KeyCode, mut form: LoanForm) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.set_status("New loan cancelled.", StatusKind::Info);
                return Ok(Mode::Normal);
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => form.toggle_field(),
            KeyCode::Left => {
                form.cycle_choice(-1);
                form.error = None;
            }
            KeyCode::Right => {
                form.cycle_choice(1);
                form.error = None;
            }
            KeyCode::Enter => match self.save_loan(&form) {
                Ok(()) => return Ok(Mode::Normal),
                Err(err) => form.error = Some(self.note_failure(&err)),
            },
            _ => {}
        }
        Ok(Mode::CreatingLoan(form))
    }

    fn handle_confirm_student_delete(
        &mut self,
        code: KeyCode,
        confirm: ConfirmStudentDelete,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(err) = self.delete_student(&confirm) {
                    self.report_failure(Section::Students, &err);
                }
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmStudentDelete(confirm)),
        }
    }

    fn handle_confirm_book_delete(
        &mut self,
        code: KeyCode,
        confirm: ConfirmBookDelete,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(err) = self.delete_book(&confirm) {
                    self.report_failure(Section::Books, &err);
                }
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmBookDelete(confirm)),
        }
    }

    fn handle_confirm_return(&mut self, code: KeyCode, confirm: ConfirmReturn) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Return cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(err) = self.return_loan(&confirm) {
                    self.report_failure(Section::Loans, &err);
                }
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmReturn(confirm)),
        }
    }

    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Result<Mode> {
        let section = state.section;
        let Some(home) = self.home_mut() else {
            return Ok(Mode::Normal);
        };

        match code {
            KeyCode::Esc => {
                home.set_filter(section, None);
                return Ok(Mode::Normal);
            }
            KeyCode::Enter => return Ok(Mode::Normal),
            KeyCode::Up => home.move_selection(-1),
            KeyCode::Down => home.move_selection(1),
            KeyCode::PageUp => home.move_selection(-PAGE_STEP),
            KeyCode::PageDown => home.move_selection(PAGE_STEP),
            KeyCode::Home => home.select_first(),
            KeyCode::End => home.select_last(),
            KeyCode::Backspace => {
                state.query.pop();
                home.set_filter(section, Some(state.query.clone()));
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                state.query.push(ch);
                home.set_filter(section, Some(state.query.clone()));
            }
            _ => {}
        }
        Ok(Mode::Searching(state))
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let footer_height = FOOTER_HEIGHT.min(area.height);

        let (content_area, footer_area) = if area.height > footer_height {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(footer_height)])
                .split(area);
            (chunks[0], chunks[1])
        } else {
            (area, area)
        };

        match &self.screen {
            Screen::Login(form) => self.draw_login(frame, content_area, form),
            Screen::Home(home) => self.draw_home(frame, content_area, home),
        }

        if area.height >= footer_height {
            self.draw_footer(frame, footer_area);
        }

        match &self.mode {
            Mode::AddingStudent(form) => self.draw_student_form(frame, area, "Add Student", form),
            Mode::EditingStudent { form, .. } => {
                self.draw_student_form(frame, area, "Edit Student", form)
            }
            Mode::ConfirmStudentDelete(confirm) => self.draw_confirm(
                frame,
                area,
                "Confirm Removal",
                vec![Line::from(format!(
                    "Delete student {} ({})?",
                    confirm.name, confirm.enrollment
                ))],
            ),
            Mode::AddingBook(form) => self.draw_book_form(frame, area, "Add Book", form),
            Mode::EditingBook { form, .. } => self.draw_book_form(frame, area, "Edit Book", form),
            Mode::ConfirmBookDelete(confirm) => self.draw_confirm(
                frame,
                area,
                "Confirm Removal",
                vec![Line::from(format!("Delete book '{}'?", confirm.title))],
            ),
            Mode::CreatingLoan(form) => self.draw_loan_form(frame, area, form),
            Mode::ConfirmReturn(confirm) => self.draw_confirm(
                frame,
                area,
                "Return Book",
                vec![
                    Line::from(format!(
                        "Mark '{}' as returned by {}?",
                        confirm.book_title, confirm.student_name
                    )),
                    Line::from(format!(
                        "Lent on {}.",
                        format_date(Some(confirm.loan.loan_date))
                    )),
                ],
            ),
            Mode::Searching(state) => self.draw_search_bar(frame, content_area, state),
            Mode::Normal => {}
        }
    }

    fn draw_login(&self, frame: &mut Frame, area: Rect, form: &LoginForm) {
        let popup_area = centered_rect(50, 50, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(format!("{APP_TITLE} · Admin Login"))
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines = vec![
            form.build_line("Email", LoginField::Email),
            form.build_line("Password", LoginField::Password),
            Line::from(""),
        ];
        if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Enter to log in • Tab to switch • Esc to quit",
                Style::default().fg(Color::Gray),
            )));
        }

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);

        let (prefix, row) = match form.active {
            LoginField::Email => ("Email: ".len(), 0),
            LoginField::Password => ("Password: ".len(), 1),
        };
        frame.set_cursor_position((
            inner.x + (prefix + form.value_len(form.active)) as u16,
            inner.y + row,
        ));
    }

    fn draw_home(&self, frame: &mut Frame, area: Rect, home: &HomeScreen) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(HEADER_HEIGHT), Constraint::Min(0)])
            .split(area);

        let header = Paragraph::new(Line::from(vec![
            Span::styled(APP_TITLE, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("  •  signed in as {}", home.email)),
        ]))
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, rows[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
            .split(rows[1]);

        self.draw_sidebar(frame, columns[0], home.section);

        let main = columns[1];
        match home.section {
            Section::Students => draw_table(
                frame,
                main,
                Section::Students,
                &home.students,
                &["Enrollment", "Name", "Birth date", "Email", "Scholarship"],
                &[
                    Constraint::Length(12),
                    Constraint::Percentage(35),
                    Constraint::Length(11),
                    Constraint::Percentage(35),
                    Constraint::Length(11),
                ],
                student_cells,
            ),
            Section::Books => draw_table(
                frame,
                main,
                Section::Books,
                &home.books,
                &["Title", "Quantity", "Author", "Subject"],
                &[
                    Constraint::Percentage(40),
                    Constraint::Length(9),
                    Constraint::Percentage(25),
                    Constraint::Percentage(25),
                ],
                book_cells,
            ),
            Section::Loans => draw_table(
                frame,
                main,
                Section::Loans,
                &home.loans,
                &["Student", "Book", "Lent on", "Returned on"],
                &[
                    Constraint::Percentage(30),
                    Constraint::Percentage(35),
                    Constraint::Length(11),
                    Constraint::Length(13),
                ],
                loan_cells,
            ),
        }
    }

    fn draw_sidebar(&self, frame: &mut Frame, area: Rect, current: Section) {
        let items: Vec<ListItem> = Section::ALL
            .iter()
            .enumerate()
            .map(|(index, section)| ListItem::new(format!("{} {}", index + 1, section.title())))
            .collect();

        let list = List::new(items)
            .block(Block::default().title("Menu").borders(Borders::ALL))
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        let mut state = ListState::default();
        state.select(Section::ALL.iter().position(|s| *s == current));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let instructions = self.footer_instructions();

        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let title = format!("Search {}", state.section.noun());
        let block = Block::default().borders(Borders::ALL).title(title);
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn footer_instructions(&self) -> Line<'static> {
        match (&self.screen, &self.mode) {
            (Screen::Login(_), _) => key_hints(&[
                ("[Tab]", "Switch field"),
                ("[Enter]", "Log in"),
                ("[Esc]", "Quit"),
            ]),
            (_, Mode::Searching(_)) => key_hints(&[
                ("[type]", "Filter"),
                ("[↑↓]", "Move"),
                ("[Enter]", "Keep filter"),
                ("[Esc]", "Clear"),
            ]),
            (_, Mode::AddingStudent(_) | Mode::EditingStudent { .. }) => key_hints(&[
                ("[Tab]", "Next field"),
                ("[Space]", "Toggle scholarship"),
                ("[Enter]", "Save"),
                ("[Esc]", "Cancel"),
            ]),
            (_, Mode::AddingBook(_) | Mode::EditingBook { .. } | Mode::CreatingLoan(_)) => {
                key_hints(&[
                    ("[Tab]", "Next field"),
                    ("[←→]", "Choose"),
                    ("[Enter]", "Save"),
                    ("[Esc]", "Cancel"),
                ])
            }
            (
                _,
                Mode::ConfirmStudentDelete(_) | Mode::ConfirmBookDelete(_) | Mode::ConfirmReturn(_),
            ) => key_hints(&[("[y]", "Confirm"), ("[n]", "Cancel")]),
            (Screen::Home(home), Mode::Normal) => match home.section {
                Section::Students => key_hints(&[
                    ("[↑↓]", "Move"),
                    ("[Tab]", "Section"),
                    ("[/]", "Search"),
                    ("[+]", "Add"),
                    ("[e]", "Edit"),
                    ("[-]", "Delete"),
                    ("[Enter]", "Email"),
                    ("[F5]", "Reload"),
                    ("[o]", "Log out"),
                    ("[q]", "Quit"),
                ]),
                Section::Books => key_hints(&[
                    ("[↑↓]", "Move"),
                    ("[Tab]", "Section"),
                    ("[/]", "Search"),
                    ("[+]", "Add"),
                    ("[e]", "Edit"),
                    ("[-]", "Delete"),
                    ("[F5]", "Reload"),
                    ("[o]", "Log out"),
                    ("[q]", "Quit"),
                ]),
                Section::Loans => key_hints(&[
                    ("[↑↓]", "Move"),
                    ("[Tab]", "Section"),
                    ("[/]", "Search"),
                    ("[+]", "Lend"),
                    ("[r]", "Return"),
                    ("[F5]", "Reload"),
                    ("[o]", "Log out"),
                    ("[q]", "Quit"),
                ]),
            },
        }
    }

    fn draw_student_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &StudentForm) {
        const FIELDS: [(&str, StudentField); 5] = [
            ("Enrollment", StudentField::Enrollment),
            ("Name", StudentField::Name),
            ("Birth date", StudentField::BirthDate),
            ("Email", StudentField::Email),
            ("Scholarship", StudentField::Scholarship),
        ];
        let lines = FIELDS
            .iter()
            .map(|(name, field)| form.build_line(name, *field))
            .collect();
        let cursor = FIELDS
            .iter()
            .position(|(_, field)| *field == form.active)
            .filter(|_| form.active != StudentField::Scholarship)
            .map(|row| {
                let (name, field) = FIELDS[row];
                (name.len() + 2 + form.value_len(field), row)
            });
        draw_form_popup(frame, area, title, lines, form.error.as_deref(), cursor);
    }

    fn draw_book_form(&self, frame: &mut Frame, area: Rect, title: &str, form: &BookForm) {
        const FIELDS: [(&str, BookField); 4] = [
            ("Title", BookField::Title),
            ("Quantity", BookField::Quantity),
            ("Author", BookField::Author),
            ("Subject", BookField::Subject),
        ];
        let lines = FIELDS
            .iter()
            .map(|(name, field)| form.build_line(name, *field))
            .collect();
        let cursor = match form.active {
            BookField::Title => Some(("Title: ".len() + form.value_len(BookField::Title), 0)),
            BookField::Quantity => Some((
                "Quantity: ".len() + form.value_len(BookField::Quantity),
                1,
            )),
            BookField::Author | BookField::Subject => None,
        };
        draw_form_popup(frame, area, title, lines, form.error.as_deref(), cursor);
    }

    fn draw_loan_form(&self, frame: &mut Frame, area: Rect, form: &LoanForm) {
        let lines = vec![
            form.build_line("Student", LoanField::Student),
            form.build_line("Book", LoanField::Book),
            Line::from(format!(
                "Lent on: {}",
                format_date(Some(circulation::today()))
            )),
        ];
        draw_form_popup(frame, area, "New Loan", lines, form.error.as_deref(), None);
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect, title: &str, mut lines: Vec<Line>) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(title).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Press Y to confirm or N / Esc to cancel.",
            Style::default().fg(Color::Gray),
        )));

        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    fn home(&self) -> Option<&HomeScreen> {
        match &self.screen {
            Screen::Home(home) => Some(home),
            Screen::Login(_) => None,
        }
    }

    fn home_mut(&mut self) -> Option<&mut HomeScreen> {
        match &mut self.screen {
            Screen::Home(home) => Some(home),
            Screen::Login(_) => None,
        }
    }

    fn with_home(&mut self, action: impl FnOnce(&mut HomeScreen)) {
        if let Some(home) = self.home_mut() {
            action(home);
        }
    }

    fn enter_home(&mut self, email: String) {
        self.screen = Screen::Home(HomeScreen::new(email));
        self.mode = Mode::Normal;
        self.load_section(Section::Students);
    }

    fn show_login(&mut self) {
        self.screen = Screen::Login(LoginForm::default());
        self.mode = Mode::Normal;
    }

    fn submit_login(&mut self) {
        let Screen::Login(form) = &mut self.screen else {
            return;
        };
        let email = form.email.trim().to_string();
        let password = form.password.clone();
        if email.is_empty() || password.is_empty() {
            form.error = Some("Email and password are required.".to_string());
            return;
        }

        match self.backend.sign_in(&email, &password) {
            Ok(session) => {
                info!(email = %session.email, "login succeeded");
                self.clear_status();
                let message = format!("Signed in as {}.", session.email);
                self.enter_home(session.email);
                if self.status.is_none() {
                    self.set_status(message, StatusKind::Info);
                }
            }
            Err(err) => {
                warn!(email = %email, error = %err, "login failed");
                let message = format!("Login failed: {err}");
                if let Screen::Login(form) = &mut self.screen {
                    form.error = Some(message.clone());
                }
                self.set_status(message, StatusKind::Error);
            }
        }
    }

    fn logout(&mut self) {
        match self.backend.sign_out() {
            Ok(()) => {
                self.show_login();
                self.set_status("Signed out.", StatusKind::Info);
            }
            Err(err) => {
                warn!(error = %err, "logout failed");
                self.set_status(format!("Failed to log out: {err}"), StatusKind::Error);
            }
        }
    }

    fn switch_section(&mut self, section: Section) {
        self.clear_status();
        self.with_home(|home| home.section = section);
        self.load_section(section);
    }

    /// Refetch one section, reporting a failure inline.
    fn load_section(&mut self, section: Section) {
        if let Err(err) = self.reload(section) {
            self.report_failure(section, &err);
        }
    }

    fn reload(&mut self, section: Section) -> Result<()> {
        match section {
            Section::Students => {
                let students = self
                    .backend
                    .fetch_students()
                    .context("Failed to load students")?;
                self.with_home(|home| home.students.set_items(students));
            }
            Section::Books => {
                let books = self.backend.fetch_books().context("Failed to load books")?;
                self.with_home(|home| home.books.set_items(books));
            }
            Section::Loans => {
                let loans = self.backend.fetch_loans().context("Failed to load loans")?;
                self.with_home(|home| home.loans.set_items(loans));
            }
        }
        Ok(())
    }

    /// Log a failure and put it in the footer. An expired session goes back
    /// to the login view instead. Returns the message for inline display.
    fn note_failure(&mut self, err: &anyhow::Error) -> String {
        let message = surface_error(err);
        warn!(error = %message, "operation failed");
        if is_unauthenticated(err) {
            self.show_login();
            self.set_status(SESSION_EXPIRED, StatusKind::Error);
        } else {
            self.set_status(message.clone(), StatusKind::Error);
        }
        message
    }

    /// Like `note_failure`, and also pins the message above the section's
    /// table. The rows already on screen stay.
    fn report_failure(&mut self, section: Section, err: &anyhow::Error) {
        let message = self.note_failure(err);
        self.with_home(|home| home.set_error(section, message));
    }

    fn open_create_form(&mut self, section: Section) -> Mode {
        match section {
            Section::Students => Mode::AddingStudent(StudentForm::default()),
            Section::Books => match self.book_choices() {
                Ok((authors, subjects)) => Mode::AddingBook(BookForm::new(&authors, &subjects)),
                Err(err) => {
                    self.report_failure(section, &err);
                    Mode::Normal
                }
            },
            Section::Loans => match self.loan_choices() {
                Ok((students, books)) => Mode::CreatingLoan(LoanForm::new(&students, &books)),
                Err(err) => {
                    self.report_failure(section, &err);
                    Mode::Normal
                }
            },
        }
    }

    fn open_edit_form(&mut self, section: Section) -> Mode {
        match section {
            Section::Students => {
                let Some(student) = self.home().and_then(|home| home.students.current()) else {
                    self.set_status("No student selected.", StatusKind::Error);
                    return Mode::Normal;
                };
                Mode::EditingStudent {
                    enrollment: student.enrollment.clone(),
                    form: StudentForm::from_student(student),
                }
            }
            Section::Books => {
                let Some(listing) = self
                    .home()
                    .and_then(|home| home.books.current())
                    .cloned()
                else {
                    self.set_status("No book selected.", StatusKind::Error);
                    return Mode::Normal;
                };
                match self.book_choices() {
                    Ok((authors, subjects)) => Mode::EditingBook {
                        id: listing.book.id,
                        form: BookForm::from_listing(&listing, &authors, &subjects),
                    },
                    Err(err) => {
                        self.report_failure(section, &err);
                        Mode::Normal
                    }
                }
            }
            // The only change a loan accepts is its return.
            Section::Loans => self.open_return_confirm(),
        }
    }

    fn open_delete_confirm(&mut self, section: Section) -> Mode {
        match section {
            Section::Students => {
                match self.home().and_then(|home| home.students.current()) {
                    Some(student) => Mode::ConfirmStudentDelete(ConfirmStudentDelete::from(student)),
                    None => {
                        self.set_status("No student selected.", StatusKind::Error);
                        Mode::Normal
                    }
                }
            }
            Section::Books => match self.home().and_then(|home| home.books.current()) {
                Some(listing) => Mode::ConfirmBookDelete(ConfirmBookDelete::from(listing)),
                None => {
                    self.set_status("No book selected.", StatusKind::Error);
                    Mode::Normal
                }
            },
            Section::Loans => {
                self.set_status(
                    "Loans are never deleted; press r to record a return.",
                    StatusKind::Error,
                );
                Mode::Normal
            }
        }
    }

    fn open_return_confirm(&mut self) -> Mode {
        let Some(listing) = self.home().and_then(|home| home.loans.current()) else {
            self.set_status("No loan selected.", StatusKind::Error);
            return Mode::Normal;
        };
        if !listing.loan.is_outstanding() {
            self.set_status("This loan has already been returned.", StatusKind::Error);
            return Mode::Normal;
        }
        Mode::ConfirmReturn(ConfirmReturn::from(listing))
    }

    fn book_choices(&self) -> Result<(Vec<Author>, Vec<Subject>)> {
        let authors = self
            .backend
            .fetch_authors()
            .context("Failed to load authors")?;
        let subjects = self
            .backend
            .fetch_subjects()
            .context("Failed to load subjects")?;
        Ok((authors, subjects))
    }

    fn loan_choices(&self) -> Result<(Vec<Student>, Vec<BookListing>)> {
        let students = self
            .backend
            .fetch_students()
            .context("Failed to load students")?;
        let books = self.backend.fetch_books().context("Failed to load books")?;
        Ok((students, books))
    }

    fn save_student(&mut self, editing: Option<&str>, form: &StudentForm) -> Result<()> {
        let student = form.parse_inputs()?;
        match editing {
            None => {
                self.backend
                    .create_student(&student)
                    .context("Failed to add student")?;
                self.set_status(format!("Added {}.", student.name), StatusKind::Info);
            }
            Some(enrollment) => {
                self.backend
                    .update_student(enrollment, &student)
                    .context("Failed to update student")?;
                self.set_status(format!("Updated {}.", student.name), StatusKind::Info);
            }
        }
        self.load_section(Section::Students);
        self.with_home(|home| {
            home.students
                .focus(|row| row.enrollment == student.enrollment)
        });
        Ok(())
    }

    fn save_book(&mut self, editing: Option<i64>, form: &BookForm) -> Result<()> {
        let draft = form.parse_inputs()?;
        match editing {
            None => {
                self.backend
                    .create_book(&draft)
                    .context("Failed to add book")?;
                self.set_status(format!("Added '{}'.", draft.title), StatusKind::Info);
            }
            Some(id) => {
                self.backend
                    .update_book(id, &draft)
                    .context("Failed to update book")?;
                self.set_status(format!("Updated '{}'.", draft.title), StatusKind::Info);
            }
        }
        self.load_section(Section::Books);
        self.with_home(|home| home.books.focus(|row| row.book.title == draft.title));
        Ok(())
    }

    fn save_loan(&mut self, form: &LoanForm) -> Result<()> {
        let (enrollment, book_id) = form.parse_inputs()?;
        let update = self
            .backend
            .lend(&enrollment, book_id, circulation::today())
            .context("Failed to create loan")?;
        self.report_stock("Loan recorded.", update);
        self.load_section(Section::Loans);
        Ok(())
    }

    fn delete_student(&mut self, confirm: &ConfirmStudentDelete) -> Result<()> {
        self.backend
            .delete_student(&confirm.enrollment)
            .context("Failed to delete student")?;
        self.set_status(format!("Deleted {}.", confirm.name), StatusKind::Info);
        self.load_section(Section::Students);
        Ok(())
    }

    fn delete_book(&mut self, confirm: &ConfirmBookDelete) -> Result<()> {
        self.backend
            .delete_book(confirm.id)
            .context("Failed to delete book")?;
        self.set_status(format!("Deleted '{}'.", confirm.title), StatusKind::Info);
        self.load_section(Section::Books);
        Ok(())
    }

    fn return_loan(&mut self, confirm: &ConfirmReturn) -> Result<()> {
        let update = self
            .backend
            .return_loan(&confirm.loan, circulation::today())
            .context("Failed to return loan")?;
        self.report_stock(&format!("'{}' returned.", confirm.book_title), update);
        self.load_section(Section::Loans);
        Ok(())
    }

    /// Status line for a lend or return that went through. A stock change
    /// that failed after the loan was written is a warning, not a failure.
    fn report_stock(&mut self, done: &str, update: StockUpdate) {
        match update {
            StockUpdate::Adjusted | StockUpdate::BookMissing => {
                self.set_status(done, StatusKind::Info)
            }
            StockUpdate::Failed(reason) => {
                warn!(reason = %reason, "stock left unchanged");
                self.set_status(
                    format!("{done} Stock was not updated: {reason}"),
                    StatusKind::Warning,
                );
            }
        }
    }

    fn email_current_student(&mut self) {
        let Some(student) = self
            .home()
            .and_then(|home| home.students.current())
            .cloned()
        else {
            self.set_status("No student selected.", StatusKind::Error);
            return;
        };

        let email = student.email.trim();
        if email.is_empty() {
            self.set_status(
                format!("{} has no email address.", student.name),
                StatusKind::Error,
            );
        } else if let Err(err) = open_link(format!("mailto:{email}")) {
            self.set_status(
                format!("Failed to open mail client: {err}"),
                StatusKind::Error,
            );
        } else {
            self.set_status(format!("Opened mail to {email}."), StatusKind::Info);
        }
    }
}

fn key_hints(pairs: &[(&'static str, &'static str)]) -> Line<'static> {
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let mut spans = Vec::with_capacity(pairs.len() * 2);
    for (index, (key, label)) in pairs.iter().enumerate() {
        spans.push(Span::styled(*key, key_style));
        if index + 1 == pairs.len() {
            spans.push(Span::raw(format!(" {label}")));
        } else {
            spans.push(Span::raw(format!(" {label}   ")));
        }
    }
    Line::from(spans)
}

/// Modal form box: the field rows, then either the error or the usual hint.
/// `cursor` is `(column, row)` inside the box.
fn draw_form_popup(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    mut lines: Vec<Line<'static>>,
    error: Option<&str>,
    cursor: Option<(usize, usize)>,
) {
    let popup_area = centered_rect(60, 50, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default().title(title).borders(Borders::ALL);
    frame.render_widget(block.clone(), popup_area);
    let inner = block.inner(popup_area);

    lines.push(Line::from(""));
    match error {
        Some(error) => lines.push(Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::Red),
        ))),
        None => lines.push(Line::from(Span::styled(
            "Enter to save • Tab to switch • Esc to cancel",
            Style::default().fg(Color::Gray),
        ))),
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, inner);

    if let Some((column, row)) = cursor {
        frame.set_cursor_position((inner.x + column as u16, inner.y + row as u16));
    }
}

/// Render one section: its inline error (if any) above a table of the
/// filtered rows, or a placeholder when there is nothing to show.
fn draw_table<T: Searchable>(
    frame: &mut Frame,
    area: Rect,
    section: Section,
    list: &ListScreen<T>,
    header: &[&'static str],
    widths: &[Constraint],
    cells: fn(&T) -> Vec<String>,
) {
    let title = match &list.filter {
        Some(query) if list.has_search() => format!("{} • search: {}", section.title(), query),
        _ => section.title().to_string(),
    };
    let block = Block::default().title(title).borders(Borders::ALL);

    let mut table_area = area;
    if let Some(error) = &list.error {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);
        frame.render_widget(
            Paragraph::new(Span::styled(error.clone(), Style::default().fg(Color::Red))),
            chunks[0],
        );
        table_area = chunks[1];
    }

    if list.filtered.is_empty() {
        let message = if !list.loaded {
            format!("Could not load {}. Press F5 to retry.", section.noun())
        } else if list.has_search() {
            format!("No {} match the current search.", section.noun())
        } else {
            format!("No {} yet. Press '+' to add one.", section.noun())
        };
        let paragraph = Paragraph::new(message)
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(paragraph, table_area);
        return;
    }

    let rows: Vec<Row> = list.filtered.iter().map(|item| Row::new(cells(item))).collect();
    let table = Table::new(rows, widths.to_vec())
        .header(
            Row::new(header.to_vec()).style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(block)
        .row_highlight_style(Style::default().fg(Color::Yellow))
        .highlight_symbol("▶ ");

    let mut state = TableState::default().with_selected(Some(list.selected));
    frame.render_stateful_widget(table, table_area, &mut state);
}

fn student_cells(student: &Student) -> Vec<String> {
    vec![
        student.enrollment.clone(),
        student.name.clone(),
        format_date(student.birth_date),
        student.email.clone(),
        yes_no(student.scholarship).to_string(),
    ]
}

fn book_cells(listing: &BookListing) -> Vec<String> {
    vec![
        listing.book.title.clone(),
        listing.book.quantity.to_string(),
        listing.author_name().to_string(),
        listing.subject_name().to_string(),
    ]
}

fn loan_cells(listing: &LoanListing) -> Vec<String> {
    vec![
        listing.student_name().to_string(),
        listing.book_title().to_string(),
        format_date(Some(listing.loan.loan_date)),
        listing
            .loan
            .return_date
            .map(|date| format_date(Some(date)))
            .unwrap_or_else(|| "Not returned".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::db::{self, SqliteBackend};
    use crate::error::BackendError;
    use crate::models::Session;
    use crate::session::SessionStore;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn session() -> Session {
        Session {
            access_token: "token".into(),
            refresh_token: None,
            expires_at: i64::MAX,
            email: "admin@ect.ufrn.br".into(),
        }
    }

    fn student(enrollment: &str, name: &str) -> Student {
        Student {
            enrollment: enrollment.into(),
            name: name.into(),
            birth_date: None,
            email: format!("{enrollment}@ufrn.br"),
            scholarship: false,
        }
    }

    fn signed_in_mock() -> MockBackend {
        let mut backend = MockBackend::new();
        backend
            .expect_current_session()
            .returning(|| Ok(Some(session())));
        backend
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(code).unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn home(app: &App) -> &HomeScreen {
        match &app.screen {
            Screen::Home(home) => home,
            Screen::Login(_) => panic!("expected the home view"),
        }
    }

    fn login_form(app: &App) -> &LoginForm {
        match &app.screen {
            Screen::Login(form) => form,
            Screen::Home(_) => panic!("expected the login view"),
        }
    }

    fn status_text(app: &App) -> &str {
        app.status.as_ref().map(|s| s.text.as_str()).unwrap_or("")
    }

    fn render(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| app.draw(frame)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn no_session_starts_on_login() {
        let mut backend = MockBackend::new();
        backend.expect_current_session().returning(|| Ok(None));
        backend.expect_fetch_students().never();

        let app = App::new(Box::new(backend));
        assert!(login_form(&app).error.is_none());
    }

    #[test]
    fn stored_session_starts_on_students() {
        let mut backend = signed_in_mock();
        backend
            .expect_fetch_students()
            .times(1)
            .returning(|| Ok(vec![student("1", "Ana"), student("2", "Bruno")]));

        let app = App::new(Box::new(backend));
        let home = home(&app);
        assert_eq!(home.section, Section::Students);
        assert_eq!(home.students.items.len(), 2);
        assert_eq!(home.email, "admin@ect.ufrn.br");
    }

    #[test]
    fn rejected_login_stays_on_login_with_message() {
        let mut backend = MockBackend::new();
        backend.expect_current_session().returning(|| Ok(None));
        backend
            .expect_sign_in()
            .times(1)
            .returning(|_, _| Err(BackendError::remote("Invalid login credentials")));

        let mut app = App::new(Box::new(backend));
        type_text(&mut app, "admin@ect.ufrn.br");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "wrong");
        press(&mut app, KeyCode::Enter);

        assert_eq!(
            login_form(&app).error.as_deref(),
            Some("Login failed: Invalid login credentials")
        );
    }

    #[test]
    fn accepted_login_routes_home() {
        let mut backend = MockBackend::new();
        backend.expect_current_session().returning(|| Ok(None));
        backend
            .expect_sign_in()
            .withf(|email, password| email == "admin@ect.ufrn.br" && password == "s3cret")
            .times(1)
            .returning(|_, _| Ok(session()));
        backend
            .expect_fetch_students()
            .times(1)
            .returning(|| Ok(vec![student("1", "Ana")]));

        let mut app = App::new(Box::new(backend));
        type_text(&mut app, " admin@ect.ufrn.br ");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "s3cret");
        press(&mut app, KeyCode::Enter);

        assert_eq!(home(&app).students.items.len(), 1);
        assert_eq!(status_text(&app), "Signed in as admin@ect.ufrn.br.");
    }

    #[test]
    fn search_narrows_the_visible_rows() {
        let mut backend = signed_in_mock();
        backend.expect_fetch_students().returning(|| {
            Ok(vec![
                student("1", "Ana Souza"),
                student("2", "Bruno Lima"),
                student("3", "Mariana Dias"),
            ])
        });

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "ANA");
        let names: Vec<&str> = home(&app)
            .students
            .filtered
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["Ana Souza", "Mariana Dias"]);

        press(&mut app, KeyCode::Esc);
        assert_eq!(home(&app).students.filtered.len(), 3);
        assert!(matches!(app.mode, Mode::Normal));
    }

    #[test]
    fn failed_delete_keeps_the_list_and_shows_the_error() {
        let mut backend = signed_in_mock();
        backend
            .expect_fetch_students()
            .times(1)
            .returning(|| Ok(vec![student("1", "Ana"), student("2", "Bruno")]));
        backend
            .expect_delete_student()
            .withf(|enrollment| enrollment == "1")
            .times(1)
            .returning(|_| Err(BackendError::remote("violates foreign key constraint")));

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('-'));
        assert!(matches!(app.mode, Mode::ConfirmStudentDelete(_)));
        press(&mut app, KeyCode::Char('y'));

        let students = &home(&app).students;
        assert_eq!(students.items.len(), 2);
        assert_eq!(
            students.error.as_deref(),
            Some("Failed to delete student: violates foreign key constraint")
        );
        assert!(matches!(app.mode, Mode::Normal));
    }

    #[test]
    fn failed_insert_keeps_the_form_open() {
        let mut backend = signed_in_mock();
        backend
            .expect_fetch_students()
            .times(1)
            .returning(|| Ok(Vec::new()));
        backend
            .expect_create_student()
            .times(1)
            .returning(|_| Err(BackendError::remote("duplicate key value")));

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('+'));
        type_text(&mut app, "2021001");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "Ana");
        press(&mut app, KeyCode::Enter);

        match &app.mode {
            Mode::AddingStudent(form) => assert_eq!(
                form.error.as_deref(),
                Some("Failed to add student: duplicate key value")
            ),
            _ => panic!("form should stay open"),
        }
    }

    #[test]
    fn expired_session_returns_to_login() {
        let mut backend = signed_in_mock();
        backend.expect_fetch_students().returning(|| Ok(Vec::new()));
        backend
            .expect_fetch_books()
            .times(1)
            .returning(|| Err(BackendError::Unauthenticated));

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Tab);

        login_form(&app);
        assert_eq!(status_text(&app), SESSION_EXPIRED);
    }

    #[test]
    fn logout_routes_to_login() {
        let mut backend = signed_in_mock();
        backend.expect_fetch_students().returning(|| Ok(Vec::new()));
        backend.expect_sign_out().times(1).returning(|| Ok(()));

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('o'));

        login_form(&app);
        assert_eq!(status_text(&app), "Signed out.");
    }

    #[test]
    fn returned_loans_cannot_be_returned_again() {
        let mut backend = signed_in_mock();
        backend.expect_fetch_students().returning(|| Ok(Vec::new()));
        backend.expect_fetch_loans().returning(|| {
            let day = chrono::NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();
            Ok(vec![LoanListing {
                loan: crate::models::Loan {
                    id: 1,
                    student_enrollment: "1".into(),
                    book_id: 1,
                    loan_date: day,
                    return_date: Some(day),
                },
                student: None,
                book: None,
            }])
        });
        backend.expect_set_loan_returned().never();

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('3'));
        press(&mut app, KeyCode::Char('r'));

        assert!(matches!(app.mode, Mode::Normal));
        assert_eq!(status_text(&app), "This loan has already been returned.");
    }

    #[test]
    fn stock_failure_after_lending_closes_the_form_and_reloads() {
        let mut backend = signed_in_mock();
        backend
            .expect_fetch_students()
            .returning(|| Ok(vec![student("2021001", "Ana Souza")]));
        backend.expect_fetch_books().returning(|| {
            Ok(vec![BookListing {
                book: crate::models::Book {
                    id: 7,
                    title: "Cálculo I".into(),
                    quantity: 2,
                    author_id: None,
                    subject_id: None,
                },
                author: None,
                subject: None,
            }])
        });
        backend
            .expect_fetch_loans()
            .times(2)
            .returning(|| Ok(Vec::new()));
        backend
            .expect_lend()
            .withf(|enrollment, book_id, _| enrollment == "2021001" && *book_id == 7)
            .times(1)
            .returning(|_, _, _| Ok(StockUpdate::Failed("stock update failed".into())));

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('3'));
        press(&mut app, KeyCode::Char('+'));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Enter);

        assert!(matches!(app.mode, Mode::Normal));
        assert!(matches!(
            app.status.as_ref().map(|s| &s.kind),
            Some(StatusKind::Warning)
        ));
        assert_eq!(
            status_text(&app),
            "Loan recorded. Stock was not updated: stock update failed"
        );

        // The form is gone, so another Enter cannot store a second loan.
        press(&mut app, KeyCode::Enter);
    }

    #[test]
    fn stock_failure_after_returning_still_reloads_loans() {
        let mut backend = signed_in_mock();
        backend.expect_fetch_students().returning(|| Ok(Vec::new()));
        let day = chrono::NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();
        backend.expect_fetch_loans().times(2).returning(move || {
            Ok(vec![LoanListing {
                loan: crate::models::Loan {
                    id: 1,
                    student_enrollment: "1".into(),
                    book_id: 7,
                    loan_date: day,
                    return_date: None,
                },
                student: None,
                book: None,
            }])
        });
        backend
            .expect_return_loan()
            .times(1)
            .returning(|_, _| Ok(StockUpdate::Failed("stock update failed".into())));

        let mut app = App::new(Box::new(backend));
        press(&mut app, KeyCode::Char('3'));
        press(&mut app, KeyCode::Char('r'));
        press(&mut app, KeyCode::Char('y'));

        assert!(matches!(app.mode, Mode::Normal));
        assert!(status_text(&app).ends_with("Stock was not updated: stock update failed"));
        assert!(home(&app).loans.error.is_none());
    }

    #[test]
    fn home_view_renders_rows_with_formatted_values() {
        let mut backend = signed_in_mock();
        backend.expect_fetch_students().returning(|| {
            Ok(vec![Student {
                birth_date: chrono::NaiveDate::from_ymd_opt(2003, 4, 9),
                scholarship: true,
                ..student("2021001", "Ana Souza")
            }])
        });

        let app = App::new(Box::new(backend));
        let screen = render(&app);
        assert!(screen.contains(APP_TITLE));
        assert!(screen.contains("Ana Souza"));
        assert!(screen.contains("09/04/2003"));
        assert!(screen.contains("Yes"));
    }

    #[test]
    fn circulation_round_trip_on_sqlite() {
        let conn = db::open_in_memory().unwrap();
        db::accounts::create_admin(&conn, "admin@ect.ufrn.br", "s3cret").unwrap();
        db::books::create_author(&conn, "Stewart").unwrap();
        db::books::create_subject(&conn, "Cálculo").unwrap();
        let backend = SqliteBackend::new(conn, SessionStore::ephemeral());

        let mut app = App::new(Box::new(backend));
        type_text(&mut app, "admin@ect.ufrn.br");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "s3cret");
        press(&mut app, KeyCode::Enter);
        assert!(home(&app).students.items.is_empty());

        press(&mut app, KeyCode::Char('+'));
        type_text(&mut app, "2021001");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "Ana Souza");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "2003-04-09");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "ana@ufrn.br");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Enter);
        let students = &home(&app).students.items;
        assert_eq!(students.len(), 1);
        assert!(students[0].scholarship);

        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('+'));
        type_text(&mut app, "Cálculo I");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "2");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Enter);
        let books = &home(&app).books.items;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].author_name(), "Stewart");
        assert_eq!(books[0].subject_name(), "Cálculo");
        let book_id = books[0].book.id;

        press(&mut app, KeyCode::Char('3'));
        press(&mut app, KeyCode::Char('+'));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Enter);
        let loans = &home(&app).loans.items;
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].student_name(), "Ana Souza");
        assert!(loans[0].loan.is_outstanding());
        assert_eq!(app.backend.fetch_book(book_id).unwrap().quantity, 1);

        press(&mut app, KeyCode::Char('r'));
        press(&mut app, KeyCode::Char('y'));
        assert!(!home(&app).loans.items[0].loan.is_outstanding());
        assert_eq!(app.backend.fetch_book(book_id).unwrap().quantity, 2);
    }
}
