use anyhow::Error;
use chrono::NaiveDate;
use ratatui::layout::{Constraint, Direction, Layout, Rect};

use crate::error::BackendError;

/// How dates are shown in tables.
pub(crate) const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

/// Produce a rectangle centered within `area` that spans the requested percent
/// of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// The outermost context followed by the innermost cause, e.g.
/// `Failed to delete student: Student 2021001 still has loans on record.`
pub(crate) fn surface_error(err: &Error) -> String {
    let outer = err.to_string();
    match err.chain().last().map(|cause| cause.to_string()) {
        Some(cause) if cause != outer => format!("{outer}: {cause}"),
        _ => outer,
    }
}

/// Whether any layer of `err` says the session is gone.
pub(crate) fn is_unauthenticated(err: &Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<BackendError>()
            .is_some_and(BackendError::is_unauthenticated)
    })
}

pub(crate) fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DISPLAY_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

pub(crate) fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn dates_render_day_first() {
        assert_eq!(format_date(NaiveDate::from_ymd_opt(2024, 8, 5)), "05/08/2024");
        assert_eq!(format_date(None), "");
    }

    #[test]
    fn surfaced_error_keeps_action_and_cause() {
        let err = Err::<(), _>(BackendError::remote("duplicate key"))
            .context("Failed to add student")
            .unwrap_err();
        assert_eq!(surface_error(&err), "Failed to add student: duplicate key");

        let plain = anyhow::anyhow!("Name is required.");
        assert_eq!(surface_error(&plain), "Name is required.");
    }

    #[test]
    fn unauthenticated_is_found_through_context() {
        let err = Err::<(), _>(BackendError::Unauthenticated)
            .context("Failed to load students")
            .unwrap_err();
        assert!(is_unauthenticated(&err));
        assert!(!is_unauthenticated(&anyhow::anyhow!("other")));
    }
}
