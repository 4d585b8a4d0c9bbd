//! Terminal front end: a login view and a home view with a sidebar of
//! sections (students, books, loans), each a searchable table with modal
//! forms and confirmations.

mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
