//! Core library surface for the library admin panel.
//!
//! The binary only wires configuration, logging and a backend together; the
//! screens, the two data-service implementations and the lending rules all
//! live here so tests can drive them directly.
pub mod backend;
pub mod circulation;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod remote;
pub mod session;
pub mod ui;

/// The seam every screen talks through, and its error type.
pub use backend::Backend;
pub use error::{BackendError, BackendResult};

/// The two implementations of the data service.
pub use db::SqliteBackend;
pub use remote::RestClient;

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
