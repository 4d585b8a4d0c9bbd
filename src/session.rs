use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::BackendResult;
use crate::models::Session;

/// File name of the persisted session inside the application data directory.
pub const SESSION_FILE_NAME: &str = "session.json";

/// Keeps the signed-in session for the life of the process and, when it has a
/// path, across restarts as well.
#[derive(Debug, Default)]
pub struct SessionStore {
    path: Option<PathBuf>,
    current: Mutex<Option<Session>>,
}

impl SessionStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            current: Mutex::new(None),
        }
    }

    /// Memory only; tests and one-shot CLI commands use this.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The remembered session. A missing or unreadable file counts as "no
    /// session" so a corrupt file never locks the user out of the login view.
    pub fn load(&self) -> Option<Session> {
        let mut current = self.current.lock();
        if current.is_none() {
            *current = self.read_file();
        }
        current.clone()
    }

    pub fn save(&self, session: &Session) -> BackendResult<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_vec_pretty(session)?)?;
        }
        *self.current.lock() = Some(session.clone());
        Ok(())
    }

    pub fn clear(&self) -> BackendResult<()> {
        *self.current.lock() = None;
        match &self.path {
            Some(path) if path.exists() => Ok(fs::remove_file(path)?),
            _ => Ok(()),
        }
    }

    fn read_file(&self) -> Option<Session> {
        let path = self.path.as_ref()?;
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "ignoring unreadable session file");
                None
            }
        }
    }
}
