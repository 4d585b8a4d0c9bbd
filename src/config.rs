//! Layered configuration: built-in defaults, then `config.toml` in the
//! application directory (or the file passed with `--config`), then
//! `LIBRARY_ADMIN__*` environment variables. `SUPABASE_URL` and
//! `SUPABASE_ANON_KEY` override the two remote values so an existing `.env`
//! from the hosted project can be reused unchanged.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use config::{Config, ConfigError, Environment, File};
use directories::BaseDirs;
use serde::Deserialize;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-admin";
const CONFIG_FILE_NAME: &str = "config.toml";
const DB_FILE_NAME: &str = "library.sqlite";

/// Which implementation of the data service the panel talks to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LocalConfig {
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration. An explicit file must exist; the default one is
    /// optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (file, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (
                data_dir()
                    .map(|dir| dir.join(CONFIG_FILE_NAME))
                    .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME)),
                false,
            ),
        };

        let config = Config::builder()
            .set_default("backend", "local")?
            .set_default("remote.url", "")?
            .set_default("remote.anon_key", "")?
            .set_default("remote.timeout_secs", 15)?
            .set_default("logging.level", "info")?
            .add_source(File::from(file).required(required))
            .add_source(
                Environment::with_prefix("LIBRARY_ADMIN")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("remote.url", env::var("SUPABASE_URL").ok())?
            .set_override_option("remote.anon_key", env::var("SUPABASE_ANON_KEY").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Path of the SQLite file used by the local backend.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.local.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(DB_FILE_NAME)),
        }
    }

    pub fn log_directory(&self) -> Result<PathBuf> {
        match &self.logging.directory {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("logs")),
        }
    }
}

impl RemoteConfig {
    /// The hosted client cannot be built without both values.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!(
                "remote.url is not set (use SUPABASE_URL or LIBRARY_ADMIN__REMOTE__URL)"
            ));
        }
        if self.anon_key.trim().is_empty() {
            return Err(anyhow!(
                "remote.anon_key is not set (use SUPABASE_ANON_KEY or LIBRARY_ADMIN__REMOTE__ANON_KEY)"
            ));
        }
        Ok(())
    }
}

/// Resolve the application directory inside the user's home.
pub fn data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}
