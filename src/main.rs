//! Binary entry point. Loads configuration, starts file logging, picks the
//! data service (hosted REST or local SQLite) and either runs the panel or a
//! one-shot maintenance command against the local database.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use library_admin::config::{data_dir, AppConfig, BackendKind};
use library_admin::db::{self, SqliteBackend};
use library_admin::session::{SessionStore, SESSION_FILE_NAME};
use library_admin::{logging, run_app, App, Backend, RestClient};

/// Session file used by the local backend, kept apart from the hosted one so
/// switching backends never replays a foreign token.
const LOCAL_SESSION_FILE_NAME: &str = "local-session.json";

#[derive(Parser, Debug)]
#[command(
    name = "library-admin",
    version,
    about = "Terminal admin panel for the school library"
)]
struct Cli {
    /// Configuration file (defaults to ~/.library-admin/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured data service
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the admin panel (default)
    Run,
    /// Create an administrator account in the local database
    CreateAdmin { email: String, password: String },
    /// Add an author to the local database
    AddAuthor { name: String },
    /// Add a subject to the local database
    AddSubject { name: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Local,
    Remote,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Remote => BackendKind::Remote,
        }
    }
}

fn main() -> Result<()> {
    // A missing .env is fine; the config file and environment still apply.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(kind) = cli.backend {
        config.backend = kind.into();
    }

    let _guard = logging::init(&config.logging, &config.log_directory()?)?;
    info!(backend = ?config.backend, "starting");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_panel(&config),
        Command::CreateAdmin { email, password } => {
            let conn = open_local(&config)?;
            db::accounts::create_admin(&conn, &email, &password)?;
            info!(email = %email, "admin created");
            println!("Created admin {email}.");
            Ok(())
        }
        Command::AddAuthor { name } => {
            let conn = open_local(&config)?;
            let author = db::books::create_author(&conn, &name)?;
            println!("Added author #{} {}.", author.id, author.name);
            Ok(())
        }
        Command::AddSubject { name } => {
            let conn = open_local(&config)?;
            let subject = db::books::create_subject(&conn, &name)?;
            println!("Added subject #{} {}.", subject.id, subject.name);
            Ok(())
        }
    }
}

fn run_panel(config: &AppConfig) -> Result<()> {
    let backend: Box<dyn Backend> = match config.backend {
        BackendKind::Local => {
            let conn = open_local(config)?;
            let sessions = SessionStore::at(data_dir()?.join(LOCAL_SESSION_FILE_NAME));
            Box::new(SqliteBackend::new(conn, sessions))
        }
        BackendKind::Remote => {
            config.remote.validate()?;
            let sessions = SessionStore::at(data_dir()?.join(SESSION_FILE_NAME));
            let client = RestClient::shared(&config.remote, sessions)
                .context("failed to create the remote client")?;
            Box::new(client)
        }
    };

    let mut app = App::new(backend);
    run_app(&mut app)
}

fn open_local(config: &AppConfig) -> Result<rusqlite::Connection> {
    let path = config.database_path()?;
    info!(path = %path.display(), "opening local database");
    db::open_database(&path)
}
