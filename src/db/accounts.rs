//! Local stand-in for the hosted auth service: admin accounts with argon2
//! password hashes and opaque session tokens with an expiry.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::{BackendError, BackendResult};
use crate::models::Session;

/// Same wording the hosted service uses, so both backends read alike.
pub const INVALID_CREDENTIALS: &str = "Invalid login credentials";

const TOKEN_LENGTH: usize = 48;

pub fn create_admin(conn: &Connection, email: &str, password: &str) -> BackendResult<()> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(BackendError::Rejected(
            "Email and password are required.".to_string(),
        ));
    }

    let hash = hash_password(password)?;
    conn.execute(
        "INSERT INTO admins (email, password_hash) VALUES (?1, ?2)",
        params![email, hash],
    )
    .map_err(|err| {
        if matches!(err.sqlite_error_code(), Some(ErrorCode::ConstraintViolation)) {
            BackendError::remote(format!("Admin {email} already exists."))
        } else {
            err.into()
        }
    })?;
    Ok(())
}

/// Check credentials and open a session valid for `ttl_secs` from `now`.
pub fn sign_in(
    conn: &Connection,
    email: &str,
    password: &str,
    now: i64,
    ttl_secs: i64,
) -> BackendResult<Session> {
    let email = email.trim();
    let stored: Option<(String, String)> = conn
        .query_row(
            "SELECT email, password_hash FROM admins WHERE email = ?1",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((email, hash)) = stored else {
        return Err(BackendError::remote(INVALID_CREDENTIALS));
    };
    if !verify_password(&hash, password)? {
        return Err(BackendError::remote(INVALID_CREDENTIALS));
    }

    // Tokens whose session file was lost are never looked up again.
    conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;

    let session = Session {
        access_token: new_token(),
        refresh_token: None,
        expires_at: now + ttl_secs,
        email,
    };
    conn.execute(
        "INSERT INTO sessions (token, email, expires_at) VALUES (?1, ?2, ?3)",
        params![session.access_token, session.email, session.expires_at],
    )?;
    Ok(session)
}

/// Look a token up, dropping it if it has expired.
pub fn find_session(conn: &Connection, token: &str, now: i64) -> BackendResult<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT token, email, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    access_token: row.get(0)?,
                    refresh_token: None,
                    email: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    match session {
        Some(session) if session.is_expired(now) => {
            end_session(conn, token)?;
            Ok(None)
        }
        other => Ok(other),
    }
}

pub fn end_session(conn: &Connection, token: &str) -> BackendResult<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

fn hash_password(password: &str) -> BackendResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BackendError::remote(format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> BackendResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| BackendError::remote("Stored password hash is invalid."))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
