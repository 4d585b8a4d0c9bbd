use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{error_message, RestClient};
use crate::error::{BackendError, BackendResult};
use crate::models::Session;

/// Token endpoint reply for both the password and refresh grants.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    /// `expires_at` wins when present; otherwise it is `now + expires_in`
    /// with an hour as the service's usual default.
    pub(crate) fn into_session(self, fallback_email: &str, now: i64) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| now + self.expires_in.unwrap_or(3600));
        let email = self
            .user
            .and_then(|user| user.email)
            .unwrap_or_else(|| fallback_email.to_string());
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            email,
        }
    }
}

impl RestClient {
    pub(crate) fn password_sign_in(&self, email: &str, password: &str) -> BackendResult<Session> {
        let email = email.trim();
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .headers(self.headers(&self.anon_key)?)
            .json(&json!({ "email": email, "password": password }))
            .send()?;

        let session = self.read_token(response, email)?;
        self.sessions.save(&session)?;
        info!(email = %session.email, "signed in");
        Ok(session)
    }

    /// Trade the refresh token for a new session and remember it.
    pub(crate) fn refresh(&self, session: &Session) -> BackendResult<Session> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or(BackendError::Unauthenticated)?;

        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .headers(self.headers(&self.anon_key)?)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()?;

        let renewed = self.read_token(response, &session.email)?;
        self.sessions.save(&renewed)?;
        debug!(email = %renewed.email, "session refreshed");
        Ok(renewed)
    }

    /// Revoke the session server-side, then forget it. A token the service
    /// already rejects counts as signed out.
    pub(crate) fn revoke(&self) -> BackendResult<()> {
        let Some(session) = self.sessions.load() else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.auth_url("logout"))
            .headers(self.headers(&session.access_token)?)
            .send()?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::UNAUTHORIZED {
            let body = response.text().unwrap_or_default();
            let message = error_message(status, &body);
            warn!(%status, %message, "logout failed");
            return Err(BackendError::remote(message));
        }

        self.sessions.clear()?;
        info!(email = %session.email, "signed out");
        Ok(())
    }

    /// The stored session, refreshed when it has expired. `None` once the
    /// session is gone or can no longer be renewed.
    pub(crate) fn stored_session(&self) -> BackendResult<Option<Session>> {
        match self.live_session() {
            Ok(session) => Ok(Some(session)),
            Err(BackendError::Unauthenticated) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn read_token(
        &self,
        response: reqwest::blocking::Response,
        email: &str,
    ) -> BackendResult<Session> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            let message = error_message(status, &body);
            debug!(%status, %message, "token request refused");
            return Err(BackendError::remote(message));
        }
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into_session(email, Utc::now().timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_reply_with_user_and_absolute_expiry() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1725003600,
            "refresh_token": "r1",
            "user": { "id": "u1", "email": "admin@ect.ufrn.br" }
        }"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        let session = token.into_session("typed@ect.ufrn.br", 1_725_000_000);

        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.expires_at, 1_725_003_600);
        assert_eq!(session.email, "admin@ect.ufrn.br");
    }

    #[test]
    fn token_reply_without_user_uses_relative_expiry() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"jwt","expires_in":600}"#).unwrap();
        let session = token.into_session("typed@ect.ufrn.br", 1_000);

        assert_eq!(session.expires_at, 1_600);
        assert_eq!(session.refresh_token, None);
        assert_eq!(session.email, "typed@ect.ufrn.br");
    }
}
