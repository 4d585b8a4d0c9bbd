//! Client for the hosted database service: PostgREST-style table endpoints
//! under `/rest/v1` and the auth endpoints under `/auth/v1`.
//!
//! There is one `RestClient` per process. `RestClient::shared` builds it on
//! first use from the two remote settings (project URL and anon key) and hands
//! the same instance to every later caller.

mod auth;
mod tables;
#[cfg(test)]
mod test_server;

use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{BackendError, BackendResult};
use crate::models::Session;
use crate::session::SessionStore;

static SHARED: OnceCell<RestClient> = OnceCell::new();

/// Keys tried, in order, when pulling a message out of an error body. Table
/// errors use `message`, auth errors use `msg` or the OAuth pair.
const MESSAGE_KEYS: &[&str] = &["message", "msg", "error_description", "error"];

/// Refresh a session this many seconds before it actually expires.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug)]
pub struct RestClient {
    base_url: String,
    anon_key: String,
    http: Client,
    sessions: SessionStore,
}

impl RestClient {
    /// Build a standalone client. Most callers want [`RestClient::shared`].
    pub fn new(config: &RemoteConfig, sessions: SessionStore) -> BackendResult<Self> {
        if config.url.trim().is_empty() || config.anon_key.trim().is_empty() {
            return Err(BackendError::Config(
                "the remote URL and anon key are both required".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        info!(url = %config.url, "remote client created");
        Ok(Self {
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            anon_key: config.anon_key.trim().to_string(),
            http,
            sessions,
        })
    }

    /// The process-wide client. Only the first call's arguments are used;
    /// later calls return the instance built then.
    pub fn shared(config: &RemoteConfig, sessions: SessionStore) -> BackendResult<&'static Self> {
        SHARED.get_or_try_init(|| Self::new(config, sessions))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Headers every call carries. `bearer` is the session's access token, or
    /// the anon key for auth calls made before a session exists.
    fn headers(&self, bearer: &str) -> BackendResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| BackendError::Config(format!("invalid anon key: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|e| BackendError::Config(format!("invalid bearer token: {e}")))?,
        );
        Ok(headers)
    }

    /// A request against a table, authorized with a fresh session token.
    fn table_request(&self, method: Method, table: &str) -> BackendResult<RequestBuilder> {
        let session = self.live_session()?;
        Ok(self
            .http
            .request(method, self.rest_url(table))
            .headers(self.headers(&session.access_token)?))
    }

    /// Send a table request. A 401 means the token was revoked or expired
    /// server-side, so the stored session is dropped.
    fn send_table(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            debug!(body = %body, "table call rejected the session");
            self.sessions.clear()?;
            return Err(BackendError::Unauthenticated);
        }

        let message = error_message(status, &body);
        warn!(%status, %message, "table call failed");
        Err(BackendError::remote(message))
    }

    /// The stored session, refreshed first when it is about to expire.
    fn live_session(&self) -> BackendResult<Session> {
        let session = self.sessions.load().ok_or(BackendError::Unauthenticated)?;
        if !needs_refresh(&session, chrono::Utc::now().timestamp()) {
            return Ok(session);
        }

        match self.refresh(&session) {
            Ok(renewed) => Ok(renewed),
            Err(err) => {
                debug!(error = %err, "session refresh failed");
                self.sessions.clear()?;
                Err(BackendError::Unauthenticated)
            }
        }
    }
}

/// Whether `session` is close enough to expiry at `now` to renew it first.
pub(crate) fn needs_refresh(session: &Session, now: i64) -> bool {
    session.is_expired(now + EXPIRY_MARGIN_SECS)
}

/// Pick the human-readable message out of an error body, falling back to the
/// HTTP status when the body has none.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            MESSAGE_KEYS.iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|message| !message.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
            None => format!("HTTP {}", status.as_u16()),
        })
}

/// PostgREST filter value for `column = value`.
pub(crate) fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}
