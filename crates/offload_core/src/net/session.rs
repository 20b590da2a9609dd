//! Session lifecycle manager.
//!
//! # Responsibility
//! - Hold the bearer token and its expiry.
//! - Decide when to refresh and issue the session-creation call.
//!
//! # Invariants
//! - A session is active iff its token is non-empty and it expires more than
//!   `REFRESH_THRESHOLD_SECS` from now.
//! - The session value is only ever replaced whole, by a successful refresh.
//! - All reads and refreshes go through one async mutex, so concurrent
//!   callers that observe an expiring token issue a single refresh.
//! - Refresh never retries; its error propagates unchanged.

use crate::config::ClientIdentity;
use crate::net::client::{exchange_json, Endpoint};
use crate::net::contracts::{AnonymousSessionRequest, AnonymousSessionResponse};
use crate::net::error::{BackendError, BackendResult};
use crate::net::transport::ApiTransport;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use tokio::sync::Mutex;

pub const REFRESH_THRESHOLD_SECS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: Some(token.into()),
            expires_at: Some(expires_at),
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match (self.token.as_deref(), self.expires_at) {
            (Some(token), Some(expires_at)) if !token.is_empty() => {
                expires_at > now + Duration::seconds(REFRESH_THRESHOLD_SECS)
            }
            _ => false,
        }
    }

    fn usable_token(&self) -> BackendResult<String> {
        self.token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or(BackendError::MissingSession)
    }
}

pub struct SessionManager {
    identity: ClientIdentity,
    state: Mutex<Session>,
}

impl SessionManager {
    pub fn new(identity: ClientIdentity) -> Self {
        Self::with_session(identity, Session::default())
    }

    /// Starts from a previously issued session (e.g. restored at launch).
    pub fn with_session(identity: ClientIdentity, session: Session) -> Self {
        Self {
            identity,
            state: Mutex::new(session),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.state.lock().await.clone()
    }

    pub async fn clear(&self) {
        *self.state.lock().await = Session::default();
    }

    /// Refreshes when no active session exists, then returns the token.
    pub async fn ensure_active(&self, transport: &dyn ApiTransport) -> BackendResult<String> {
        let mut state = self.state.lock().await;
        if !state.is_active_at(Utc::now()) {
            *state = self.issue(transport, "expiring").await?;
        }
        state.usable_token()
    }

    /// Unconditionally replaces the session.
    pub async fn refresh(&self, transport: &dyn ApiTransport) -> BackendResult<String> {
        let mut state = self.state.lock().await;
        *state = self.issue(transport, "explicit").await?;
        state.usable_token()
    }

    /// Replaces the session after the server rejected `rejected_token`.
    ///
    /// If another caller already swapped in a different active session, that
    /// session is reused instead of refreshing again.
    pub async fn refresh_rejected(
        &self,
        transport: &dyn ApiTransport,
        rejected_token: &str,
    ) -> BackendResult<String> {
        let mut state = self.state.lock().await;
        let already_replaced = state.token.as_deref() != Some(rejected_token)
            && state.is_active_at(Utc::now());
        if !already_replaced {
            *state = self.issue(transport, "unauthorized").await?;
        }
        state.usable_token()
    }

    async fn issue(&self, transport: &dyn ApiTransport, reason: &str) -> BackendResult<Session> {
        let request = AnonymousSessionRequest {
            install_id: self.identity.install_id.clone(),
            app_version: self.identity.app_version.clone(),
            platform: self.identity.platform.clone(),
        };

        let response: AnonymousSessionResponse =
            match exchange_json(transport, Endpoint::AnonymousSession, Vec::new(), &request).await
            {
                Ok(response) => response,
                Err(err) => {
                    warn!(
                        "event=session_refresh module=net status=error reason={} error={}",
                        reason, err
                    );
                    return Err(err);
                }
            };

        info!(
            "event=session_refresh module=net status=ok reason={} expires_in_secs={}",
            reason,
            (response.expires_at - Utc::now()).num_seconds()
        );
        Ok(Session::new(response.session_token, response.expires_at))
    }
}
