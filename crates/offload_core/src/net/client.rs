//! Consent-gated client for the generation backend.
//!
//! # Responsibility
//! - Encode/decode endpoint payloads and map failures to `BackendError`.
//! - Authenticate every protected call through the session manager.
//!
//! # Invariants
//! - A protected call is sent at most twice: once, then once more after a
//!   single session refresh when the first attempt was `Unauthorized`.
//! - Generation is never attempted without cloud consent.

use crate::consent::ConsentStore;
use crate::config::ClientIdentity;
use crate::logging::log_field;
use crate::net::contracts::{
    BreakdownGenerateRequest, BreakdownGenerateResponse, UsageReconcileRequest,
    UsageReconcileResponse,
};
use crate::net::error::{BackendError, BackendResult};
use crate::net::session::SessionManager;
use crate::net::transport::{ApiRequest, ApiTransport};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const OPT_IN_HEADER: &str = "X-Offload-Cloud-Opt-In";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    AnonymousSession,
    BreakdownGenerate,
    UsageReconcile,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::AnonymousSession => "/v1/sessions/anonymous",
            Self::BreakdownGenerate => "/v1/ai/breakdown/generate",
            Self::UsageReconcile => "/v1/usage/reconcile",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::AnonymousSession => "anonymous_session",
            Self::BreakdownGenerate => "breakdown_generate",
            Self::UsageReconcile => "usage_reconcile",
        }
    }

    fn requires_opt_in_marker(self) -> bool {
        matches!(self, Self::BreakdownGenerate)
    }
}

pub struct BackendClient {
    transport: Arc<dyn ApiTransport>,
    session: SessionManager,
    consent: Arc<dyn ConsentStore>,
}

impl BackendClient {
    pub fn new(
        transport: Arc<dyn ApiTransport>,
        identity: ClientIdentity,
        consent: Arc<dyn ConsentStore>,
    ) -> Self {
        Self::with_session_manager(transport, SessionManager::new(identity), consent)
    }

    pub fn with_session_manager(
        transport: Arc<dyn ApiTransport>,
        session: SessionManager,
        consent: Arc<dyn ConsentStore>,
    ) -> Self {
        Self {
            transport,
            session,
            consent,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Issues a fresh anonymous session and returns its token.
    pub async fn create_anonymous_session(&self) -> BackendResult<String> {
        self.session.refresh(self.transport.as_ref()).await
    }

    pub async fn generate_breakdown(
        &self,
        request: &BreakdownGenerateRequest,
    ) -> BackendResult<BreakdownGenerateResponse> {
        self.generate_breakdown_with_consent(self.consent.is_cloud_ai_enabled(), request)
            .await
    }

    /// Like [`Self::generate_breakdown`], gated on a consent value the
    /// caller has already read.
    pub async fn generate_breakdown_with_consent(
        &self,
        cloud_ai_enabled: bool,
        request: &BreakdownGenerateRequest,
    ) -> BackendResult<BreakdownGenerateResponse> {
        if !cloud_ai_enabled {
            return Err(BackendError::ConsentRequired);
        }
        self.call_authorized(Endpoint::BreakdownGenerate, request)
            .await
    }

    pub async fn reconcile_usage(
        &self,
        request: &UsageReconcileRequest,
    ) -> BackendResult<UsageReconcileResponse> {
        self.call_authorized(Endpoint::UsageReconcile, request).await
    }

    /// Authenticate, call, and retry exactly once on `Unauthorized`.
    async fn call_authorized<Req, Resp>(&self, endpoint: Endpoint, body: &Req) -> BackendResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let transport = self.transport.as_ref();
        let token = self.session.ensure_active(transport).await?;

        match exchange_json(transport, endpoint, auth_headers(endpoint, &token), body).await {
            Err(BackendError::Unauthorized) => {
                warn!(
                    "event=cloud_call module=net status=retry endpoint={} reason=unauthorized",
                    endpoint.name()
                );
                let refreshed = self.session.refresh_rejected(transport, &token).await?;
                exchange_json(transport, endpoint, auth_headers(endpoint, &refreshed), body).await
            }
            other => other,
        }
    }
}

fn auth_headers(endpoint: Endpoint, token: &str) -> Vec<(String, String)> {
    let mut headers = vec![(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"))];
    if endpoint.requires_opt_in_marker() {
        headers.push((OPT_IN_HEADER.to_string(), "true".to_string()));
    }
    headers
}

/// Sends one JSON exchange and decodes the reply.
///
/// Decode failures degrade to `InvalidResponse`.
pub(crate) async fn exchange_json<Req, Resp>(
    transport: &dyn ApiTransport,
    endpoint: Endpoint,
    headers: Vec<(String, String)>,
    body: &Req,
) -> BackendResult<Resp>
where
    Req: Serialize + Sync + ?Sized,
    Resp: DeserializeOwned,
{
    let encoded = serde_json::to_vec(body)
        .map_err(|err| BackendError::Transport(format!("request encoding failed: {err}")))?;
    let mut request = ApiRequest::post(endpoint.path(), encoded);
    request.headers = headers;

    let started_at = Instant::now();
    let raw = match transport.send(request).await {
        Ok(raw) => raw,
        Err(err) => {
            let mapped = BackendError::from(err);
            warn!(
                "event=cloud_call module=net status=error endpoint={} duration_ms={} error={}",
                endpoint.name(),
                started_at.elapsed().as_millis(),
                log_field(&mapped.to_string())
            );
            return Err(mapped);
        }
    };

    match serde_json::from_slice::<Resp>(&raw) {
        Ok(decoded) => {
            debug!(
                "event=cloud_call module=net status=ok endpoint={} duration_ms={} bytes={}",
                endpoint.name(),
                started_at.elapsed().as_millis(),
                raw.len()
            );
            Ok(decoded)
        }
        Err(err) => {
            warn!(
                "event=cloud_call module=net status=error endpoint={} error_code=invalid_response error={}",
                endpoint.name(),
                log_field(&err.to_string())
            );
            Err(BackendError::InvalidResponse)
        }
    }
}
