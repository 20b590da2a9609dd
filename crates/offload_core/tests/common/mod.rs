//! Shared fixtures for integration tests: a scripted transport and wiring.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use offload_core::breakdown::{BreakdownService, SimpleOnDeviceGenerator};
use offload_core::config::ClientIdentity;
use offload_core::consent::{ConsentStore, InMemoryConsentStore};
use offload_core::net::{ApiRequest, ApiTransport, BackendClient, Endpoint, Session, SessionManager, TransportError};
use offload_core::usage::{InMemoryUsageCounterStore, UsageCounterStore, UsageReconciler};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const INSTALL_ID: &str = "install-test";

type Reply = Result<Vec<u8>, TransportError>;

/// Replays queued replies per path and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, endpoint: Endpoint, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint.path().to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn push_json(&self, endpoint: Endpoint, body: serde_json::Value) {
        self.push(endpoint, Ok(body.to_string().into_bytes()));
    }

    pub fn push_status(&self, endpoint: Endpoint, status: u16, body: serde_json::Value) {
        self.push(
            endpoint,
            Err(TransportError::StatusCode {
                status,
                body: body.to_string().into_bytes(),
            }),
        );
    }

    pub fn push_session(&self, token: &str, expires_in_secs: i64) {
        self.push_json(Endpoint::AnonymousSession, session_body(token, expires_in_secs));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == endpoint.path())
            .collect()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.requests_to(endpoint).len()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>, TransportError> {
        let path = request.path.clone();
        self.sent.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(TransportError::Transport(format!("unscripted call to {path}"))))
    }
}

pub fn session_body(token: &str, expires_in_secs: i64) -> serde_json::Value {
    json!({
        "session_token": token,
        "expires_at": (Utc::now() + Duration::seconds(expires_in_secs)).to_rfc3339(),
    })
}

pub fn breakdown_body(titles: &[&str]) -> serde_json::Value {
    let steps: Vec<serde_json::Value> = titles
        .iter()
        .map(|title| json!({ "title": title, "substeps": [] }))
        .collect();
    json!({
        "steps": steps,
        "provider": "test-provider",
        "latency_ms": 42,
        "usage": { "input_tokens": 11, "output_tokens": 7 },
    })
}

pub fn error_body(code: &str) -> serde_json::Value {
    json!({ "error": { "code": code, "message": "scripted", "request_id": "req-1" } })
}

pub fn active_session(token: &str) -> Session {
    Session::new(token, Utc::now() + Duration::hours(1))
}

/// Fully wired façade over a scripted transport and in-memory stores.
pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub consent: Arc<InMemoryConsentStore>,
    pub usage_store: Arc<InMemoryUsageCounterStore>,
    pub client: Arc<BackendClient>,
    pub reconciler: Arc<UsageReconciler>,
    pub service: Arc<BreakdownService>,
}

impl Harness {
    pub fn new(consent_enabled: bool, session: Session) -> Self {
        let transport = ScriptedTransport::new();
        let consent = Arc::new(InMemoryConsentStore::new(consent_enabled));
        let usage_store = Arc::new(InMemoryUsageCounterStore::default());
        let identity = ClientIdentity::new(INSTALL_ID);
        let client = Arc::new(BackendClient::with_session_manager(
            transport.clone(),
            SessionManager::with_session(identity, session),
            consent.clone(),
        ));
        let reconciler = Arc::new(UsageReconciler::new(
            client.clone(),
            consent.clone(),
            usage_store.clone(),
            INSTALL_ID,
        ));
        let service = Arc::new(BreakdownService::new(
            client.clone(),
            consent.clone(),
            reconciler.clone(),
            Arc::new(SimpleOnDeviceGenerator),
        ));
        Self {
            transport,
            consent,
            usage_store,
            client,
            reconciler,
            service,
        }
    }

    pub fn local_count(&self, feature: &str) -> u64 {
        self.usage_store.counter(feature).unwrap().local
    }

    pub fn set_consent(&self, enabled: bool) {
        self.consent.set_cloud_ai_enabled(enabled).unwrap();
    }
}
