//! Usage Reconciliation.
//!
//! # Responsibility
//! - Count generation attempts per feature on the device.
//! - Merge the device count with the server-reported count.
//!
//! # Invariants
//! - `local` grows by exactly one per recorded attempt.
//! - `server` only grows, via max-merge with reconciliation replies.
//! - `merged = max(local, server)` is therefore non-decreasing.
//! - Each store update is one atomic read-modify-write.

use crate::consent::ConsentStore;
use crate::logging::log_field;
use crate::net::client::BackendClient;
use crate::net::contracts::{UsageReconcileRequest, UsageReconcileResponse};
use crate::net::error::BackendError;
use crate::repo::{RepoError, RepoResult};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Feature key charged by the Generation Façade.
pub const BREAKDOWN_FEATURE: &str = "breakdown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounter {
    pub local: u64,
    pub server: u64,
}

impl UsageCounter {
    pub fn merged(&self) -> u64 {
        self.local.max(self.server)
    }
}

pub trait UsageCounterStore: Send + Sync {
    /// Adds one to `local` and returns the updated counter.
    fn increment_local(&self, feature: &str) -> RepoResult<UsageCounter>;
    fn counter(&self, feature: &str) -> RepoResult<UsageCounter>;
    /// Sets `server = max(server, server_count)` and returns the counter.
    fn merge_server_count(&self, feature: &str, server_count: u64) -> RepoResult<UsageCounter>;
}

#[derive(Debug, Default)]
pub struct InMemoryUsageCounterStore {
    counters: Mutex<HashMap<String, UsageCounter>>,
}

impl InMemoryUsageCounterStore {
    fn update<F>(&self, feature: &str, apply: F) -> UsageCounter
    where
        F: FnOnce(&mut UsageCounter),
    {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = counters.entry(feature.to_string()).or_default();
        apply(counter);
        *counter
    }
}

impl UsageCounterStore for InMemoryUsageCounterStore {
    fn increment_local(&self, feature: &str) -> RepoResult<UsageCounter> {
        Ok(self.update(feature, |counter| counter.local = counter.local.saturating_add(1)))
    }

    fn counter(&self, feature: &str) -> RepoResult<UsageCounter> {
        let counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(counters.get(feature).copied().unwrap_or_default())
    }

    fn merge_server_count(&self, feature: &str, server_count: u64) -> RepoResult<UsageCounter> {
        Ok(self.update(feature, |counter| {
            counter.server = counter.server.max(server_count)
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("usage counter storage failed: {0}")]
    Storage(#[from] RepoError),
}

/// Records attempts and reconciles them with the server.
pub struct UsageReconciler {
    client: Arc<BackendClient>,
    consent: Arc<dyn ConsentStore>,
    store: Arc<dyn UsageCounterStore>,
    install_id: String,
}

impl UsageReconciler {
    pub fn new(
        client: Arc<BackendClient>,
        consent: Arc<dyn ConsentStore>,
        store: Arc<dyn UsageCounterStore>,
        install_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            consent,
            store,
            install_id: install_id.into(),
        }
    }

    pub fn record_attempt(&self, feature: &str) -> RepoResult<UsageCounter> {
        self.store.increment_local(feature)
    }

    pub fn merged(&self, feature: &str) -> RepoResult<u64> {
        Ok(self.store.counter(feature)?.merged())
    }

    /// Sends the merged count and folds the server count back in.
    ///
    /// Returns `Ok(None)` without any network call while consent is off.
    pub async fn reconcile(
        &self,
        feature: &str,
    ) -> Result<Option<UsageReconcileResponse>, UsageError> {
        if !self.consent.is_cloud_ai_enabled() {
            info!(
                "event=usage_reconcile module=usage status=skipped feature={} reason=consent_disabled",
                log_field(feature)
            );
            return Ok(None);
        }

        let request = UsageReconcileRequest {
            install_id: self.install_id.clone(),
            feature: feature.to_string(),
            local_count: self.merged(feature)?,
            since: None,
        };
        let response = match self.client.reconcile_usage(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "event=usage_reconcile module=usage status=error feature={} error={}",
                    log_field(feature),
                    log_field(&err.to_string())
                );
                return Err(err.into());
            }
        };

        let counter = self
            .store
            .merge_server_count(feature, response.server_count)?;
        info!(
            "event=usage_reconcile module=usage status=ok feature={} local={} server={} remaining={}",
            log_field(feature),
            counter.local,
            counter.server,
            response.effective_remaining
        );
        Ok(Some(response))
    }
}
