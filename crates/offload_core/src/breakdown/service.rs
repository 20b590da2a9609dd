//! Generation Façade.
//!
//! # Responsibility
//! - Produce one breakdown result with provenance (`cloud` / `onDevice`).
//! - Charge one usage attempt per call, before any branching.
//!
//! # Invariants
//! - Consent off: no network traffic at all.
//! - Consent is read once per call; the client is gated on that same value.
//! - At most one corrective action per call: the client's single
//!   refresh-and-retry on `Unauthorized`, or one fallback to on-device.
//! - Blocking failures are returned, never replaced by local output.

use crate::breakdown::fallback::{classify, FallbackDecision};
use crate::breakdown::local::OnDeviceGenerator;
use crate::consent::ConsentStore;
use crate::logging::log_field;
use crate::net::client::BackendClient;
use crate::net::contracts::{
    BreakdownGenerateRequest, BreakdownStep, BreakdownUsage, UsageReconcileResponse,
};
use crate::net::error::BackendError;
use crate::repo::RepoError;
use crate::usage::{UsageError, UsageReconciler, BREAKDOWN_FEATURE};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakdownSource {
    #[serde(rename = "cloud")]
    Cloud,
    #[serde(rename = "onDevice")]
    OnDevice,
}

impl BreakdownSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::OnDevice => "onDevice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownResult {
    pub steps: Vec<BreakdownStep>,
    pub source: BreakdownSource,
    /// Token usage; only cloud results carry it.
    pub usage: Option<BreakdownUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum BreakdownError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("usage storage failed: {0}")]
    Storage(#[from] RepoError),
}

impl From<UsageError> for BreakdownError {
    fn from(value: UsageError) -> Self {
        match value {
            UsageError::Backend(err) => Self::Backend(err),
            UsageError::Storage(err) => Self::Storage(err),
        }
    }
}

pub struct BreakdownService {
    client: Arc<BackendClient>,
    consent: Arc<dyn ConsentStore>,
    usage: Arc<UsageReconciler>,
    generator: Arc<dyn OnDeviceGenerator>,
}

impl BreakdownService {
    pub fn new(
        client: Arc<BackendClient>,
        consent: Arc<dyn ConsentStore>,
        usage: Arc<UsageReconciler>,
        generator: Arc<dyn OnDeviceGenerator>,
    ) -> Self {
        Self {
            client,
            consent,
            usage,
            generator,
        }
    }

    pub async fn generate(
        &self,
        input_text: &str,
        granularity: i32,
        context_hints: &[String],
        template_ids: &[String],
    ) -> Result<BreakdownResult, BreakdownError> {
        let started_at = Instant::now();
        self.usage.record_attempt(BREAKDOWN_FEATURE)?;

        let cloud_ai_enabled = self.consent.is_cloud_ai_enabled();
        if !cloud_ai_enabled {
            let result = self.on_device(input_text, granularity, context_hints, template_ids);
            info!(
                "event=breakdown_generate module=breakdown status=ok source={} reason=consent_disabled steps={} duration_ms={}",
                result.source.as_str(),
                result.steps.len(),
                started_at.elapsed().as_millis()
            );
            return Ok(result);
        }

        let request = BreakdownGenerateRequest {
            input_text: input_text.to_string(),
            granularity,
            context_hints: context_hints.to_vec(),
            template_ids: template_ids.to_vec(),
        };

        match self
            .client
            .generate_breakdown_with_consent(cloud_ai_enabled, &request)
            .await
        {
            Ok(response) => {
                info!(
                    "event=breakdown_generate module=breakdown status=ok source=cloud provider={} steps={} duration_ms={}",
                    log_field(&response.provider),
                    response.steps.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(BreakdownResult {
                    steps: response.steps,
                    source: BreakdownSource::Cloud,
                    usage: Some(response.usage),
                })
            }
            Err(err) => match classify(&err) {
                FallbackDecision::OnDevice => {
                    warn!(
                        "event=breakdown_generate module=breakdown status=fallback source=onDevice error={}",
                        log_field(&err.to_string())
                    );
                    Ok(self.on_device(input_text, granularity, context_hints, template_ids))
                }
                FallbackDecision::Surface => {
                    warn!(
                        "event=breakdown_generate module=breakdown status=error error={}",
                        log_field(&err.to_string())
                    );
                    Err(err.into())
                }
            },
        }
    }

    /// See [`UsageReconciler::reconcile`].
    pub async fn reconcile_usage(
        &self,
        feature: &str,
    ) -> Result<Option<UsageReconcileResponse>, BreakdownError> {
        Ok(self.usage.reconcile(feature).await?)
    }

    fn on_device(
        &self,
        input_text: &str,
        granularity: i32,
        context_hints: &[String],
        template_ids: &[String],
    ) -> BreakdownResult {
        BreakdownResult {
            steps: self
                .generator
                .generate(input_text, granularity, context_hints, template_ids),
            source: BreakdownSource::OnDevice,
            usage: None,
        }
    }
}
