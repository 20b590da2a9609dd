//! Runs one hand-off through the Generation Façade and records the outcome.
//!
//! # Invariants
//! - The run is persisted as `running` before generation starts.
//! - A successful generation leaves one `plan` suggestion and a `completed`
//!   run.
//! - Any error after the run is started leaves it `failed` with the message.

use crate::breakdown::{BreakdownError, BreakdownService, BreakdownSource};
use crate::logging::log_field;
use crate::model::capture::EntryId;
use crate::model::handoff::{HandOffMode, HandOffRun, RequestSource, Suggestion, SuggestionKind};
use crate::repo::capture_repo::CaptureRepository;
use crate::service::lifecycle_service::{LifecycleError, LifecycleService};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const BREAKDOWN_MODEL_ID: &str = "offload-breakdown";
pub const BREAKDOWN_PROMPT_VERSION: &str = "breakdown.v1";
/// Version tag written into every plan payload.
pub const PLAN_PAYLOAD_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Breakdown(#[from] BreakdownError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrganizeOutcome {
    pub request_id: Uuid,
    pub run: HandOffRun,
    pub suggestion: Suggestion,
    pub source: BreakdownSource,
}

pub struct HandOffCoordinator<R: CaptureRepository> {
    lifecycle: LifecycleService<R>,
    breakdown: Arc<BreakdownService>,
}

impl<R: CaptureRepository> HandOffCoordinator<R> {
    pub fn new(lifecycle: LifecycleService<R>, breakdown: Arc<BreakdownService>) -> Self {
        Self {
            lifecycle,
            breakdown,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleService<R> {
        &self.lifecycle
    }

    pub async fn organize_entry(
        &self,
        entry_id: EntryId,
        mode: HandOffMode,
        requested_by: RequestSource,
        granularity: i32,
    ) -> Result<OrganizeOutcome, OrganizeError> {
        let entry = self.lifecycle.get_entry(entry_id)?;
        let run = HandOffRun::start(
            BREAKDOWN_MODEL_ID,
            BREAKDOWN_PROMPT_VERSION,
            entry.raw_text.as_str(),
        );
        let run_id = run.id;
        let request = self
            .lifecycle
            .hand_off(entry_id, requested_by, mode, vec![run])?;

        match self
            .generate_plan(entry_id, run_id, entry.raw_text.as_str(), granularity)
            .await
        {
            Ok((suggestion, run, source)) => Ok(OrganizeOutcome {
                request_id: request.id,
                run,
                suggestion,
                source,
            }),
            Err(err) => {
                warn!(
                    "event=organize_entry module=service status=error entry_id={} run_id={} error={}",
                    entry_id,
                    run_id,
                    log_field(&err.to_string())
                );
                if let Err(fail_err) = self.lifecycle.fail_run(entry_id, run_id, err.to_string()) {
                    warn!(
                        "event=run_finish module=service status=error entry_id={} run_id={} error={}",
                        entry_id,
                        run_id,
                        log_field(&fail_err.to_string())
                    );
                }
                Err(err)
            }
        }
    }

    async fn generate_plan(
        &self,
        entry_id: EntryId,
        run_id: Uuid,
        input_text: &str,
        granularity: i32,
    ) -> Result<(Suggestion, HandOffRun, BreakdownSource), OrganizeError> {
        let result = self
            .breakdown
            .generate(input_text, granularity, &[], &[])
            .await?;

        let payload = json!({
            "version": PLAN_PAYLOAD_VERSION,
            "source": result.source.as_str(),
            "steps": result.steps,
        });
        let suggestion = self.lifecycle.add_suggestion(
            entry_id,
            run_id,
            SuggestionKind::Plan,
            payload.to_string(),
            None,
        )?;
        let run = self.lifecycle.complete_run(entry_id, run_id)?;
        info!(
            "event=organize_entry module=service status=ok entry_id={} run_id={} source={} steps={}",
            entry_id,
            run_id,
            result.source.as_str(),
            result.steps.len()
        );
        Ok((suggestion, run, result.source))
    }
}
