//! Lifecycle use-case service.
//!
//! # Responsibility
//! - Drive capture entries through `raw -> handedOff -> ready -> placed`
//!   (plus `archived`) with an append-only hand-off audit trail.
//! - Keep every state change and the record that causes it in one write.
//!
//! # Invariants
//! - Only a request with at least one run moves `raw -> handedOff`.
//! - Only an `accepted` decision moves `handedOff -> ready`.
//! - Only a placement moves `ready -> placed`.
//! - Every other operation leaves `lifecycle_state` unchanged.
//! - Terminal entries (`placed`, `archived`) accept no further writes,
//!   except the no-op re-archive and deletion.

use crate::model::capture::{
    CaptureEntry, CaptureSource, EntryId, InputType, LifecycleEvent, LifecycleState,
    TransitionError,
};
use crate::model::handoff::{
    DecisionSource, DecisionType, HandOffMode, HandOffRequest, HandOffRun, RequestSource,
    RunStatus, RunTransitionError, Suggestion, SuggestionDecision, SuggestionKind,
};
use crate::model::now_epoch_ms;
use crate::model::placement::{Placement, PlacementTargetType};
use crate::repo::capture_repo::{CaptureRepository, EntryListQuery, EntryStateUpdate};
use crate::repo::RepoError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for lifecycle use-cases.
#[derive(Debug)]
pub enum LifecycleError {
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },
    /// Entry is `placed` or `archived`.
    Terminal(LifecycleState),
    EntryNotFound(EntryId),
    RequestNotFound(Uuid),
    RunNotFound(Uuid),
    SuggestionNotFound(Uuid),
    DecisionNotFound(Uuid),
    DecisionAlreadyUndone(Uuid),
    RunAlreadyFinished { run_id: Uuid, status: RunStatus },
    /// Placing requires an accepted suggestion.
    SuggestionNotAccepted,
    /// A hand-off request was submitted without runs.
    MissingRuns,
    Repo(RepoError),
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, event } => {
                write!(f, "cannot apply `{}` to entry in state `{from}`", event.as_str())
            }
            Self::Terminal(state) => write!(f, "entry is in terminal state `{state}`"),
            Self::EntryNotFound(id) => write!(f, "capture entry not found: {id}"),
            Self::RequestNotFound(id) => write!(f, "hand-off request not found: {id}"),
            Self::RunNotFound(id) => write!(f, "hand-off run not found: {id}"),
            Self::SuggestionNotFound(id) => write!(f, "suggestion not found: {id}"),
            Self::DecisionNotFound(id) => write!(f, "decision not found: {id}"),
            Self::DecisionAlreadyUndone(id) => write!(f, "decision already undone: {id}"),
            Self::RunAlreadyFinished { run_id, status } => {
                write!(f, "run {run_id} already finished as `{status}`")
            }
            Self::SuggestionNotAccepted => write!(f, "entry has no accepted suggestion"),
            Self::MissingRuns => write!(f, "hand-off request needs at least one run"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LifecycleError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "capture entry",
                id,
            } => Self::EntryNotFound(id),
            RepoError::NotFound {
                entity: "hand-off run",
                id,
            } => Self::RunNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<TransitionError> for LifecycleError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::Terminal(state) => Self::Terminal(state),
            TransitionError::InvalidTransition { from, event } => {
                Self::InvalidTransition { from, event }
            }
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Lifecycle service facade over a capture repository.
pub struct LifecycleService<R: CaptureRepository> {
    repo: R,
}

impl<R: CaptureRepository> LifecycleService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Persists a new `raw` entry.
    pub fn capture_entry(
        &self,
        raw_text: impl Into<String>,
        input_type: InputType,
        source: CaptureSource,
    ) -> LifecycleResult<CaptureEntry> {
        let entry = CaptureEntry::new(raw_text, input_type, source);
        self.repo.create_entry(&entry)?;
        info!(
            "event=lifecycle_transition module=service status=ok entry_id={} from=none to={} event=capture",
            entry.id, entry.lifecycle_state
        );
        Ok(entry)
    }

    /// Loads the entry with its full hand-off subtree.
    pub fn get_entry(&self, entry_id: EntryId) -> LifecycleResult<CaptureEntry> {
        self.repo
            .get_entry(entry_id)?
            .ok_or(LifecycleError::EntryNotFound(entry_id))
    }

    /// `raw` entries, newest first.
    pub fn fetch_inbox(&self) -> LifecycleResult<Vec<CaptureEntry>> {
        self.fetch_by_state(LifecycleState::Raw)
    }

    pub fn fetch_ready(&self) -> LifecycleResult<Vec<CaptureEntry>> {
        self.fetch_by_state(LifecycleState::Ready)
    }

    pub fn fetch_by_state(&self, state: LifecycleState) -> LifecycleResult<Vec<CaptureEntry>> {
        Ok(self.repo.list_entries(&EntryListQuery {
            state: Some(state),
            ..EntryListQuery::default()
        })?)
    }

    /// Case-insensitive substring search over raw text, newest first.
    pub fn search_entries(
        &self,
        text: &str,
        limit: Option<u32>,
    ) -> LifecycleResult<Vec<CaptureEntry>> {
        Ok(self.repo.list_entries(&EntryListQuery {
            text: Some(text.to_string()),
            limit,
            ..EntryListQuery::default()
        })?)
    }

    /// Records a hand-off request with its runs; `raw` becomes `handedOff`.
    pub fn hand_off(
        &self,
        entry_id: EntryId,
        requested_by: RequestSource,
        mode: HandOffMode,
        runs: Vec<HandOffRun>,
    ) -> LifecycleResult<HandOffRequest> {
        if runs.is_empty() {
            return Err(LifecycleError::MissingRuns);
        }
        let entry = self.get_entry(entry_id)?;
        let next = entry.lifecycle_state.apply(LifecycleEvent::HandOff)?;

        let mut request = HandOffRequest::new(requested_by, mode);
        request.runs = runs;
        self.repo.insert_request(
            entry_id,
            &request,
            EntryStateUpdate {
                state: next,
                accepted_suggestion_id: entry.accepted_suggestion_id,
            },
        )?;
        log_transition(entry_id, entry.lifecycle_state, next, LifecycleEvent::HandOff);
        Ok(request)
    }

    /// Adds a further run to an existing request, snapshotting the entry text.
    pub fn start_run(
        &self,
        entry_id: EntryId,
        request_id: Uuid,
        model_id: &str,
        prompt_version: &str,
    ) -> LifecycleResult<HandOffRun> {
        let entry = self.get_writable_entry(entry_id)?;
        if entry.find_request(request_id).is_none() {
            return Err(LifecycleError::RequestNotFound(request_id));
        }
        let run = HandOffRun::start(model_id, prompt_version, entry.raw_text.as_str());
        self.repo.insert_run(request_id, &run)?;
        Ok(run)
    }

    pub fn complete_run(&self, entry_id: EntryId, run_id: Uuid) -> LifecycleResult<HandOffRun> {
        self.finish_run(entry_id, run_id, RunStatus::Completed, None)
    }

    pub fn fail_run(
        &self,
        entry_id: EntryId,
        run_id: Uuid,
        error_message: impl Into<String>,
    ) -> LifecycleResult<HandOffRun> {
        self.finish_run(
            entry_id,
            run_id,
            RunStatus::Failed,
            Some(error_message.into()),
        )
    }

    pub fn cancel_run(&self, entry_id: EntryId, run_id: Uuid) -> LifecycleResult<HandOffRun> {
        self.finish_run(entry_id, run_id, RunStatus::Cancelled, None)
    }

    /// Attaches a suggestion produced by one of the entry's runs.
    pub fn add_suggestion(
        &self,
        entry_id: EntryId,
        run_id: Uuid,
        kind: SuggestionKind,
        payload_json: impl Into<String>,
        confidence: Option<f64>,
    ) -> LifecycleResult<Suggestion> {
        let entry = self.get_writable_entry(entry_id)?;
        if entry.find_run(run_id).is_none() {
            return Err(LifecycleError::RunNotFound(run_id));
        }
        let suggestion = Suggestion::new(kind, payload_json, confidence);
        self.repo.insert_suggestion(run_id, &suggestion)?;
        Ok(suggestion)
    }

    /// Appends a decision; an `accepted` one moves `handedOff -> ready`.
    pub fn record_decision(
        &self,
        entry_id: EntryId,
        suggestion_id: Uuid,
        decision: DecisionType,
        decided_by: DecisionSource,
    ) -> LifecycleResult<SuggestionDecision> {
        let entry = self.get_writable_entry(entry_id)?;
        if entry.find_suggestion(suggestion_id).is_none() {
            return Err(LifecycleError::SuggestionNotFound(suggestion_id));
        }

        let update = if decision == DecisionType::Accepted {
            EntryStateUpdate {
                state: entry.lifecycle_state.apply(LifecycleEvent::Accept)?,
                accepted_suggestion_id: Some(suggestion_id),
            }
        } else {
            EntryStateUpdate::of(&entry)
        };

        let record = SuggestionDecision::new(decision, decided_by);
        self.repo
            .insert_decision(entry_id, suggestion_id, &record, update)?;
        if update.state != entry.lifecycle_state {
            log_transition(
                entry_id,
                entry.lifecycle_state,
                update.state,
                LifecycleEvent::Accept,
            );
        }
        Ok(record)
    }

    /// Appends a `notNow` decision that reverses `decision_id`.
    ///
    /// The log stays append-only and the entry state is left as is.
    pub fn undo_decision(
        &self,
        entry_id: EntryId,
        decision_id: Uuid,
        decided_by: DecisionSource,
    ) -> LifecycleResult<SuggestionDecision> {
        let entry = self.get_writable_entry(entry_id)?;
        let (suggestion, _) = entry
            .find_decision(decision_id)
            .ok_or(LifecycleError::DecisionNotFound(decision_id))?;
        if suggestion.is_undone(decision_id) {
            return Err(LifecycleError::DecisionAlreadyUndone(decision_id));
        }

        let record = SuggestionDecision::undo_of(decision_id, DecisionType::NotNow, decided_by);
        self.repo.insert_decision(
            entry_id,
            suggestion.id,
            &record,
            EntryStateUpdate::of(&entry),
        )?;
        Ok(record)
    }

    /// Suggestions without any `accepted` decision, across all runs.
    pub fn pending_suggestions(&self, entry_id: EntryId) -> LifecycleResult<Vec<Suggestion>> {
        let entry = self.get_entry(entry_id)?;
        Ok(entry.pending_suggestions().into_iter().cloned().collect())
    }

    /// Records where the accepted suggestion went; `ready` becomes `placed`.
    pub fn place(
        &self,
        entry_id: EntryId,
        target_type: PlacementTargetType,
        target_id: Uuid,
        notes: Option<String>,
    ) -> LifecycleResult<Placement> {
        let entry = self.get_entry(entry_id)?;
        let next = entry.lifecycle_state.apply(LifecycleEvent::Place)?;
        let accepted = entry
            .accepted_suggestion_id
            .ok_or(LifecycleError::SuggestionNotAccepted)?;

        let placement = Placement::new(target_type, target_id, accepted, notes);
        self.repo.insert_placement(
            entry_id,
            &placement,
            EntryStateUpdate {
                state: next,
                accepted_suggestion_id: Some(accepted),
            },
        )?;
        log_transition(entry_id, entry.lifecycle_state, next, LifecycleEvent::Place);
        Ok(placement)
    }

    /// Archives a non-terminal entry; archiving twice is a no-op.
    pub fn archive(&self, entry_id: EntryId) -> LifecycleResult<CaptureEntry> {
        let mut entry = self.get_entry(entry_id)?;
        let next = entry.lifecycle_state.apply(LifecycleEvent::Archive)?;
        if next == entry.lifecycle_state {
            return Ok(entry);
        }

        self.repo.update_entry_state(
            entry_id,
            EntryStateUpdate {
                state: next,
                accepted_suggestion_id: entry.accepted_suggestion_id,
            },
        )?;
        log_transition(entry_id, entry.lifecycle_state, next, LifecycleEvent::Archive);
        entry.lifecycle_state = next;
        Ok(entry)
    }

    /// Deletes the entry and its owned subtree; placements survive.
    pub fn delete(&self, entry_id: EntryId) -> LifecycleResult<()> {
        self.repo.delete_entry(entry_id)?;
        info!("event=entry_delete module=service status=ok entry_id={entry_id}");
        Ok(())
    }

    fn finish_run(
        &self,
        entry_id: EntryId,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> LifecycleResult<HandOffRun> {
        let entry = self.get_entry(entry_id)?;
        let mut run = entry
            .find_run(run_id)
            .cloned()
            .ok_or(LifecycleError::RunNotFound(run_id))?;

        match run.finish(status, error_message, now_epoch_ms()) {
            Ok(()) => {}
            Err(RunTransitionError::AlreadyFinished(status)) => {
                return Err(LifecycleError::RunAlreadyFinished { run_id, status });
            }
            Err(RunTransitionError::NotTerminal) => {
                return Err(LifecycleError::RunAlreadyFinished {
                    run_id,
                    status: run.status,
                });
            }
        }
        self.repo.update_run(&run)?;
        info!(
            "event=run_finish module=service status=ok entry_id={} run_id={} run_status={}",
            entry_id, run_id, run.status
        );
        Ok(run)
    }

    fn get_writable_entry(&self, entry_id: EntryId) -> LifecycleResult<CaptureEntry> {
        let entry = self.get_entry(entry_id)?;
        if entry.lifecycle_state.is_terminal() {
            return Err(LifecycleError::Terminal(entry.lifecycle_state));
        }
        Ok(entry)
    }
}

fn log_transition(entry_id: EntryId, from: LifecycleState, to: LifecycleState, event: LifecycleEvent) {
    info!(
        "event=lifecycle_transition module=service status=ok entry_id={} from={} to={} event={}",
        entry_id,
        from,
        to,
        event.as_str()
    );
}
