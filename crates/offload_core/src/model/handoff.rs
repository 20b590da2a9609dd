//! Hand-off requests, runs, suggestions, and decisions.
//!
//! # Invariants
//! - A run starts `running` and moves once into `completed`, `failed`, or
//!   `cancelled`; `completed_at` is set on that move and never again.
//! - Decisions are append-only. An undo is a new decision that names the
//!   decision it reverses.

use crate::model::now_epoch_ms;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

wire_enum! {
    RequestSource, field = "requested_by", fallback = User, {
        User => "user",
        Auto => "auto",
        Scheduled => "scheduled",
    }
}

wire_enum! {
    HandOffMode, field = "mode", fallback = Manual, {
        Manual => "manual",
        Auto => "auto",
    }
}

wire_enum! {
    RunStatus, field = "status", fallback = Running, {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

wire_enum! {
    SuggestionKind, field = "kind", fallback = Task, {
        Plan => "plan",
        Task => "task",
        List => "list",
        Communication => "communication",
        Mixed => "mixed",
    }
}

wire_enum! {
    DecisionType, field = "decision", fallback = NotNow, {
        Accepted => "accepted",
        NotNow => "notNow",
        Rejected => "rejected",
    }
}

wire_enum! {
    DecisionSource, field = "decided_by", fallback = User, {
        User => "user",
        System => "system",
    }
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTransitionError {
    AlreadyFinished(RunStatus),
    NotTerminal,
}

impl Display for RunTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyFinished(status) => write!(f, "run already finished as `{status}`"),
            Self::NotTerminal => write!(f, "runs can only finish into a terminal status"),
        }
    }
}

impl Error for RunTransitionError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandOffRequest {
    pub id: Uuid,
    pub requested_at: i64,
    pub requested_by: RequestSource,
    pub mode: HandOffMode,
    /// Ordered by `started_at`.
    pub runs: Vec<HandOffRun>,
}

impl HandOffRequest {
    pub fn new(requested_by: RequestSource, mode: HandOffMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            requested_at: now_epoch_ms(),
            requested_by,
            mode,
            runs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandOffRun {
    pub id: Uuid,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub model_id: String,
    pub prompt_version: String,
    /// Entry text as it was when the run started.
    pub input_snapshot: String,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub suggestions: Vec<Suggestion>,
}

impl HandOffRun {
    pub fn start(
        model_id: impl Into<String>,
        prompt_version: impl Into<String>,
        input_snapshot: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: now_epoch_ms(),
            completed_at: None,
            model_id: model_id.into(),
            prompt_version: prompt_version.into(),
            input_snapshot: input_snapshot.into(),
            status: RunStatus::Running,
            error_message: None,
            suggestions: Vec::new(),
        }
    }

    /// Moves a running run into `status` and stamps `completed_at`.
    pub fn finish(
        &mut self,
        status: RunStatus,
        error_message: Option<String>,
        at: i64,
    ) -> Result<(), RunTransitionError> {
        if !status.is_terminal() {
            return Err(RunTransitionError::NotTerminal);
        }
        if self.status.is_terminal() {
            return Err(RunTransitionError::AlreadyFinished(self.status));
        }
        self.status = status;
        self.error_message = error_message;
        self.completed_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub kind: SuggestionKind,
    /// Versioned JSON blob; opaque to core.
    pub payload_json: String,
    pub confidence: Option<f64>,
    /// Append-only, ordered by `decided_at`.
    pub decisions: Vec<SuggestionDecision>,
}

impl Suggestion {
    pub fn new(kind: SuggestionKind, payload_json: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload_json: payload_json.into(),
            confidence,
            decisions: Vec::new(),
        }
    }

    pub fn has_accepted_decision(&self) -> bool {
        self.decisions
            .iter()
            .any(|decision| decision.decision == DecisionType::Accepted)
    }

    /// Whether some later decision already reverses `decision_id`.
    pub fn is_undone(&self, decision_id: Uuid) -> bool {
        self.decisions
            .iter()
            .any(|decision| decision.undo_of_decision_id == Some(decision_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionDecision {
    pub id: Uuid,
    pub decision: DecisionType,
    pub decided_at: i64,
    pub decided_by: DecisionSource,
    pub undo_of_decision_id: Option<Uuid>,
}

impl SuggestionDecision {
    pub fn new(decision: DecisionType, decided_by: DecisionSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            decision,
            decided_at: now_epoch_ms(),
            decided_by,
            undo_of_decision_id: None,
        }
    }

    pub fn undo_of(
        decision_id: Uuid,
        decision: DecisionType,
        decided_by: DecisionSource,
    ) -> Self {
        Self {
            undo_of_decision_id: Some(decision_id),
            ..Self::new(decision, decided_by)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HandOffRun, RunStatus, RunTransitionError};

    #[test]
    fn run_finishes_exactly_once() {
        let mut run = HandOffRun::start("on-device", "v1", "text");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        run.finish(RunStatus::Completed, None, 42).unwrap();
        assert_eq!(run.completed_at, Some(42));

        let err = run
            .finish(RunStatus::Failed, Some("late".into()), 99)
            .unwrap_err();
        assert_eq!(err, RunTransitionError::AlreadyFinished(RunStatus::Completed));
        assert_eq!(run.completed_at, Some(42));
        assert!(run.error_message.is_none());
    }

    #[test]
    fn run_cannot_finish_into_running() {
        let mut run = HandOffRun::start("m", "v1", "text");
        assert_eq!(
            run.finish(RunStatus::Running, None, 1),
            Err(RunTransitionError::NotTerminal)
        );
    }
}
