//! Capture entry and its lifecycle state machine.
//!
//! # Invariants
//! - `raw -> handedOff -> ready -> placed`, with `archived` reachable from
//!   `raw`, `handedOff`, and `ready`.
//! - Nothing leaves `placed` or `archived`; archiving twice is a no-op.
//! - `accepted_suggestion_id` is set only by the `handedOff -> ready` step.

use crate::model::handoff::{HandOffRequest, HandOffRun, Suggestion, SuggestionDecision};
use crate::model::now_epoch_ms;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type EntryId = Uuid;

wire_enum! {
    InputType, field = "input_type", fallback = Text, {
        Text => "text",
        Voice => "voice",
    }
}

wire_enum! {
    CaptureSource, field = "source", fallback = App, {
        App => "app",
        Shortcut => "shortcut",
        ShareSheet => "shareSheet",
        Widget => "widget",
    }
}

wire_enum! {
    /// Entry progression from capture to placement.
    LifecycleState, field = "lifecycle_state", fallback = Raw, {
        Raw => "raw",
        HandedOff => "handedOff",
        Ready => "ready",
        Placed => "placed",
        Archived => "archived",
    }
}

/// Operations that may move an entry between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    HandOff,
    Accept,
    Place,
    Archive,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandOff => "hand_off",
            Self::Accept => "accept",
            Self::Place => "place",
            Self::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The entry is `placed` or `archived`.
    Terminal(LifecycleState),
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal(state) => write!(f, "entry is in terminal state `{state}`"),
            Self::InvalidTransition { from, event } => {
                write!(f, "cannot apply `{}` to entry in state `{from}`", event.as_str())
            }
        }
    }
}

impl Error for TransitionError {}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Placed | Self::Archived)
    }

    /// Returns the state reached by applying `event`.
    ///
    /// Repeated hand-offs keep `handedOff`/`ready` unchanged.
    pub fn apply(self, event: LifecycleEvent) -> Result<LifecycleState, TransitionError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        match (self, event) {
            (S::Archived, E::Archive) => Ok(S::Archived),
            (S::Placed, E::Archive) => Err(TransitionError::InvalidTransition {
                from: self,
                event,
            }),
            (state, _) if state.is_terminal() => Err(TransitionError::Terminal(state)),
            (_, E::Archive) => Ok(S::Archived),
            (S::Raw, E::HandOff) => Ok(S::HandedOff),
            (S::HandedOff | S::Ready, E::HandOff) => Ok(self),
            (S::HandedOff, E::Accept) => Ok(S::Ready),
            (S::Ready, E::Place) => Ok(S::Placed),
            _ => Err(TransitionError::InvalidTransition { from: self, event }),
        }
    }
}

/// Captured thought plus the hand-off subtree it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEntry {
    pub id: EntryId,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub raw_text: String,
    pub input_type: InputType,
    pub source: CaptureSource,
    pub lifecycle_state: LifecycleState,
    pub accepted_suggestion_id: Option<Uuid>,
    /// Free-text tag names awaiting canonicalization.
    pub legacy_tags: Vec<String>,
    /// Ordered by `requested_at`.
    pub requests: Vec<HandOffRequest>,
}

impl CaptureEntry {
    /// Creates a new `raw` entry.
    pub fn new(raw_text: impl Into<String>, input_type: InputType, source: CaptureSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now_epoch_ms(),
            raw_text: raw_text.into(),
            input_type,
            source,
            lifecycle_state: LifecycleState::Raw,
            accepted_suggestion_id: None,
            legacy_tags: Vec::new(),
            requests: Vec::new(),
        }
    }

    pub fn runs(&self) -> impl Iterator<Item = &HandOffRun> {
        self.requests.iter().flat_map(|request| request.runs.iter())
    }

    pub fn suggestions(&self) -> impl Iterator<Item = &Suggestion> {
        self.runs().flat_map(|run| run.suggestions.iter())
    }

    pub fn find_request(&self, request_id: Uuid) -> Option<&HandOffRequest> {
        self.requests.iter().find(|request| request.id == request_id)
    }

    pub fn find_run(&self, run_id: Uuid) -> Option<&HandOffRun> {
        self.runs().find(|run| run.id == run_id)
    }

    pub fn find_suggestion(&self, suggestion_id: Uuid) -> Option<&Suggestion> {
        self.suggestions()
            .find(|suggestion| suggestion.id == suggestion_id)
    }

    /// Returns the decision and the suggestion it belongs to.
    pub fn find_decision(&self, decision_id: Uuid) -> Option<(&Suggestion, &SuggestionDecision)> {
        self.suggestions().find_map(|suggestion| {
            suggestion
                .decisions
                .iter()
                .find(|decision| decision.id == decision_id)
                .map(|decision| (suggestion, decision))
        })
    }

    /// Suggestions with no `accepted` decision, across every run.
    pub fn pending_suggestions(&self) -> Vec<&Suggestion> {
        self.suggestions()
            .filter(|suggestion| !suggestion.has_accepted_decision())
            .collect()
    }
}
