//! Service layer for lifecycle and hand-off use-cases.
//!
//! # Responsibility
//! - Orchestrate repository calls with the entry state machine.
//! - Keep state transition rules out of storage and UI code.

pub mod handoff_coordinator;
pub mod lifecycle_service;
