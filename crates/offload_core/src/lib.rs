//! Core hand-off orchestration for Offload.
//! This crate is the single source of truth for business invariants.

pub mod breakdown;
pub mod config;
pub mod consent;
pub mod db;
pub mod logging;
pub mod migration;
pub mod model;
pub mod net;
pub mod repo;
pub mod service;
pub mod usage;

pub use breakdown::{
    BreakdownError, BreakdownResult, BreakdownService, BreakdownSource, OnDeviceGenerator,
    SimpleOnDeviceGenerator,
};
pub use config::{BackendConfig, ClientIdentity};
pub use consent::{ConsentStore, InMemoryConsentStore};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::capture::{CaptureEntry, CaptureSource, EntryId, InputType, LifecycleState};
pub use net::{ApiTransport, BackendClient, BackendError, HttpTransport, TransportError};
pub use repo::capture_repo::{CaptureRepository, SqliteCaptureRepository};
pub use repo::placement_repo::{PlacementRepository, SqlitePlacementRepository};
pub use repo::preferences_repo::SqlitePreferenceStore;
pub use repo::tag_repo::{SqliteTagRepository, TagRepository};
pub use repo::{RepoError, RepoResult};
pub use service::handoff_coordinator::{HandOffCoordinator, OrganizeError, OrganizeOutcome};
pub use service::lifecycle_service::{LifecycleError, LifecycleService};
pub use usage::{InMemoryUsageCounterStore, UsageCounter, UsageCounterStore, UsageReconciler};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
