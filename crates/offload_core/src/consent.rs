//! Consent Gate.
//!
//! # Invariants
//! - Cloud generation is attempted only while the flag reads `true`.
//! - The flag changes only through `set_cloud_ai_enabled`.
//! - A store that cannot read its flag reports `false`.

use crate::repo::RepoResult;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};

/// Settings key for the persisted flag.
pub const CLOUD_AI_CONSENT_KEY: &str = "cloud_ai_enabled";

pub trait ConsentStore: Send + Sync {
    fn is_cloud_ai_enabled(&self) -> bool;
    fn set_cloud_ai_enabled(&self, enabled: bool) -> RepoResult<()>;
}

/// Process-local consent flag, off by default.
#[derive(Debug, Default)]
pub struct InMemoryConsentStore {
    enabled: AtomicBool,
}

impl InMemoryConsentStore {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }
}

impl ConsentStore for InMemoryConsentStore {
    fn is_cloud_ai_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_cloud_ai_enabled(&self, enabled: bool) -> RepoResult<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!("event=consent_change module=consent status=ok enabled={enabled}");
        Ok(())
    }
}
