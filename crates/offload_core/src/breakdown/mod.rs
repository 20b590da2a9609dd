//! Task breakdown generation: cloud first when allowed, on-device otherwise.

pub mod fallback;
pub mod local;
pub mod service;

pub use fallback::{classify, should_fallback_to_on_device, FallbackDecision, BLOCKING_CODES};
pub use local::{OnDeviceGenerator, SimpleOnDeviceGenerator, PLACEHOLDER_STEP};
pub use service::{BreakdownError, BreakdownResult, BreakdownService, BreakdownSource};
