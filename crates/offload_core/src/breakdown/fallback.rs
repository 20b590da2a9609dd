//! Fallback Decision Engine.
//!
//! Classifies a failed cloud call into "run the on-device generator" or
//! "surface to the caller". Blocking codes and 429 always surface.

use crate::net::error::BackendError;

/// Server codes that must reach the user instead of being papered over.
pub const BLOCKING_CODES: [&str; 4] = [
    "quota_exceeded",
    "feature_disabled",
    "safety_blocked",
    "consent_required",
];

const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    OnDevice,
    Surface,
}

pub fn classify(error: &BackendError) -> FallbackDecision {
    if should_fallback_to_on_device(error) {
        FallbackDecision::OnDevice
    } else {
        FallbackDecision::Surface
    }
}

pub fn should_fallback_to_on_device(error: &BackendError) -> bool {
    match error {
        BackendError::Transport(_) | BackendError::InvalidResponse => true,
        BackendError::Server { code, status } => {
            if BLOCKING_CODES.contains(&code.as_str()) || *status == TOO_MANY_REQUESTS {
                return false;
            }
            *status >= 500
        }
        BackendError::ConsentRequired | BackendError::MissingSession | BackendError::Unauthorized => {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, should_fallback_to_on_device, FallbackDecision};
    use crate::net::error::BackendError;

    fn server(code: &str, status: u16) -> BackendError {
        BackendError::Server {
            code: code.to_string(),
            status,
        }
    }

    #[test]
    fn transport_and_decode_failures_fall_back() {
        assert!(should_fallback_to_on_device(&BackendError::Transport(
            "connection reset".into()
        )));
        assert!(should_fallback_to_on_device(&BackendError::InvalidResponse));
    }

    #[test]
    fn blocking_codes_surface_regardless_of_status() {
        for code in ["quota_exceeded", "feature_disabled", "safety_blocked", "consent_required"] {
            assert!(!should_fallback_to_on_device(&server(code, 503)), "{code}");
            assert!(!should_fallback_to_on_device(&server(code, 400)), "{code}");
        }
    }

    #[test]
    fn rate_limit_surfaces_with_any_code() {
        assert!(!should_fallback_to_on_device(&server("unknown_error", 429)));
        assert!(!should_fallback_to_on_device(&server("provider_down", 429)));
    }

    #[test]
    fn other_server_errors_fall_back_only_from_500() {
        assert!(should_fallback_to_on_device(&server("mystery", 500)));
        assert!(should_fallback_to_on_device(&server("unknown_error", 502)));
        assert!(!should_fallback_to_on_device(&server("bad_request", 400)));
        assert!(!should_fallback_to_on_device(&server("unknown_error", 499)));
    }

    #[test]
    fn session_and_consent_errors_surface() {
        for error in [
            BackendError::ConsentRequired,
            BackendError::MissingSession,
            BackendError::Unauthorized,
        ] {
            assert_eq!(classify(&error), FallbackDecision::Surface);
        }
    }
}
