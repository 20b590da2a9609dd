//! Domain error taxonomy for backend calls.
//!
//! `TransportError` describes what happened on the wire; `BackendError` is
//! what the rest of core reasons about.

use crate::net::contracts::ApiErrorEnvelope;
use crate::net::transport::TransportError;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

pub const CONSENT_REQUIRED_CODE: &str = "consent_required";
pub const UNKNOWN_ERROR_CODE: &str = "unknown_error";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("cloud AI consent is required")]
    ConsentRequired,
    #[error("no active session")]
    MissingSession,
    #[error("session was rejected by the server")]
    Unauthorized,
    #[error("server error `{code}` (status {status})")]
    Server { code: String, status: u16 },
    #[error("response could not be decoded")]
    InvalidResponse,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<TransportError> for BackendError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::StatusCode { status, body } => map_status(status, &body),
            TransportError::InvalidResponse(_) => Self::InvalidResponse,
            TransportError::InvalidUrl(message) | TransportError::Transport(message) => {
                Self::Transport(message)
            }
        }
    }
}

/// Maps a non-2xx reply onto the domain taxonomy.
///
/// 401 is always `Unauthorized`; otherwise the `{error:{code,..}}` envelope
/// decides, and an undecodable body becomes `unknown_error`.
pub fn map_status(status: u16, body: &[u8]) -> BackendError {
    if status == 401 {
        return BackendError::Unauthorized;
    }

    match serde_json::from_slice::<ApiErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.code == CONSENT_REQUIRED_CODE => {
            BackendError::ConsentRequired
        }
        Ok(envelope) => BackendError::Server {
            code: envelope.error.code,
            status,
        },
        Err(_) => BackendError::Server {
            code: UNKNOWN_ERROR_CODE.to_string(),
            status,
        },
    }
}
