//! Cloud hand-off plumbing: transport, wire contracts, errors, and sessions.
//!
//! # Responsibility
//! - Talk JSON over HTTPS to the generation backend.
//! - Keep the bearer session fresh and retry at most once on rejection.
//!
//! # Invariants
//! - Nothing in this module falls back to local generation; that policy
//!   lives in `breakdown`.

pub mod client;
pub mod contracts;
pub mod error;
pub mod session;
pub mod transport;

pub use client::{BackendClient, Endpoint, AUTHORIZATION_HEADER, OPT_IN_HEADER};
pub use error::{map_status, BackendError, BackendResult};
pub use session::{Session, SessionManager, REFRESH_THRESHOLD_SECS};
pub use transport::{resolve_url, ApiRequest, ApiTransport, HttpMethod, HttpTransport, TransportError};
