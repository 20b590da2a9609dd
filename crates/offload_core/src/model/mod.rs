//! Domain model for captures and the hand-off audit trail.
//!
//! # Responsibility
//! - Define records for capture entries, hand-off requests/runs,
//!   suggestions, decisions, placements, and tags.
//! - Own the pure lifecycle rules (entry state machine, run sub-machine).
//!
//! # Invariants
//! - Request -> run -> suggestion -> decision is a strict ownership tree
//!   rooted at the entry; collections are always present, possibly empty.
//! - `Placement` refers to its suggestion and target by id only.
//! - Every enum has one stable storage string; unknown strings decode to a
//!   documented fallback and are logged, never silently.

use crate::logging::log_field;
use log::warn;

/// Stable string mapping shared by storage and the wire.
pub trait WireEnum: Sized + Copy + 'static {
    /// Column/field name used in fallback diagnostics.
    const FIELD: &'static str;
    /// Value used when a stored string is not recognized.
    const FALLBACK: Self;

    fn as_wire(self) -> &'static str;
    fn from_wire(value: &str) -> Option<Self>;
}

/// Decodes a stored string, logging and substituting `T::FALLBACK` when the
/// value is unknown.
pub fn decode_or_fallback<T: WireEnum>(value: &str) -> T {
    T::from_wire(value).unwrap_or_else(|| {
        warn!(
            "event=enum_fallback module=model status=fallback field={} value={} fallback={}",
            T::FIELD,
            log_field(value),
            T::FALLBACK.as_wire()
        );
        T::FALLBACK
    })
}

/// Current time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, field = $field:literal, fallback = $fallback:ident,
        { $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $crate::model::WireEnum for $name {
            const FIELD: &'static str = $field;
            const FALLBACK: Self = Self::$fallback;

            fn as_wire(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire ),+
                }
            }

            fn from_wire(value: &str) -> Option<Self> {
                match value {
                    $( $wire => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::model::WireEnum::as_wire(*self))
            }
        }
    };
}

pub mod capture;
pub mod handoff;
pub mod placement;
pub mod tag;
