//! Data migrations that run after schema migrations.
//!
//! # Invariants
//! - Each pass is idempotent; re-running over migrated data writes nothing.
//! - Each pass runs inside one transaction and either commits fully or
//!   leaves the database untouched.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod tag_canonicalization;

pub use tag_canonicalization::{canonicalize_tags, CanonicalizationReport};

#[derive(Debug)]
pub enum CanonicalizationError {
    Sqlite(rusqlite::Error),
}

impl Display for CanonicalizationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CanonicalizationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for CanonicalizationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
