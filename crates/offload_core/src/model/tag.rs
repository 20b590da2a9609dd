//! Tag records and name normalization.
//!
//! # Invariants
//! - Two tags are the same tag iff their normalized names are equal.
//! - Normalization trims, case-folds, and collapses inner whitespace runs.

use crate::model::now_epoch_ms;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

pub type TagId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub created_at: i64,
}

impl Tag {
    /// Creates a tag with whitespace tidied but case preserved.
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: display_tag_name(name),
            created_at: now_epoch_ms(),
        }
    }

    pub fn key(&self) -> Option<String> {
        normalize_tag_name(&self.name)
    }
}

/// Canonical comparison key for a tag name; `None` for blank names.
pub fn normalize_tag_name(name: &str) -> Option<String> {
    let collapsed = display_tag_name(name);
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

fn display_tag_name(name: &str) -> String {
    WHITESPACE_RE.replace_all(name.trim(), " ").into_owned()
}
