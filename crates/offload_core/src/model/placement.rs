//! Placement audit records.
//!
//! A placement names where an accepted suggestion ended up. It holds plain
//! ids instead of owned references, so it outlives the entry, suggestion,
//! and target it describes.

use crate::model::now_epoch_ms;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

wire_enum! {
    PlacementTargetType, field = "target_type", fallback = Task, {
        Plan => "plan",
        Task => "task",
        List => "list",
        ListItem => "listItem",
        Communication => "communication",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub id: Uuid,
    pub placed_at: i64,
    pub target_type: PlacementTargetType,
    pub target_id: Uuid,
    pub source_suggestion_id: Uuid,
    pub notes: Option<String>,
}

impl Placement {
    pub fn new(
        target_type: PlacementTargetType,
        target_id: Uuid,
        source_suggestion_id: Uuid,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            placed_at: now_epoch_ms(),
            target_type,
            target_id,
            source_suggestion_id,
            notes,
        }
    }
}
