//! Recording identity and match-status state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Fingerprinted,
    Matched,
    TooShort,
    Flag,
    /// Unset/null: reverted to the pending queue, e.g. after cancellation.
    Unset,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Fingerprinted => "fingerprinted",
            MatchStatus::Matched => "matched",
            MatchStatus::TooShort => "too_short",
            MatchStatus::Flag => "flag",
            MatchStatus::Unset => "unset",
        }
    }
}

/// A row in the persisted recordings table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub external_id: String,
    pub duration_frames: Option<u32>,
    pub match_status: MatchStatus,
    pub original_recording_id: Option<Uuid>,
}

impl Recording {
    pub fn new(id: Uuid, external_id: impl Into<String>) -> Self {
        Recording {
            id,
            external_id: external_id.into(),
            duration_frames: None,
            match_status: MatchStatus::Pending,
            original_recording_id: None,
        }
    }
}
