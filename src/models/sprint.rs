use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Highest sprint number a day can hold in one workspace.
pub const MAX_SPRINTS_PER_DAY: u8 = 8;

/// A time-boxed block of work within one day and one workspace.
///
/// Sprints are numbered `1..=MAX_SPRINTS_PER_DAY` per workspace and day. At
/// most one sprint per workspace is `Active` at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sprint {
    pub id: Uuid,
    pub day_id: Uuid,
    pub workspace_id: Uuid,
    pub sprint_number: u8,
    pub status: SprintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_paused_at: Option<DateTime<Utc>>,
    /// Seconds accumulated by previous active stretches.
    #[serde(default)]
    pub elapsed_seconds: i64,
}

impl Sprint {
    /// Total elapsed seconds, folding in the running stretch while active.
    pub fn elapsed(&self, now: DateTime<Utc>) -> i64 {
        match (self.status, self.start_time) {
            (SprintStatus::Active, Some(start)) => {
                self.elapsed_seconds + (now - start).num_seconds().max(0)
            }
            _ => self.elapsed_seconds,
        }
    }
}

/// The lifecycle state of a sprint.
///
/// - `Pending`: Allocated but never started
/// - `Active`: Timer running
/// - `Paused`: Timer stopped, can be resumed
/// - `Completed`: Finished, `end_time` stamped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Pending,
    Active,
    Paused,
    Completed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}
