use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A timestamped note scoped to a day and workspace.
///
/// Entries can optionally point at the sprint or goal they were written
/// about. Deleting that sprint or goal keeps the entry and clears the link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: Uuid,
    pub day_id: Uuid,
    pub workspace_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,
    /// The note content (markdown supported).
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for writing a journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJournalEntryInput {
    pub workspace_id: Uuid,
    /// The day the entry belongs to; the day row is created on demand.
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}
