use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;
pub const DEFAULT_PRIORITY: u8 = 3;

/// Clamp an arbitrary priority into `MIN_PRIORITY..=MAX_PRIORITY`.
pub fn clamp_priority(priority: i64) -> u8 {
    priority.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8
}

/// A unit of intent, the central entity of the store.
///
/// Goals form a tree via `parent_id`. A goal with no `sprint_id` sits in the
/// backlog of its workspace. `rank` orders a goal within exactly one scope:
/// its sprint (top-level), its workspace backlog (top-level), or its siblings
/// under the same parent.
///
/// Each goal carries its own task timer, independent of sprint timers. The
/// timer is never ticked; elapsed time is computed on read by
/// [`Goal::task_elapsed_seconds`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Uuid>,
    /// `None` means the goal is in the backlog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<Uuid>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: GoalStatus,
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<Effort>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    /// Raw recurrence rule, see [`crate::recurrence::RecurrenceRule`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
    pub rank: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub task_elapsed_seconds: i64,
    #[serde(default)]
    pub task_active: bool,
}

impl Goal {
    pub fn is_backlog(&self) -> bool {
        self.sprint_id.is_none()
    }

    /// Accumulated task time, including the running stretch if the timer is active.
    pub fn task_elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        match (self.task_active, self.task_started_at) {
            (true, Some(started)) => {
                self.task_elapsed_seconds + (now - started).num_seconds().max(0)
            }
            _ => self.task_elapsed_seconds,
        }
    }
}

/// The status of a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    Completed,
    Archived,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// T-shirt size estimate for a goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl Effort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xs => "xs",
            Self::S => "s",
            Self::M => "m",
            Self::L => "l",
            Self::Xl => "xl",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xs" => Some(Self::Xs),
            "s" => Some(Self::S),
            "m" => Some(Self::M),
            "l" => Some(Self::L),
            "xl" => Some(Self::Xl),
            _ => None,
        }
    }
}

/// Input for creating a goal.
///
/// For subtasks (`Database::add_subtask`) the `workspace_id` and `sprint_id`
/// fields are ignored: a subtask always inherits both from its parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateGoalInput {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Uuid>,
    /// `None` places the goal in the backlog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<Uuid>,
    /// Out-of-range values are clamped. Defaults to [`DEFAULT_PRIORITY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<Effort>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
}

impl CreateGoalInput {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn in_workspace(mut self, workspace_id: Uuid) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    pub fn in_sprint(mut self, sprint_id: Uuid) -> Self {
        self.sprint_id = Some(sprint_id);
        self
    }
}

/// Input for editing a goal's free-form fields. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGoalInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<Effort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
}

/// A goal with its nested subtasks, used for tree views.
///
/// `blocked` is a view-only flag derived from the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalTreeNode {
    #[serde(flatten)]
    pub goal: Goal,
    pub blocked: bool,
    pub children: Vec<GoalTreeNode>,
}
