use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directed "blocks" edge: `goal_id` stays blocked until `depends_on_id`
/// is completed.
///
/// The edge set is always acyclic and both endpoints share a workspace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskDep {
    pub goal_id: Uuid,
    pub depends_on_id: Uuid,
}
