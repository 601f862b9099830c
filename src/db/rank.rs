//! Manual ordering of goals.
//!
//! A rank is only meaningful inside one scope: the top level of a sprint, the
//! top level of a workspace backlog, or the children of one parent. New goals
//! go to the end of their scope.

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use super::error::{EntityKind, Result, StoreError};
use super::{Database, Op};

pub(crate) fn next_sprint_rank(conn: &Connection, sprint_id: Uuid) -> Result<i64> {
    let rank = conn.query_row(
        "SELECT COALESCE(MAX(rank), 0) + 1 FROM goals WHERE sprint_id = ? AND parent_id IS NULL",
        [sprint_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(rank)
}

pub(crate) fn next_backlog_rank(conn: &Connection, workspace_id: Option<Uuid>) -> Result<i64> {
    let rank = conn.query_row(
        "SELECT COALESCE(MAX(rank), 0) + 1 FROM goals
         WHERE sprint_id IS NULL AND parent_id IS NULL AND workspace_id IS ?",
        [workspace_id.map(|u| u.to_string())],
        |row| row.get(0),
    )?;
    Ok(rank)
}

pub(crate) fn next_subtask_rank(conn: &Connection, parent_id: Uuid) -> Result<i64> {
    let rank = conn.query_row(
        "SELECT COALESCE(MAX(rank), 0) + 1 FROM goals WHERE parent_id = ?",
        [parent_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(rank)
}

/// Next rank for a top-level goal landing in `sprint_id`, or in the backlog
/// of `workspace_id` when there is no sprint.
pub(crate) fn next_top_level_rank(
    conn: &Connection,
    workspace_id: Option<Uuid>,
    sprint_id: Option<Uuid>,
) -> Result<i64> {
    match sprint_id {
        Some(sprint_id) => next_sprint_rank(conn, sprint_id),
        None => next_backlog_rank(conn, workspace_id),
    }
}

fn rank_of(conn: &Connection, goal_id: Uuid) -> Result<i64> {
    conn.query_row(
        "SELECT rank FROM goals WHERE id = ?",
        [goal_id.to_string()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(EntityKind::Goal, goal_id))
}

impl Database {
    /// Exchange the ranks of two goals. Either both change or neither does.
    pub fn swap_ranks(&self, a: Uuid, b: Uuid) -> Result<()> {
        self.write(Op::new("swap_ranks", EntityKind::Goal).id(a), |tx| {
            let rank_a = rank_of(tx, a)?;
            let rank_b = rank_of(tx, b)?;

            tx.execute(
                "UPDATE goals SET rank = ? WHERE id = ?",
                (rank_b, a.to_string()),
            )?;
            tx.execute(
                "UPDATE goals SET rank = ? WHERE id = ?",
                (rank_a, b.to_string()),
            )?;
            Ok(())
        })
    }
}
