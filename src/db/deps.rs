//! Dependency edges between goals and cycle detection.
//!
//! An edge `(goal, depends_on)` means `goal` is blocked until `depends_on`
//! is completed. Edges never cross workspaces and the graph stays acyclic.

use std::collections::{BTreeSet, HashSet, VecDeque};

use rusqlite::Connection;
use uuid::Uuid;

use super::error::{EntityKind, Result, StoreError};
use super::goals::fetch_goal;
use super::{parse_uuid, Database, Op};
use crate::models::{Goal, TaskDep};

/// Whether `to` is reachable from `from` by following `depends_on` edges
/// whose target lives in `workspace_id`.
fn reaches(
    conn: &Connection,
    from: Uuid,
    to: Uuid,
    workspace_id: Option<Uuid>,
) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT d.depends_on_id FROM task_deps d
         JOIN goals g ON g.id = d.depends_on_id
         WHERE d.goal_id = ? AND g.workspace_id IS ?",
    )?;
    let workspace = workspace_id.map(|u| u.to_string());

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut queue: VecDeque<Uuid> = VecDeque::new();
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            return Ok(true);
        }
        if !visited.insert(current) {
            continue;
        }

        let next = stmt
            .query_map((current.to_string(), &workspace), |row| {
                row.get::<_, String>(0).map(parse_uuid)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        queue.extend(next.into_iter().filter(|id| !visited.contains(id)));
    }

    Ok(false)
}

/// Validate and insert one edge. Nothing is written when validation fails.
/// Returns the number of rows written (0 for an existing edge).
fn insert_edge(conn: &Connection, goal: &Goal, depends_on: &Goal) -> Result<usize> {
    if goal.id == depends_on.id || reaches(conn, depends_on.id, goal.id, goal.workspace_id)? {
        return Err(StoreError::CircularDependency {
            goal: goal.id,
            depends_on: depends_on.id,
        });
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO task_deps (goal_id, depends_on_id) VALUES (?, ?)",
        (goal.id.to_string(), depends_on.id.to_string()),
    )?;
    Ok(inserted)
}

fn same_workspace(goal: &Goal, other: &Goal) -> bool {
    goal.workspace_id == other.workspace_id
}

/// Add the edge `goal_id -> depends_on_id` with every graph check applied:
/// no self references, both goals present and in one workspace, no cycle.
pub(crate) fn link(conn: &Connection, goal_id: Uuid, depends_on_id: Uuid) -> Result<usize> {
    if goal_id == depends_on_id {
        return Err(StoreError::CircularDependency {
            goal: goal_id,
            depends_on: depends_on_id,
        });
    }

    let goal = fetch_goal(conn, goal_id)?;
    let depends_on = fetch_goal(conn, depends_on_id)?;
    if !same_workspace(&goal, &depends_on) {
        return Err(StoreError::validation(
            "depends_on",
            "dependencies cannot cross workspaces",
        ));
    }

    insert_edge(conn, &goal, &depends_on)
}

pub(crate) fn dependencies_of(conn: &Connection, goal_id: Uuid) -> Result<BTreeSet<Uuid>> {
    let mut stmt = conn.prepare("SELECT depends_on_id FROM task_deps WHERE goal_id = ?")?;
    let ids = stmt
        .query_map([goal_id.to_string()], |row| {
            row.get::<_, String>(0).map(parse_uuid)
        })?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(ids)
}

/// Goals in the workspace that still wait on an incomplete dependency.
pub(crate) fn blocked_ids(conn: &Connection, workspace_id: Option<Uuid>) -> Result<HashSet<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT d.goal_id FROM task_deps d
         JOIN goals g ON g.id = d.goal_id
         JOIN goals dep ON dep.id = d.depends_on_id
         WHERE g.workspace_id IS ? AND dep.status != 'completed'",
    )?;
    let ids = stmt
        .query_map([workspace_id.map(|u| u.to_string())], |row| {
            row.get::<_, String>(0).map(parse_uuid)
        })?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(ids)
}

pub(crate) fn all_edges(conn: &Connection) -> Result<Vec<TaskDep>> {
    let mut stmt =
        conn.prepare("SELECT goal_id, depends_on_id FROM task_deps ORDER BY goal_id, depends_on_id")?;
    let edges = stmt
        .query_map([], |row| {
            Ok(TaskDep {
                goal_id: parse_uuid(row.get::<_, String>(0)?),
                depends_on_id: parse_uuid(row.get::<_, String>(1)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

impl Database {
    /// Make `goal_id` wait on `depends_on_id`.
    ///
    /// Fails with `CircularDependency` for self references and for edges that
    /// would close a cycle, and with `Validation` when the goals live in
    /// different workspaces. Adding an existing edge is a no-op.
    pub fn add_dependency(&self, goal_id: Uuid, depends_on_id: Uuid) -> Result<()> {
        self.write(Op::new("add_dependency", EntityKind::Dependency).id(goal_id), |tx| {
            link(tx, goal_id, depends_on_id).map(|_| ())
        })
    }

    /// Remove one edge. Removing an edge that does not exist is a no-op.
    pub fn remove_dependency(&self, goal_id: Uuid, depends_on_id: Uuid) -> Result<()> {
        self.write(Op::new("remove_dependency", EntityKind::Dependency).id(goal_id), |tx| {
            tx.execute(
                "DELETE FROM task_deps WHERE goal_id = ? AND depends_on_id = ?",
                (goal_id.to_string(), depends_on_id.to_string()),
            )?;
            Ok(())
        })
    }

    /// Replace every outgoing edge of `goal_id` in one transaction.
    ///
    /// Self references and targets outside the goal's workspace (including
    /// ids that do not exist) are skipped. A cycle aborts the whole
    /// replacement and the previous edges stay in place.
    pub fn set_dependencies(&self, goal_id: Uuid, depends_on: &[Uuid]) -> Result<BTreeSet<Uuid>> {
        self.write(Op::new("set_dependencies", EntityKind::Dependency).id(goal_id), |tx| {
            let goal = fetch_goal(tx, goal_id)?;
            tx.execute(
                "DELETE FROM task_deps WHERE goal_id = ?",
                [goal_id.to_string()],
            )?;

            for &target_id in depends_on {
                if target_id == goal_id {
                    continue;
                }
                let target = match fetch_goal(tx, target_id) {
                    Ok(target) => target,
                    Err(StoreError::NotFound { .. }) => {
                        tracing::debug!(goal = %goal_id, target = %target_id, "Skipping missing dependency");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if !same_workspace(&goal, &target) {
                    tracing::debug!(goal = %goal_id, target = %target_id, "Skipping cross-workspace dependency");
                    continue;
                }
                insert_edge(tx, &goal, &target)?;
            }

            dependencies_of(tx, goal_id)
        })
    }

    pub fn dependencies(&self, goal_id: Uuid) -> Result<BTreeSet<Uuid>> {
        self.read(Op::new("dependencies", EntityKind::Dependency).id(goal_id), |conn| {
            dependencies_of(conn, goal_id)
        })
    }

    /// True while any dependency of the goal is not completed.
    pub fn is_blocked(&self, goal_id: Uuid) -> Result<bool> {
        self.read(Op::new("is_blocked", EntityKind::Dependency).id(goal_id), |conn| {
            let blocked: bool = conn.query_row(
                "SELECT EXISTS (
                    SELECT 1 FROM task_deps d JOIN goals dep ON dep.id = d.depends_on_id
                    WHERE d.goal_id = ? AND dep.status != 'completed'
                 )",
                [goal_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(blocked)
        })
    }

    pub fn blocked_goal_ids(&self, workspace_id: Uuid) -> Result<HashSet<Uuid>> {
        self.read(Op::new("blocked_goal_ids", EntityKind::Workspace).id(workspace_id), |conn| {
            blocked_ids(conn, Some(workspace_id))
        })
    }
}
