//! Whole-store snapshots for vault export and additive import.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::days::{day_from_row, ensure_day_row};
use super::deps::{all_edges, link};
use super::error::{EntityKind, Result, StoreError};
use super::goals::{goal_from_row, insert_goal_row, GOAL_COLUMNS};
use super::journal::{insert_journal_row, journal_from_row, JOURNAL_COLUMNS};
use super::rank::{next_subtask_rank, next_top_level_rank};
use super::sprints::{find_sprint_in_slot, insert_sprint_row, sprint_from_row, SPRINT_COLUMNS};
use super::workspaces::{
    find_workspace_by_slug, insert_workspace_row, workspace_from_row, WORKSPACE_COLUMNS,
};
use super::{Database, Op};
use crate::models::*;

/// Every row of the store, grouped by table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub days: Vec<Day>,
    #[serde(default)]
    pub sprints: Vec<Sprint>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub journal_entries: Vec<JournalEntry>,
    #[serde(default)]
    pub task_deps: Vec<TaskDep>,
}

/// What an import added to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub workspaces_created: usize,
    /// Imported workspaces whose slug already existed.
    pub workspaces_merged: usize,
    pub sprints_created: usize,
    pub sprints_merged: usize,
    pub goals: usize,
    pub journal_entries: usize,
    pub dependencies: usize,
    /// Rows dropped because something they point at is not in the snapshot,
    /// plus dependency edges that would cross workspaces or close a cycle.
    pub skipped: usize,
}

fn select_all<T>(
    conn: &Connection,
    sql: &str,
    from_row: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Parents before children, then by rank, so appending keeps the order.
fn insertion_order(goals: &[Goal]) -> Vec<&Goal> {
    let parents: HashMap<Uuid, Option<Uuid>> =
        goals.iter().map(|g| (g.id, g.parent_id)).collect();

    let depth = |goal: &Goal| {
        let mut depth = 0;
        let mut current = goal.parent_id;
        while let Some(parent) = current {
            depth += 1;
            if depth > goals.len() {
                break;
            }
            current = parents.get(&parent).copied().flatten();
        }
        depth
    };

    let mut ordered: Vec<(usize, &Goal)> = goals.iter().map(|g| (depth(g), g)).collect();
    ordered.sort_by_key(|(depth, g)| (*depth, g.rank, g.created_at));
    ordered.into_iter().map(|(_, g)| g).collect()
}

impl Database {
    /// Read every table in one consistent pass.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.read(Op::new("snapshot", EntityKind::Store), |conn| {
            Ok(Snapshot {
                workspaces: select_all(
                    conn,
                    &format!("SELECT {} FROM workspaces ORDER BY created_at", WORKSPACE_COLUMNS),
                    workspace_from_row,
                )?,
                days: select_all(
                    conn,
                    "SELECT id, date, started_at FROM days ORDER BY date",
                    day_from_row,
                )?,
                sprints: select_all(
                    conn,
                    &format!("SELECT {} FROM sprints ORDER BY day_id, sprint_number", SPRINT_COLUMNS),
                    sprint_from_row,
                )?,
                goals: select_all(
                    conn,
                    &format!("SELECT {} FROM goals ORDER BY created_at", GOAL_COLUMNS),
                    goal_from_row,
                )?,
                journal_entries: select_all(
                    conn,
                    &format!("SELECT {} FROM journal_entries ORDER BY created_at", JOURNAL_COLUMNS),
                    journal_from_row,
                )?,
                task_deps: all_edges(conn)?,
            })
        })
    }

    /// Add a snapshot to the store in one transaction.
    ///
    /// Every imported row gets a fresh id. Workspaces merge by slug, days by
    /// date and sprints by workspace, day and number; goals and journal
    /// entries are always added. References are rewritten through the id
    /// map. Dependency edges get the same checks as [`Database::add_dependency`];
    /// an edge that fails them is skipped and counted, the rest of the
    /// import goes ahead.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<ImportSummary> {
        self.write(Op::new("import_snapshot", EntityKind::Store), |tx| {
            let mut summary = ImportSummary::default();

            let mut workspace_ids: HashMap<Uuid, Uuid> = HashMap::new();
            for workspace in &snapshot.workspaces {
                let id = match find_workspace_by_slug(tx, &workspace.slug)? {
                    Some(existing) => {
                        summary.workspaces_merged += 1;
                        existing.id
                    }
                    None => {
                        let fresh = Workspace {
                            id: Uuid::new_v4(),
                            ..workspace.clone()
                        };
                        insert_workspace_row(tx, &fresh)?;
                        summary.workspaces_created += 1;
                        fresh.id
                    }
                };
                workspace_ids.insert(workspace.id, id);
            }

            let mut day_ids: HashMap<Uuid, Uuid> = HashMap::new();
            for day in &snapshot.days {
                day_ids.insert(day.id, ensure_day_row(tx, day.date)?.id);
            }

            let mut sprint_ids: HashMap<Uuid, Uuid> = HashMap::new();
            for sprint in &snapshot.sprints {
                let (Some(&workspace_id), Some(&day_id)) = (
                    workspace_ids.get(&sprint.workspace_id),
                    day_ids.get(&sprint.day_id),
                ) else {
                    summary.skipped += 1;
                    continue;
                };
                let id = match find_sprint_in_slot(tx, workspace_id, day_id, sprint.sprint_number)? {
                    Some(existing) => {
                        summary.sprints_merged += 1;
                        existing.id
                    }
                    None => {
                        // Never import a second active sprint into a workspace
                        let status = match sprint.status {
                            SprintStatus::Active => SprintStatus::Paused,
                            other => other,
                        };
                        let fresh = Sprint {
                            id: Uuid::new_v4(),
                            day_id,
                            workspace_id,
                            status,
                            ..sprint.clone()
                        };
                        insert_sprint_row(tx, &fresh)?;
                        summary.sprints_created += 1;
                        fresh.id
                    }
                };
                sprint_ids.insert(sprint.id, id);
            }

            let mut goal_ids: HashMap<Uuid, Uuid> = HashMap::new();
            for goal in insertion_order(&snapshot.goals) {
                let parent_id = goal.parent_id.and_then(|p| goal_ids.get(&p).copied());
                let workspace_id = goal.workspace_id.and_then(|w| workspace_ids.get(&w).copied());
                let sprint_id = goal.sprint_id.and_then(|s| sprint_ids.get(&s).copied());
                let rank = match parent_id {
                    Some(parent_id) => next_subtask_rank(tx, parent_id)?,
                    None => next_top_level_rank(tx, workspace_id, sprint_id)?,
                };

                let fresh = Goal {
                    id: Uuid::new_v4(),
                    parent_id,
                    workspace_id,
                    sprint_id,
                    rank,
                    ..goal.clone()
                };
                insert_goal_row(tx, &fresh)?;
                goal_ids.insert(goal.id, fresh.id);
                summary.goals += 1;
            }

            for entry in &snapshot.journal_entries {
                let (Some(&workspace_id), Some(&day_id)) = (
                    workspace_ids.get(&entry.workspace_id),
                    day_ids.get(&entry.day_id),
                ) else {
                    summary.skipped += 1;
                    continue;
                };
                let fresh = JournalEntry {
                    id: Uuid::new_v4(),
                    day_id,
                    workspace_id,
                    sprint_id: entry.sprint_id.and_then(|s| sprint_ids.get(&s).copied()),
                    goal_id: entry.goal_id.and_then(|g| goal_ids.get(&g).copied()),
                    ..entry.clone()
                };
                insert_journal_row(tx, &fresh)?;
                summary.journal_entries += 1;
            }

            for dep in &snapshot.task_deps {
                let (Some(goal_id), Some(depends_on_id)) = (
                    goal_ids.get(&dep.goal_id),
                    goal_ids.get(&dep.depends_on_id),
                ) else {
                    summary.skipped += 1;
                    continue;
                };
                match link(tx, *goal_id, *depends_on_id) {
                    Ok(inserted) => summary.dependencies += inserted,
                    Err(e @ (StoreError::CircularDependency { .. } | StoreError::Validation { .. })) => {
                        tracing::debug!(goal = %goal_id, depends_on = %depends_on_id, error = %e, "Skipping imported dependency");
                        summary.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            tracing::info!(
                goals = summary.goals,
                journal_entries = summary.journal_entries,
                dependencies = summary.dependencies,
                skipped = summary.skipped,
                "Imported snapshot"
            );
            Ok(summary)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn goal(id: Uuid, parent_id: Option<Uuid>, rank: i64) -> Goal {
        Goal {
            id,
            parent_id,
            workspace_id: None,
            sprint_id: None,
            description: "g".to_string(),
            notes: None,
            status: GoalStatus::Pending,
            priority: 3,
            effort: None,
            tags: vec![],
            links: vec![],
            recurrence_rule: None,
            rank,
            created_at: Utc::now(),
            completed_at: None,
            archived_at: None,
            task_started_at: None,
            task_elapsed_seconds: 0,
            task_active: false,
        }
    }

    #[test]
    fn test_insertion_order_puts_parents_first() {
        let (root, child, grandchild, other) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let goals = vec![
            goal(grandchild, Some(child), 1),
            goal(child, Some(root), 1),
            goal(other, None, 2),
            goal(root, None, 1),
        ];

        let order: Vec<Uuid> = insertion_order(&goals).iter().map(|g| g.id).collect();
        assert_eq!(order, vec![root, other, child, grandchild]);
    }
}
