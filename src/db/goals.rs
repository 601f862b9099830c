use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::deps::blocked_ids;
use super::error::{EntityKind, Result, StoreError};
use super::query::{GoalOrder, GoalPredicate, GoalQuery, SearchQuery};
use super::rank::{next_backlog_rank, next_subtask_rank, next_top_level_rank};
use super::sprints::fetch_sprint;
use super::workspaces::ensure_workspace_exists;
use super::{opt_datetime, opt_uuid, parse_datetime, parse_string_list, parse_uuid, Database, Op};
use crate::models::*;
use crate::recurrence::RecurrenceRule;

pub(crate) const GOAL_COLUMNS: &str = "id, parent_id, workspace_id, sprint_id, description, notes, \
     status, priority, effort, tags, links, recurrence_rule, rank, created_at, completed_at, \
     archived_at, task_started_at, task_elapsed_seconds, task_active";

pub(crate) fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: parse_uuid(row.get::<_, String>(0)?),
        parent_id: row.get::<_, Option<String>>(1)?.map(parse_uuid),
        workspace_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        sprint_id: row.get::<_, Option<String>>(3)?.map(parse_uuid),
        description: row.get(4)?,
        notes: row.get(5)?,
        status: GoalStatus::from_str(&row.get::<_, String>(6)?).unwrap_or(GoalStatus::Pending),
        priority: clamp_priority(row.get(7)?),
        effort: row
            .get::<_, Option<String>>(8)?
            .as_deref()
            .and_then(Effort::from_str),
        tags: parse_string_list(row.get(9)?),
        links: parse_string_list(row.get(10)?),
        recurrence_rule: row.get(11)?,
        rank: row.get(12)?,
        created_at: parse_datetime(row.get::<_, String>(13)?),
        completed_at: row.get::<_, Option<String>>(14)?.map(parse_datetime),
        archived_at: row.get::<_, Option<String>>(15)?.map(parse_datetime),
        task_started_at: row.get::<_, Option<String>>(16)?.map(parse_datetime),
        task_elapsed_seconds: row.get(17)?,
        task_active: row.get(18)?,
    })
}

pub(crate) fn insert_goal_row(conn: &Connection, goal: &Goal) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO goals ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            GOAL_COLUMNS
        ),
        rusqlite::params![
            goal.id.to_string(),
            opt_uuid(goal.parent_id),
            opt_uuid(goal.workspace_id),
            opt_uuid(goal.sprint_id),
            &goal.description,
            &goal.notes,
            goal.status.as_str(),
            goal.priority,
            goal.effort.map(|e| e.as_str()),
            serde_json::to_string(&goal.tags)?,
            serde_json::to_string(&goal.links)?,
            &goal.recurrence_rule,
            goal.rank,
            goal.created_at.to_rfc3339(),
            opt_datetime(goal.completed_at),
            opt_datetime(goal.archived_at),
            opt_datetime(goal.task_started_at),
            goal.task_elapsed_seconds,
            goal.task_active,
        ],
    )?;
    Ok(())
}

/// Write back every mutable column of an existing goal.
fn update_goal_row(conn: &Connection, goal: &Goal) -> Result<()> {
    let rows = conn.execute(
        "UPDATE goals SET sprint_id = ?, description = ?, notes = ?, status = ?, priority = ?,
            effort = ?, tags = ?, links = ?, recurrence_rule = ?, rank = ?, completed_at = ?,
            archived_at = ?, task_started_at = ?, task_elapsed_seconds = ?, task_active = ?
         WHERE id = ?",
        rusqlite::params![
            opt_uuid(goal.sprint_id),
            &goal.description,
            &goal.notes,
            goal.status.as_str(),
            goal.priority,
            goal.effort.map(|e| e.as_str()),
            serde_json::to_string(&goal.tags)?,
            serde_json::to_string(&goal.links)?,
            &goal.recurrence_rule,
            goal.rank,
            opt_datetime(goal.completed_at),
            opt_datetime(goal.archived_at),
            opt_datetime(goal.task_started_at),
            goal.task_elapsed_seconds,
            goal.task_active,
            goal.id.to_string(),
        ],
    )?;
    if rows == 0 {
        return Err(StoreError::not_found(EntityKind::Goal, goal.id));
    }
    Ok(())
}

pub(crate) fn fetch_goal(conn: &Connection, id: Uuid) -> Result<Goal> {
    conn.query_row(
        &format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS),
        [id.to_string()],
        goal_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(EntityKind::Goal, id))
}

fn validate_description(description: &str) -> Result<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(StoreError::validation("description", "must not be empty"));
    }
    Ok(description.to_string())
}

/// `None` and blank rules clear the rule. Anything else must parse and is
/// stored in its canonical form.
fn validate_rule(rule: Option<&str>) -> Result<Option<String>> {
    match rule.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => RecurrenceRule::parse(raw)
            .map(|rule| Some(rule.to_string()))
            .ok_or_else(|| StoreError::validation("recurrence_rule", format!("cannot parse {raw:?}"))),
    }
}

/// Trim, drop a leading `#`, lowercase and de-duplicate, keeping first-seen order.
pub(crate) fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Fold a running task timer into the accumulated total and stop it.
fn stop_timer(goal: &mut Goal, now: DateTime<Utc>) {
    if goal.task_active {
        goal.task_elapsed_seconds = goal.task_elapsed_seconds(now);
        goal.task_active = false;
        goal.task_started_at = None;
    }
}

/// Spawn the next instance of a recurring goal into its workspace backlog.
///
/// Returns `None` when the goal has no rule or the rule does not parse.
fn spawn_recurrence(conn: &Connection, completed: &Goal, now: DateTime<Utc>) -> Result<Option<Goal>> {
    let Some(raw) = completed.recurrence_rule.as_deref() else {
        return Ok(None);
    };
    if RecurrenceRule::parse(raw).is_none() {
        tracing::debug!(goal = %completed.id, rule = raw, "Unrecognized recurrence rule, not regenerating");
        return Ok(None);
    }

    let rank = next_backlog_rank(conn, completed.workspace_id).unwrap_or_else(|e| {
        tracing::warn!(goal = %completed.id, "Could not compute backlog rank for recurrence: {}", e);
        0
    });

    let next = Goal {
        id: Uuid::new_v4(),
        parent_id: None,
        workspace_id: completed.workspace_id,
        sprint_id: None,
        description: completed.description.clone(),
        notes: completed.notes.clone(),
        status: GoalStatus::Pending,
        priority: completed.priority,
        effort: completed.effort,
        tags: completed.tags.clone(),
        links: completed.links.clone(),
        recurrence_rule: completed.recurrence_rule.clone(),
        rank,
        created_at: now,
        completed_at: None,
        archived_at: None,
        task_started_at: None,
        task_elapsed_seconds: 0,
        task_active: false,
    };
    insert_goal_row(conn, &next)?;
    tracing::info!(goal = %completed.id, next = %next.id, "Regenerated recurring goal");
    Ok(Some(next))
}

fn build_subtree(
    parent_id: Option<Uuid>,
    children_map: &HashMap<Option<Uuid>, Vec<Goal>>,
    blocked: &HashSet<Uuid>,
) -> Vec<GoalTreeNode> {
    children_map
        .get(&parent_id)
        .map(|goals| {
            goals
                .iter()
                .map(|g| GoalTreeNode {
                    goal: g.clone(),
                    blocked: blocked.contains(&g.id),
                    children: build_subtree(Some(g.id), children_map, blocked),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl Database {
    // ============================================================
    // Goal operations
    // ============================================================

    /// Create a top-level goal at the end of its sprint, or of its workspace
    /// backlog when no sprint is given.
    ///
    /// A goal planned into a sprint takes the sprint's workspace; naming a
    /// different workspace is a validation error.
    pub fn add_goal(&self, input: CreateGoalInput) -> Result<Goal> {
        self.write(Op::new("add_goal", EntityKind::Goal), |tx| {
            let description = validate_description(&input.description)?;
            let recurrence_rule = validate_rule(input.recurrence_rule.as_deref())?;

            let mut workspace_id = input.workspace_id;
            if let Some(sprint_id) = input.sprint_id {
                let sprint = fetch_sprint(tx, sprint_id)?;
                match workspace_id {
                    Some(ws) if ws != sprint.workspace_id => {
                        return Err(StoreError::validation(
                            "sprint_id",
                            "sprint belongs to another workspace",
                        ));
                    }
                    _ => workspace_id = Some(sprint.workspace_id),
                }
            }
            if let Some(ws) = workspace_id {
                ensure_workspace_exists(tx, ws)?;
            }

            let goal = Goal {
                id: Uuid::new_v4(),
                parent_id: None,
                workspace_id,
                sprint_id: input.sprint_id,
                description,
                notes: input.notes,
                status: GoalStatus::Pending,
                priority: input.priority.map(clamp_priority).unwrap_or(DEFAULT_PRIORITY),
                effort: input.effort,
                tags: normalize_tags(input.tags),
                links: input.links,
                recurrence_rule,
                rank: next_top_level_rank(tx, workspace_id, input.sprint_id)?,
                created_at: Utc::now(),
                completed_at: None,
                archived_at: None,
                task_started_at: None,
                task_elapsed_seconds: 0,
                task_active: false,
            };
            insert_goal_row(tx, &goal)?;
            Ok(goal)
        })
    }

    /// Create a subtask under `parent_id`. The subtask always inherits the
    /// parent's workspace and sprint and goes after its last sibling.
    pub fn add_subtask(&self, parent_id: Uuid, input: CreateGoalInput) -> Result<Goal> {
        self.write(Op::new("add_subtask", EntityKind::Goal).id(parent_id), |tx| {
            let parent = fetch_goal(tx, parent_id)?;
            let description = validate_description(&input.description)?;
            let recurrence_rule = validate_rule(input.recurrence_rule.as_deref())?;

            let goal = Goal {
                id: Uuid::new_v4(),
                parent_id: Some(parent.id),
                workspace_id: parent.workspace_id,
                sprint_id: parent.sprint_id,
                description,
                notes: input.notes,
                status: GoalStatus::Pending,
                priority: input.priority.map(clamp_priority).unwrap_or(DEFAULT_PRIORITY),
                effort: input.effort,
                tags: normalize_tags(input.tags),
                links: input.links,
                recurrence_rule,
                rank: next_subtask_rank(tx, parent.id)?,
                created_at: Utc::now(),
                completed_at: None,
                archived_at: None,
                task_started_at: None,
                task_elapsed_seconds: 0,
                task_active: false,
            };
            insert_goal_row(tx, &goal)?;
            Ok(goal)
        })
    }

    pub fn get_goal(&self, id: Uuid) -> Result<Goal> {
        self.read(Op::new("get_goal", EntityKind::Goal).id(id), |conn| {
            fetch_goal(conn, id)
        })
    }

    pub fn edit_goal(&self, id: Uuid, input: UpdateGoalInput) -> Result<Goal> {
        self.write(Op::new("edit_goal", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            if let Some(description) = input.description {
                goal.description = validate_description(&description)?;
            }
            if let Some(notes) = input.notes {
                goal.notes = Some(notes).filter(|n| !n.trim().is_empty());
            }
            if let Some(effort) = input.effort {
                goal.effort = Some(effort);
            }
            if let Some(links) = input.links {
                goal.links = links;
            }
            update_goal_row(tx, &goal)?;
            Ok(goal)
        })
    }

    /// Move a top-level goal into a sprint (`Some`) or back to the backlog
    /// (`None`). Its whole subtree follows and it is ranked last in the
    /// target scope.
    pub fn move_goal(&self, id: Uuid, sprint_id: Option<Uuid>) -> Result<Goal> {
        self.write(Op::new("move_goal", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            if goal.parent_id.is_some() {
                return Err(StoreError::validation(
                    "parent_id",
                    "subtasks move with their parent",
                ));
            }
            if let Some(target) = sprint_id {
                let sprint = fetch_sprint(tx, target)?;
                if goal.workspace_id.is_some_and(|ws| ws != sprint.workspace_id) {
                    return Err(StoreError::validation(
                        "sprint_id",
                        "sprint belongs to another workspace",
                    ));
                }
            }
            if goal.sprint_id == sprint_id {
                return Ok(goal);
            }

            goal.sprint_id = sprint_id;
            goal.rank = next_top_level_rank(tx, goal.workspace_id, sprint_id)?;
            update_goal_row(tx, &goal)?;

            tx.execute(
                "WITH RECURSIVE subtree(id) AS (
                    SELECT id FROM goals WHERE parent_id = ?1
                    UNION ALL
                    SELECT g.id FROM goals g JOIN subtree s ON g.parent_id = s.id
                 )
                 UPDATE goals SET sprint_id = ?2 WHERE id IN (SELECT id FROM subtree)",
                (id.to_string(), opt_uuid(sprint_id)),
            )?;
            Ok(goal)
        })
    }

    /// Delete a goal. Subtasks and dependency edges go with it.
    pub fn delete_goal(&self, id: Uuid) -> Result<()> {
        self.write(Op::new("delete_goal", EntityKind::Goal).id(id), |tx| {
            let rows = tx.execute("DELETE FROM goals WHERE id = ?", [id.to_string()])?;
            if rows == 0 {
                return Err(StoreError::not_found(EntityKind::Goal, id));
            }
            Ok(())
        })
    }

    pub fn archive_goal(&self, id: Uuid) -> Result<Goal> {
        self.set_goal_status(id, GoalStatus::Archived)
    }

    pub fn unarchive_goal(&self, id: Uuid) -> Result<Goal> {
        self.set_goal_status(id, GoalStatus::Pending)
    }

    /// Change a goal's status.
    ///
    /// Completing or archiving stops the task timer first. Only completion
    /// keeps `completed_at`; only archiving keeps `archived_at`. Moving into
    /// `Completed` regenerates a recurring goal in the same transaction, so
    /// a failed regeneration leaves the status untouched.
    pub fn set_goal_status(&self, id: Uuid, status: GoalStatus) -> Result<Goal> {
        self.write(Op::new("set_goal_status", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            let previous = goal.status;
            let now = Utc::now();

            match status {
                GoalStatus::Completed => {
                    stop_timer(&mut goal, now);
                    if previous != GoalStatus::Completed {
                        goal.completed_at = Some(now);
                    }
                    goal.archived_at = None;
                }
                GoalStatus::Archived => {
                    stop_timer(&mut goal, now);
                    goal.completed_at = None;
                    if previous != GoalStatus::Archived {
                        goal.archived_at = Some(now);
                    }
                }
                GoalStatus::Pending => {
                    goal.completed_at = None;
                    goal.archived_at = None;
                }
            }
            goal.status = status;
            update_goal_row(tx, &goal)?;

            if status == GoalStatus::Completed && previous != GoalStatus::Completed {
                spawn_recurrence(tx, &goal, now)?;
            }
            Ok(goal)
        })
    }

    /// Set the priority, clamped into 1..=5.
    pub fn set_goal_priority(&self, id: Uuid, priority: i64) -> Result<Goal> {
        self.write(Op::new("set_goal_priority", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            goal.priority = clamp_priority(priority);
            update_goal_row(tx, &goal)?;
            Ok(goal)
        })
    }

    pub fn set_goal_tags(&self, id: Uuid, tags: Vec<String>) -> Result<Goal> {
        self.write(Op::new("set_goal_tags", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            goal.tags = normalize_tags(tags);
            update_goal_row(tx, &goal)?;
            Ok(goal)
        })
    }

    /// Set or clear (`None` or blank) the recurrence rule.
    pub fn set_goal_recurrence(&self, id: Uuid, rule: Option<&str>) -> Result<Goal> {
        self.write(Op::new("set_goal_recurrence", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            goal.recurrence_rule = validate_rule(rule)?;
            update_goal_row(tx, &goal)?;
            Ok(goal)
        })
    }

    /// Start the goal's task timer. Starting a running timer changes nothing.
    pub fn start_goal_timer(&self, id: Uuid) -> Result<Goal> {
        self.write(Op::new("start_goal_timer", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            if goal.status != GoalStatus::Pending {
                return Err(StoreError::validation(
                    "status",
                    format!("cannot time a {} goal", goal.status.as_str()),
                ));
            }
            if !goal.task_active {
                goal.task_active = true;
                goal.task_started_at = Some(Utc::now());
                update_goal_row(tx, &goal)?;
            }
            Ok(goal)
        })
    }

    pub fn pause_goal_timer(&self, id: Uuid) -> Result<Goal> {
        self.write(Op::new("pause_goal_timer", EntityKind::Goal).id(id), |tx| {
            let mut goal = fetch_goal(tx, id)?;
            if goal.task_active {
                stop_timer(&mut goal, Utc::now());
                update_goal_row(tx, &goal)?;
            }
            Ok(goal)
        })
    }

    // ============================================================
    // Goal listings
    // ============================================================

    /// Run an arbitrary goal query.
    pub fn query_goals(&self, query: &GoalQuery) -> Result<Vec<Goal>> {
        self.read(Op::new("query_goals", EntityKind::Goal), |conn| {
            query.fetch(conn)
        })
    }

    pub fn subtasks(&self, parent_id: Uuid) -> Result<Vec<Goal>> {
        self.read(Op::new("subtasks", EntityKind::Goal).id(parent_id), |conn| {
            GoalQuery::new()
                .filter(GoalPredicate::Parent(parent_id))
                .order_by(GoalOrder::Rank)
                .fetch(conn)
        })
    }

    pub fn backlog(&self, workspace_id: Uuid) -> Result<Vec<Goal>> {
        self.read(Op::new("backlog", EntityKind::Workspace).id(workspace_id), |conn| {
            GoalQuery::backlog(workspace_id).fetch(conn)
        })
    }

    pub fn goals_for_sprint(&self, sprint_id: Uuid) -> Result<Vec<Goal>> {
        self.read(Op::new("goals_for_sprint", EntityKind::Sprint).id(sprint_id), |conn| {
            GoalQuery::for_sprint(sprint_id).fetch(conn)
        })
    }

    /// Goals of the workspace whose completion timestamp falls on `date` (UTC).
    pub fn completed_for_day(&self, workspace_id: Uuid, date: NaiveDate) -> Result<Vec<Goal>> {
        self.read(Op::new("completed_for_day", EntityKind::Workspace).id(workspace_id), |conn| {
            GoalQuery::completed_for_day(workspace_id, date).fetch(conn)
        })
    }

    pub fn archived(&self, workspace_id: Uuid) -> Result<Vec<Goal>> {
        self.read(Op::new("archived", EntityKind::Workspace).id(workspace_id), |conn| {
            GoalQuery::archived(workspace_id).fetch(conn)
        })
    }

    pub fn search(&self, workspace_id: Uuid, query: &SearchQuery) -> Result<Vec<Goal>> {
        self.read(Op::new("search", EntityKind::Workspace).id(workspace_id), |conn| {
            query.to_goal_query(workspace_id).fetch(conn)
        })
    }

    /// The non-archived goals of one sprint (or of the workspace backlog when
    /// `sprint_id` is `None`) as a tree, each node flagged when blocked.
    pub fn goal_tree(&self, workspace_id: Uuid, sprint_id: Option<Uuid>) -> Result<Vec<GoalTreeNode>> {
        self.read(Op::new("goal_tree", EntityKind::Workspace).id(workspace_id), |conn| {
            let scope = match sprint_id {
                Some(sprint_id) => GoalPredicate::Sprint(sprint_id),
                None => GoalPredicate::Backlog,
            };
            let goals = GoalQuery::new()
                .filter(GoalPredicate::Workspace(Some(workspace_id)))
                .filter(scope)
                .filter(GoalPredicate::NotStatus(GoalStatus::Archived))
                .order_by(GoalOrder::Rank)
                .fetch(conn)?;
            let blocked = blocked_ids(conn, Some(workspace_id))?;

            // Group goals by parent_id
            let mut children_map: HashMap<Option<Uuid>, Vec<Goal>> = HashMap::new();
            for goal in goals {
                children_map.entry(goal.parent_id).or_default().push(goal);
            }

            Ok(build_subtree(None, &children_map, &blocked))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " #Work ".to_string(),
            "work".to_string(),
            "".to_string(),
            "deep".to_string(),
        ]);
        assert_eq!(tags, vec!["work", "deep"]);
    }

    #[test]
    fn test_validate_rule_canonicalizes() {
        assert_eq!(validate_rule(None).unwrap(), None);
        assert_eq!(validate_rule(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_rule(Some("Weekly:Friday,Mon")).unwrap().as_deref(),
            Some("weekly:mon,fri")
        );
        assert!(validate_rule(Some("fortnightly")).is_err());
    }
}
