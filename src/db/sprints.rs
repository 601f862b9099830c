use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::days::{ensure_day_row, find_day};
use super::error::{EntityKind, Result, StoreError};
use super::workspaces::ensure_workspace_exists;
use super::{opt_datetime, parse_datetime, parse_uuid, Database, Op};
use crate::models::*;

pub(crate) const SPRINT_COLUMNS: &str = "id, day_id, workspace_id, sprint_number, status, \
     start_time, end_time, last_paused_at, elapsed_seconds";

pub(crate) fn sprint_from_row(row: &Row<'_>) -> rusqlite::Result<Sprint> {
    Ok(Sprint {
        id: parse_uuid(row.get::<_, String>(0)?),
        day_id: parse_uuid(row.get::<_, String>(1)?),
        workspace_id: parse_uuid(row.get::<_, String>(2)?),
        sprint_number: row.get(3)?,
        status: SprintStatus::from_str(&row.get::<_, String>(4)?).unwrap_or(SprintStatus::Pending),
        start_time: row.get::<_, Option<String>>(5)?.map(parse_datetime),
        end_time: row.get::<_, Option<String>>(6)?.map(parse_datetime),
        last_paused_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
        elapsed_seconds: row.get(8)?,
    })
}

pub(crate) fn insert_sprint_row(conn: &Connection, sprint: &Sprint) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO sprints ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SPRINT_COLUMNS
        ),
        (
            sprint.id.to_string(),
            sprint.day_id.to_string(),
            sprint.workspace_id.to_string(),
            sprint.sprint_number,
            sprint.status.as_str(),
            opt_datetime(sprint.start_time),
            opt_datetime(sprint.end_time),
            opt_datetime(sprint.last_paused_at),
            sprint.elapsed_seconds,
        ),
    )?;
    Ok(())
}

fn update_sprint_row(conn: &Connection, sprint: &Sprint) -> Result<()> {
    conn.execute(
        "UPDATE sprints SET status = ?, start_time = ?, end_time = ?, last_paused_at = ?,
            elapsed_seconds = ?
         WHERE id = ?",
        (
            sprint.status.as_str(),
            opt_datetime(sprint.start_time),
            opt_datetime(sprint.end_time),
            opt_datetime(sprint.last_paused_at),
            sprint.elapsed_seconds,
            sprint.id.to_string(),
        ),
    )?;
    Ok(())
}

pub(crate) fn fetch_sprint(conn: &Connection, id: Uuid) -> Result<Sprint> {
    conn.query_row(
        &format!("SELECT {} FROM sprints WHERE id = ?", SPRINT_COLUMNS),
        [id.to_string()],
        sprint_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(EntityKind::Sprint, id))
}

pub(crate) fn find_sprint_in_slot(
    conn: &Connection,
    workspace_id: Uuid,
    day_id: Uuid,
    sprint_number: u8,
) -> Result<Option<Sprint>> {
    let sprint = conn
        .query_row(
            &format!(
                "SELECT {} FROM sprints WHERE workspace_id = ? AND day_id = ? AND sprint_number = ?",
                SPRINT_COLUMNS
            ),
            (workspace_id.to_string(), day_id.to_string(), sprint_number),
            sprint_from_row,
        )
        .optional()?;
    Ok(sprint)
}

fn find_active_sprint(conn: &Connection, workspace_id: Uuid) -> Result<Option<Sprint>> {
    let sprint = conn
        .query_row(
            &format!(
                "SELECT {} FROM sprints WHERE workspace_id = ? AND status = 'active' LIMIT 1",
                SPRINT_COLUMNS
            ),
            [workspace_id.to_string()],
            sprint_from_row,
        )
        .optional()?;
    Ok(sprint)
}

/// Refuse to activate `sprint` while another sprint of its workspace runs.
fn ensure_no_other_active(conn: &Connection, sprint: &Sprint) -> Result<()> {
    match find_active_sprint(conn, sprint.workspace_id)? {
        Some(active) if active.id != sprint.id => {
            Err(StoreError::SprintAlreadyActive { active: active.id })
        }
        _ => Ok(()),
    }
}

fn invalid_transition(sprint: &Sprint, action: &str) -> StoreError {
    StoreError::validation(
        "status",
        format!("cannot {} a {} sprint", action, sprint.status.as_str()),
    )
}

impl Database {
    // ============================================================
    // Sprint operations
    // ============================================================

    /// Make sure sprints `1..=count` exist for the workspace on `date`.
    ///
    /// Existing sprints are left alone, so calling this again is harmless.
    /// Returns every sprint of that day in number order.
    pub fn bootstrap_sprints(
        &self,
        workspace_id: Uuid,
        date: NaiveDate,
        count: u8,
    ) -> Result<Vec<Sprint>> {
        self.write(Op::new("bootstrap_sprints", EntityKind::Sprint).id(date), |tx| {
            if count == 0 || count > MAX_SPRINTS_PER_DAY {
                return Err(StoreError::validation(
                    "count",
                    format!("must be between 1 and {}", MAX_SPRINTS_PER_DAY),
                ));
            }
            ensure_workspace_exists(tx, workspace_id)?;
            let day = ensure_day_row(tx, date)?;

            for number in 1..=count {
                tx.execute(
                    "INSERT OR IGNORE INTO sprints (id, day_id, workspace_id, sprint_number, status)
                     VALUES (?, ?, ?, ?, 'pending')",
                    (
                        Uuid::new_v4().to_string(),
                        day.id.to_string(),
                        workspace_id.to_string(),
                        number,
                    ),
                )?;
            }

            sprints_on_day(tx, workspace_id, day.id)
        })
    }

    pub fn sprints_for_day(&self, workspace_id: Uuid, date: NaiveDate) -> Result<Vec<Sprint>> {
        self.read(Op::new("sprints_for_day", EntityKind::Sprint).id(date), |conn| {
            match find_day(conn, date)? {
                Some(day) => sprints_on_day(conn, workspace_id, day.id),
                None => Ok(Vec::new()),
            }
        })
    }

    pub fn get_sprint(&self, id: Uuid) -> Result<Sprint> {
        self.read(Op::new("get_sprint", EntityKind::Sprint).id(id), |conn| {
            fetch_sprint(conn, id)
        })
    }

    pub fn active_sprint(&self, workspace_id: Uuid) -> Result<Option<Sprint>> {
        self.read(Op::new("active_sprint", EntityKind::Workspace).id(workspace_id), |conn| {
            find_active_sprint(conn, workspace_id)
        })
    }

    /// Start a pending sprint.
    pub fn start_sprint(&self, id: Uuid) -> Result<Sprint> {
        self.write(Op::new("start_sprint", EntityKind::Sprint).id(id), |tx| {
            let mut sprint = fetch_sprint(tx, id)?;
            if sprint.status != SprintStatus::Pending {
                return Err(invalid_transition(&sprint, "start"));
            }
            ensure_no_other_active(tx, &sprint)?;

            sprint.status = SprintStatus::Active;
            sprint.start_time = Some(Utc::now());
            update_sprint_row(tx, &sprint)?;
            Ok(sprint)
        })
    }

    /// Stop the clock, folding the running stretch into `elapsed_seconds`.
    pub fn pause_sprint(&self, id: Uuid) -> Result<Sprint> {
        self.write(Op::new("pause_sprint", EntityKind::Sprint).id(id), |tx| {
            let mut sprint = fetch_sprint(tx, id)?;
            if sprint.status != SprintStatus::Active {
                return Err(invalid_transition(&sprint, "pause"));
            }
            let now = Utc::now();
            sprint.elapsed_seconds = sprint.elapsed(now);
            sprint.status = SprintStatus::Paused;
            sprint.last_paused_at = Some(now);
            update_sprint_row(tx, &sprint)?;
            Ok(sprint)
        })
    }

    /// Restart a paused sprint. `start_time` marks the start of the new stretch.
    pub fn resume_sprint(&self, id: Uuid) -> Result<Sprint> {
        self.write(Op::new("resume_sprint", EntityKind::Sprint).id(id), |tx| {
            let mut sprint = fetch_sprint(tx, id)?;
            if sprint.status != SprintStatus::Paused {
                return Err(invalid_transition(&sprint, "resume"));
            }
            ensure_no_other_active(tx, &sprint)?;

            sprint.status = SprintStatus::Active;
            sprint.start_time = Some(Utc::now());
            update_sprint_row(tx, &sprint)?;
            Ok(sprint)
        })
    }

    pub fn complete_sprint(&self, id: Uuid) -> Result<Sprint> {
        self.write(Op::new("complete_sprint", EntityKind::Sprint).id(id), |tx| {
            let mut sprint = fetch_sprint(tx, id)?;
            if sprint.status == SprintStatus::Completed {
                return Err(invalid_transition(&sprint, "complete"));
            }
            let now = Utc::now();
            sprint.elapsed_seconds = sprint.elapsed(now);
            sprint.status = SprintStatus::Completed;
            sprint.end_time = Some(now);
            update_sprint_row(tx, &sprint)?;
            Ok(sprint)
        })
    }
}

fn sprints_on_day(conn: &Connection, workspace_id: Uuid, day_id: Uuid) -> Result<Vec<Sprint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sprints WHERE workspace_id = ? AND day_id = ? ORDER BY sprint_number",
        SPRINT_COLUMNS
    ))?;
    let sprints = stmt
        .query_map((workspace_id.to_string(), day_id.to_string()), sprint_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sprints)
}
