use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::days::{ensure_day_row, find_day};
use super::error::{EntityKind, Result, StoreError};
use super::goals::{fetch_goal, normalize_tags};
use super::sprints::fetch_sprint;
use super::workspaces::ensure_workspace_exists;
use super::{opt_uuid, parse_datetime, parse_string_list, parse_uuid, Database, Op};
use crate::models::*;

pub(crate) const JOURNAL_COLUMNS: &str =
    "id, day_id, workspace_id, sprint_id, goal_id, content, tags, created_at";

pub(crate) fn journal_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        id: parse_uuid(row.get::<_, String>(0)?),
        day_id: parse_uuid(row.get::<_, String>(1)?),
        workspace_id: parse_uuid(row.get::<_, String>(2)?),
        sprint_id: row.get::<_, Option<String>>(3)?.map(parse_uuid),
        goal_id: row.get::<_, Option<String>>(4)?.map(parse_uuid),
        content: row.get(5)?,
        tags: parse_string_list(row.get(6)?),
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

pub(crate) fn insert_journal_row(conn: &Connection, entry: &JournalEntry) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO journal_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            JOURNAL_COLUMNS
        ),
        (
            entry.id.to_string(),
            entry.day_id.to_string(),
            entry.workspace_id.to_string(),
            opt_uuid(entry.sprint_id),
            opt_uuid(entry.goal_id),
            &entry.content,
            serde_json::to_string(&entry.tags)?,
            entry.created_at.to_rfc3339(),
        ),
    )?;
    Ok(())
}

impl Database {
    // ============================================================
    // Journal operations
    // ============================================================

    /// Write a journal entry for a day, creating the day if needed.
    ///
    /// A linked sprint or goal must belong to the same workspace.
    pub fn add_journal_entry(&self, input: CreateJournalEntryInput) -> Result<JournalEntry> {
        self.write(Op::new("add_journal_entry", EntityKind::JournalEntry), |tx| {
            let content = input.content.trim();
            if content.is_empty() {
                return Err(StoreError::validation("content", "must not be empty"));
            }
            ensure_workspace_exists(tx, input.workspace_id)?;

            if let Some(sprint_id) = input.sprint_id {
                if fetch_sprint(tx, sprint_id)?.workspace_id != input.workspace_id {
                    return Err(StoreError::validation(
                        "sprint_id",
                        "sprint belongs to another workspace",
                    ));
                }
            }
            if let Some(goal_id) = input.goal_id {
                if fetch_goal(tx, goal_id)?.workspace_id != Some(input.workspace_id) {
                    return Err(StoreError::validation(
                        "goal_id",
                        "goal belongs to another workspace",
                    ));
                }
            }

            let day = ensure_day_row(tx, input.date)?;
            let entry = JournalEntry {
                id: Uuid::new_v4(),
                day_id: day.id,
                workspace_id: input.workspace_id,
                sprint_id: input.sprint_id,
                goal_id: input.goal_id,
                content: content.to_string(),
                tags: normalize_tags(input.tags),
                created_at: Utc::now(),
            };
            insert_journal_row(tx, &entry)?;
            Ok(entry)
        })
    }

    /// Entries of one workspace for `date`, oldest first.
    pub fn journal_for_day(&self, workspace_id: Uuid, date: NaiveDate) -> Result<Vec<JournalEntry>> {
        self.read(Op::new("journal_for_day", EntityKind::JournalEntry).id(date), |conn| {
            let Some(day) = find_day(conn, date)? else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM journal_entries WHERE workspace_id = ? AND day_id = ?
                 ORDER BY created_at",
                JOURNAL_COLUMNS
            ))?;
            let entries = stmt
                .query_map((workspace_id.to_string(), day.id.to_string()), journal_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    pub fn delete_journal_entry(&self, id: Uuid) -> Result<()> {
        self.write(Op::new("delete_journal_entry", EntityKind::JournalEntry).id(id), |tx| {
            let rows = tx.execute("DELETE FROM journal_entries WHERE id = ?", [id.to_string()])?;
            if rows == 0 {
                return Err(StoreError::not_found(EntityKind::JournalEntry, id));
            }
            Ok(())
        })
    }
}
