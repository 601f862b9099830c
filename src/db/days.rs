use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::error::{EntityKind, Result};
use super::{parse_date, parse_datetime, parse_uuid, Database, Op};
use crate::models::Day;

pub(crate) fn day_from_row(row: &Row<'_>) -> rusqlite::Result<Day> {
    Ok(Day {
        id: parse_uuid(row.get::<_, String>(0)?),
        date: parse_date(row.get::<_, String>(1)?),
        started_at: parse_datetime(row.get::<_, String>(2)?),
    })
}

pub(crate) fn find_day(conn: &Connection, date: NaiveDate) -> Result<Option<Day>> {
    let day = conn
        .query_row(
            "SELECT id, date, started_at FROM days WHERE date = ?",
            [date.format("%Y-%m-%d").to_string()],
            day_from_row,
        )
        .optional()?;
    Ok(day)
}

/// The row for `date`, inserted on first use.
pub(crate) fn ensure_day_row(conn: &Connection, date: NaiveDate) -> Result<Day> {
    conn.execute(
        "INSERT OR IGNORE INTO days (id, date, started_at) VALUES (?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            date.format("%Y-%m-%d").to_string(),
            Utc::now().to_rfc3339(),
        ),
    )?;
    // Just inserted or already there
    let day = conn.query_row(
        "SELECT id, date, started_at FROM days WHERE date = ?",
        [date.format("%Y-%m-%d").to_string()],
        day_from_row,
    )?;
    Ok(day)
}

impl Database {
    /// Get or create the day for `date`. Calling it again returns the same row.
    pub fn ensure_day(&self, date: NaiveDate) -> Result<Day> {
        self.write(Op::new("ensure_day", EntityKind::Day).id(date), |tx| {
            ensure_day_row(tx, date)
        })
    }

    pub fn get_day_by_date(&self, date: NaiveDate) -> Result<Option<Day>> {
        self.read(Op::new("get_day_by_date", EntityKind::Day).id(date), |conn| {
            find_day(conn, date)
        })
    }
}
