use rusqlite::Connection;

use super::error::{Result, StoreError};

/// One additive schema change. Each is a single statement so its outcome can
/// be judged on its own.
struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const BASE_SCHEMA: &str = include_str!("migrations/001_initial.sql");

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "002",
        name: "goal_effort",
        sql: "ALTER TABLE goals ADD COLUMN effort TEXT",
    },
    Migration {
        version: "003",
        name: "goal_tags",
        sql: "ALTER TABLE goals ADD COLUMN tags TEXT NOT NULL DEFAULT '[]'",
    },
    Migration {
        version: "004",
        name: "goal_links",
        sql: "ALTER TABLE goals ADD COLUMN links TEXT NOT NULL DEFAULT '[]'",
    },
    Migration {
        version: "005",
        name: "goal_recurrence_rule",
        sql: "ALTER TABLE goals ADD COLUMN recurrence_rule TEXT",
    },
    Migration {
        version: "006",
        name: "goal_archived_at",
        sql: "ALTER TABLE goals ADD COLUMN archived_at TEXT",
    },
    Migration {
        version: "007",
        name: "goal_task_started_at",
        sql: "ALTER TABLE goals ADD COLUMN task_started_at TEXT",
    },
    Migration {
        version: "008",
        name: "goal_task_elapsed_seconds",
        sql: "ALTER TABLE goals ADD COLUMN task_elapsed_seconds INTEGER NOT NULL DEFAULT 0",
    },
    Migration {
        version: "009",
        name: "goal_task_active",
        sql: "ALTER TABLE goals ADD COLUMN task_active INTEGER NOT NULL DEFAULT 0",
    },
    Migration {
        version: "010",
        name: "journal_goal",
        sql: "ALTER TABLE journal_entries ADD COLUMN goal_id TEXT REFERENCES goals(id) ON DELETE SET NULL",
    },
    Migration {
        version: "011",
        name: "journal_tags",
        sql: "ALTER TABLE journal_entries ADD COLUMN tags TEXT NOT NULL DEFAULT '[]'",
    },
    Migration {
        version: "012",
        name: "task_deps",
        sql: "CREATE TABLE task_deps (
            goal_id TEXT NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
            depends_on_id TEXT NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
            PRIMARY KEY (goal_id, depends_on_id)
        )",
    },
    Migration {
        version: "013",
        name: "workspace_view_mode",
        sql: "ALTER TABLE workspaces ADD COLUMN view_mode TEXT NOT NULL DEFAULT 'sprints'",
    },
    Migration {
        version: "014",
        name: "workspace_theme",
        sql: "ALTER TABLE workspaces ADD COLUMN theme TEXT NOT NULL DEFAULT 'default'",
    },
    Migration {
        version: "015",
        name: "workspace_show_backlog",
        sql: "ALTER TABLE workspaces ADD COLUMN show_backlog INTEGER NOT NULL DEFAULT 1",
    },
    Migration {
        version: "016",
        name: "workspace_show_journal",
        sql: "ALTER TABLE workspaces ADD COLUMN show_journal INTEGER NOT NULL DEFAULT 1",
    },
    Migration {
        version: "017",
        name: "sprint_slot_index",
        sql: "CREATE UNIQUE INDEX idx_sprints_slot ON sprints(workspace_id, day_id, sprint_number)",
    },
    Migration {
        version: "018",
        name: "goal_sprint_index",
        sql: "CREATE INDEX idx_goals_sprint ON goals(sprint_id, rank)",
    },
    Migration {
        version: "019",
        name: "goal_parent_index",
        sql: "CREATE INDEX idx_goals_parent ON goals(parent_id, rank)",
    },
    Migration {
        version: "020",
        name: "goal_workspace_index",
        sql: "CREATE INDEX idx_goals_workspace ON goals(workspace_id, status)",
    },
    Migration {
        version: "021",
        name: "deps_reverse_index",
        sql: "CREATE INDEX idx_task_deps_depends_on ON task_deps(depends_on_id)",
    },
    Migration {
        version: "022",
        name: "journal_day_index",
        sql: "CREATE INDEX idx_journal_day ON journal_entries(workspace_id, day_id)",
    },
];

/// Create any missing tables, then run every migration.
///
/// Migrations are not tracked; each statement runs on every open. A failure
/// saying the column, table or index already exists means the change is in
/// place and is ignored. Anything else aborts.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(BASE_SCHEMA).map_err(|source| StoreError::Migration {
        version: "001",
        name: "initial",
        source,
    })?;

    let mut applied = 0;
    for migration in MIGRATIONS {
        match conn.execute_batch(migration.sql) {
            Ok(()) => {
                applied += 1;
                tracing::info!(
                    "Applied migration {}: {}",
                    migration.version,
                    migration.name
                );
            }
            Err(e) if is_already_applied(&e.to_string()) => {
                tracing::debug!(
                    "Migration {} already applied: {}",
                    migration.version,
                    e
                );
            }
            Err(source) => {
                return Err(StoreError::Migration {
                    version: migration.version,
                    name: migration.name,
                    source,
                });
            }
        }
    }

    if applied > 0 {
        tracing::info!("Schema upgraded ({} migrations applied)", applied);
    }
    Ok(())
}

fn is_already_applied(message: &str) -> bool {
    message.contains("duplicate column name") || message.contains("already exists")
}
