use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::error::{EntityKind, Result, StoreError};
use super::{parse_datetime, parse_uuid, Database, Op};
use crate::models::*;

pub(crate) const WORKSPACE_COLUMNS: &str =
    "id, name, slug, view_mode, theme, show_backlog, show_journal, created_at";

pub(crate) fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        slug: row.get(2)?,
        preferences: WorkspacePreferences {
            view_mode: row.get(3)?,
            theme: row.get(4)?,
            show_backlog: row.get(5)?,
            show_journal: row.get(6)?,
        },
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

pub(crate) fn insert_workspace_row(conn: &Connection, workspace: &Workspace) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO workspaces ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            WORKSPACE_COLUMNS
        ),
        (
            workspace.id.to_string(),
            &workspace.name,
            &workspace.slug,
            &workspace.preferences.view_mode,
            &workspace.preferences.theme,
            workspace.preferences.show_backlog,
            workspace.preferences.show_journal,
            workspace.created_at.to_rfc3339(),
        ),
    )?;
    Ok(())
}

fn fetch_workspace(conn: &Connection, id: Uuid) -> Result<Workspace> {
    conn.query_row(
        &format!("SELECT {} FROM workspaces WHERE id = ?", WORKSPACE_COLUMNS),
        [id.to_string()],
        workspace_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(EntityKind::Workspace, id))
}

pub(crate) fn find_workspace_by_slug(conn: &Connection, slug: &str) -> Result<Option<Workspace>> {
    let workspace = conn
        .query_row(
            &format!("SELECT {} FROM workspaces WHERE slug = ?", WORKSPACE_COLUMNS),
            [slug],
            workspace_from_row,
        )
        .optional()?;
    Ok(workspace)
}

pub(crate) fn ensure_workspace_exists(conn: &Connection, id: Uuid) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM workspaces WHERE id = ?)",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::not_found(EntityKind::Workspace, id));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::validation("name", "must not be empty"));
    }
    Ok(name.to_string())
}

impl Database {
    // ============================================================
    // Workspace operations
    // ============================================================

    pub fn create_workspace(&self, input: CreateWorkspaceInput) -> Result<Workspace> {
        self.write(Op::new("create_workspace", EntityKind::Workspace), |tx| {
            let name = validate_name(&input.name)?;
            let slug = slugify(input.slug.as_deref().unwrap_or(&name));
            if find_workspace_by_slug(tx, &slug)?.is_some() {
                return Err(StoreError::validation(
                    "slug",
                    format!("{slug:?} is already in use"),
                ));
            }

            let workspace = Workspace {
                id: Uuid::new_v4(),
                name,
                slug,
                preferences: WorkspacePreferences::default(),
                created_at: Utc::now(),
            };
            insert_workspace_row(tx, &workspace)?;
            tracing::info!(slug = %workspace.slug, "Created workspace");
            Ok(workspace)
        })
    }

    /// The workspace with slug `default`, created on first use.
    pub fn ensure_default_workspace(&self) -> Result<Workspace> {
        self.write(Op::new("ensure_default_workspace", EntityKind::Workspace), |tx| {
            if let Some(existing) = find_workspace_by_slug(tx, DEFAULT_WORKSPACE_SLUG)? {
                return Ok(existing);
            }
            let workspace = Workspace {
                id: Uuid::new_v4(),
                name: DEFAULT_WORKSPACE_NAME.to_string(),
                slug: DEFAULT_WORKSPACE_SLUG.to_string(),
                preferences: WorkspacePreferences::default(),
                created_at: Utc::now(),
            };
            insert_workspace_row(tx, &workspace)?;
            Ok(workspace)
        })
    }

    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.read(Op::new("list_workspaces", EntityKind::Workspace), |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM workspaces ORDER BY created_at, name",
                WORKSPACE_COLUMNS
            ))?;
            let workspaces = stmt
                .query_map([], workspace_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(workspaces)
        })
    }

    pub fn get_workspace(&self, id: Uuid) -> Result<Workspace> {
        self.read(Op::new("get_workspace", EntityKind::Workspace).id(id), |conn| {
            fetch_workspace(conn, id)
        })
    }

    pub fn workspace_by_slug(&self, slug: &str) -> Result<Option<Workspace>> {
        self.read(Op::new("workspace_by_slug", EntityKind::Workspace).id(slug), |conn| {
            find_workspace_by_slug(conn, slug)
        })
    }

    /// Change the display name. The slug is stable and does not follow.
    pub fn rename_workspace(&self, id: Uuid, name: &str) -> Result<Workspace> {
        self.write(Op::new("rename_workspace", EntityKind::Workspace).id(id), |tx| {
            let mut workspace = fetch_workspace(tx, id)?;
            workspace.name = validate_name(name)?;
            tx.execute(
                "UPDATE workspaces SET name = ? WHERE id = ?",
                (&workspace.name, id.to_string()),
            )?;
            Ok(workspace)
        })
    }

    pub fn update_workspace_preferences(
        &self,
        id: Uuid,
        input: UpdatePreferencesInput,
    ) -> Result<Workspace> {
        self.write(Op::new("update_workspace_preferences", EntityKind::Workspace).id(id), |tx| {
            let mut workspace = fetch_workspace(tx, id)?;
            let prefs = &mut workspace.preferences;
            if let Some(view_mode) = input.view_mode.filter(|v| !v.trim().is_empty()) {
                prefs.view_mode = view_mode.trim().to_string();
            }
            if let Some(theme) = input.theme.filter(|t| !t.trim().is_empty()) {
                prefs.theme = theme.trim().to_string();
            }
            if let Some(show_backlog) = input.show_backlog {
                prefs.show_backlog = show_backlog;
            }
            if let Some(show_journal) = input.show_journal {
                prefs.show_journal = show_journal;
            }

            tx.execute(
                "UPDATE workspaces SET view_mode = ?, theme = ?, show_backlog = ?, show_journal = ?
                 WHERE id = ?",
                (
                    &prefs.view_mode,
                    &prefs.theme,
                    prefs.show_backlog,
                    prefs.show_journal,
                    id.to_string(),
                ),
            )?;
            Ok(workspace)
        })
    }
}
