use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_WORKSPACE_SLUG: &str = "default";
pub const DEFAULT_WORKSPACE_NAME: &str = "Default";

/// An isolated project namespace.
///
/// Everything a user sees at once lives in a single workspace. Workspaces are
/// never hard-deleted in normal flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    /// Unique, URL-safe handle.
    pub slug: String,
    #[serde(flatten)]
    pub preferences: WorkspacePreferences,
    pub created_at: DateTime<Utc>,
}

/// Per-workspace display preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspacePreferences {
    pub view_mode: String,
    pub theme: String,
    pub show_backlog: bool,
    pub show_journal: bool,
}

impl Default for WorkspacePreferences {
    fn default() -> Self {
        Self {
            view_mode: "sprints".to_string(),
            theme: "default".to_string(),
            show_backlog: true,
            show_journal: true,
        }
    }
}

/// Input for creating a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspaceInput {
    pub name: String,
    /// Derived from `name` when not given.
    pub slug: Option<String>,
}

/// Input for updating display preferences. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePreferencesInput {
    pub view_mode: Option<String>,
    pub theme: Option<String>,
    pub show_backlog: Option<bool>,
    pub show_journal: Option<bool>,
}

/// Lowercase a name into a slug: ASCII alphanumerics kept, runs of anything
/// else collapsed to a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("workspace");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Side Projects"), "side-projects");
        assert_eq!(slugify("  Work // 2025 "), "work-2025");
        assert_eq!(slugify("???"), "workspace");
    }
}
