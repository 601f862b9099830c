//! Plain-text output helpers for the `goalstack` binary.

pub mod tree_render;

use chrono::Utc;

use crate::models::{Goal, JournalEntry, Sprint, Workspace};

pub use tree_render::render_tree;

/// `h:mm:ss` for a number of seconds.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub fn goal_line(goal: &Goal) -> String {
    let mut line = format!(
        "{}  [{}] p{} {}",
        goal.id,
        goal.status.as_str(),
        goal.priority,
        goal.description
    );
    if !goal.tags.is_empty() {
        let tags: Vec<String> = goal.tags.iter().map(|t| format!("#{}", t)).collect();
        line.push_str(&format!(" {}", tags.join(" ")));
    }
    if let Some(rule) = &goal.recurrence_rule {
        line.push_str(&format!(" ({})", rule));
    }
    let elapsed = goal.task_elapsed_seconds(Utc::now());
    if elapsed > 0 || goal.task_active {
        line.push_str(&format!(" {}", format_duration(elapsed)));
        if goal.task_active {
            line.push_str(" ▶");
        }
    }
    line
}

pub fn sprint_line(sprint: &Sprint) -> String {
    format!(
        "{}  #{} {} {}",
        sprint.id,
        sprint.sprint_number,
        sprint.status.as_str(),
        format_duration(sprint.elapsed(Utc::now()))
    )
}

pub fn workspace_line(workspace: &Workspace) -> String {
    format!("{}  {} ({})", workspace.id, workspace.name, workspace.slug)
}

pub fn journal_line(entry: &JournalEntry) -> String {
    format!(
        "{}  {} {}",
        entry.id,
        entry.created_at.format("%H:%M"),
        entry.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_duration(-5), "0:00:00");
    }
}
