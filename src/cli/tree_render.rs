//! ASCII tree rendering for goal hierarchies.

use crate::models::{GoalStatus, GoalTreeNode};

const PENDING: char = '○';
const COMPLETED: char = '●';
const ARCHIVED: char = '✗';

fn status_symbol(status: GoalStatus) -> char {
    match status {
        GoalStatus::Pending => PENDING,
        GoalStatus::Completed => COMPLETED,
        GoalStatus::Archived => ARCHIVED,
    }
}

/// Render goal trees as ASCII art with status symbols.
///
/// Example output:
/// ```text
/// ○ Ship release
/// ├── ● Write changelog
/// ├── ○ Tag build [blocked]
/// │   └── ○ Bump version
/// └── ○ Announce
/// ```
pub fn render_tree(nodes: &[GoalTreeNode]) -> String {
    let mut output = String::new();
    for node in nodes {
        push_line(&mut output, node);
        render_children(&mut output, &node.children, "");
    }
    output
}

fn push_line(output: &mut String, node: &GoalTreeNode) {
    output.push(status_symbol(node.goal.status));
    output.push(' ');
    output.push_str(&node.goal.description);
    if node.blocked {
        output.push_str(" [blocked]");
    }
    output.push('\n');
}

fn render_children(output: &mut String, children: &[GoalTreeNode], prefix: &str) {
    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        push_line(output, child);

        let continuation = if is_last { "    " } else { "│   " };
        render_children(output, &child.children, &format!("{}{}", prefix, continuation));
    }
}
