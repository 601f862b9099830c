//! Composable goal listing.
//!
//! A [`GoalQuery`] is a plain value: a list of AND-ed predicates, an ordering
//! and an optional limit over the fixed goal column set. It is rendered to
//! SQL exactly once, with every user-supplied value bound as a parameter, so
//! new list variants are builder chains rather than new SQL strings.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use uuid::Uuid;

use super::error::Result;
use super::goals::{goal_from_row, GOAL_COLUMNS};
use crate::models::{Goal, GoalStatus};

/// Results returned by a search when no limit is given.
pub const DEFAULT_SEARCH_LIMIT: u32 = 50;

/// A single filter over the `goals` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalPredicate {
    /// `None` matches goals that were never assigned a workspace.
    Workspace(Option<Uuid>),
    Sprint(Uuid),
    Backlog,
    TopLevel,
    Parent(Uuid),
    Status(GoalStatus),
    NotStatus(GoalStatus),
    /// Completion timestamp falls on this (UTC) date.
    CompletedOn(NaiveDate),
    /// Case-insensitive substring of the description or notes.
    Text(String),
    /// Substring of the serialized tag list.
    Tag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalOrder {
    Rank,
    CreatedDesc,
    CompletedDesc,
    ArchivedDesc,
}

impl GoalOrder {
    fn sql(&self) -> &'static str {
        match self {
            Self::Rank => "rank ASC",
            Self::CreatedDesc => "created_at DESC",
            Self::CompletedDesc => "completed_at DESC",
            Self::ArchivedDesc => "archived_at DESC",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalQuery {
    predicates: Vec<GoalPredicate>,
    order: Vec<GoalOrder>,
    limit: Option<u32>,
}

impl GoalQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: GoalPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, order: GoalOrder) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Top-level backlog goals of a workspace that are not archived.
    pub fn backlog(workspace_id: Uuid) -> Self {
        Self::new()
            .filter(GoalPredicate::Workspace(Some(workspace_id)))
            .filter(GoalPredicate::Backlog)
            .filter(GoalPredicate::TopLevel)
            .filter(GoalPredicate::NotStatus(GoalStatus::Archived))
            .order_by(GoalOrder::Rank)
    }

    /// Top-level goals planned into a sprint, archived ones excluded.
    pub fn for_sprint(sprint_id: Uuid) -> Self {
        Self::new()
            .filter(GoalPredicate::Sprint(sprint_id))
            .filter(GoalPredicate::TopLevel)
            .filter(GoalPredicate::NotStatus(GoalStatus::Archived))
            .order_by(GoalOrder::Rank)
    }

    pub fn completed_for_day(workspace_id: Uuid, date: NaiveDate) -> Self {
        Self::new()
            .filter(GoalPredicate::Workspace(Some(workspace_id)))
            .filter(GoalPredicate::Status(GoalStatus::Completed))
            .filter(GoalPredicate::CompletedOn(date))
            .order_by(GoalOrder::CompletedDesc)
    }

    pub fn archived(workspace_id: Uuid) -> Self {
        Self::new()
            .filter(GoalPredicate::Workspace(Some(workspace_id)))
            .filter(GoalPredicate::Status(GoalStatus::Archived))
            .order_by(GoalOrder::ArchivedDesc)
    }

    /// Render to SQL and the parameters to bind, in order.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM goals", GOAL_COLUMNS);
        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(self.predicates.len());

        for predicate in &self.predicates {
            let clause = match predicate {
                GoalPredicate::Workspace(Some(id)) => {
                    params.push(Value::Text(id.to_string()));
                    "workspace_id = ?"
                }
                GoalPredicate::Workspace(None) => "workspace_id IS NULL",
                GoalPredicate::Sprint(id) => {
                    params.push(Value::Text(id.to_string()));
                    "sprint_id = ?"
                }
                GoalPredicate::Backlog => "sprint_id IS NULL",
                GoalPredicate::TopLevel => "parent_id IS NULL",
                GoalPredicate::Parent(id) => {
                    params.push(Value::Text(id.to_string()));
                    "parent_id = ?"
                }
                GoalPredicate::Status(status) => {
                    params.push(Value::Text(status.as_str().to_string()));
                    "status = ?"
                }
                GoalPredicate::NotStatus(status) => {
                    params.push(Value::Text(status.as_str().to_string()));
                    "status != ?"
                }
                GoalPredicate::CompletedOn(date) => {
                    params.push(Value::Text(date.format("%Y-%m-%d").to_string()));
                    "substr(completed_at, 1, 10) = ?"
                }
                GoalPredicate::Text(term) => {
                    let pattern = like_pattern(term);
                    params.push(Value::Text(pattern.clone()));
                    params.push(Value::Text(pattern));
                    "(description LIKE ? ESCAPE '\\' OR IFNULL(notes, '') LIKE ? ESCAPE '\\')"
                }
                GoalPredicate::Tag(tag) => {
                    params.push(Value::Text(like_pattern(tag)));
                    "tags LIKE ? ESCAPE '\\'"
                }
            };
            clauses.push(clause);
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order.is_empty() {
            let order: Vec<&str> = self.order.iter().map(GoalOrder::sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }

        (sql, params)
    }

    pub(crate) fn fetch(&self, conn: &Connection) -> Result<Vec<Goal>> {
        let (sql, params) = self.to_sql();
        let mut stmt = conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params_from_iter(params.iter()), goal_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(goals)
    }
}

/// Structured search input. Every field narrows the result (AND).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub status: Option<GoalStatus>,
    pub tags: Vec<String>,
    pub limit: Option<u32>,
}

impl SearchQuery {
    /// Parse free text such as `ship docs status:completed #work`.
    ///
    /// `status:<s>` sets the status filter, `#tag` and `tag:<t>` add tag
    /// filters and everything else is a search term.
    pub fn parse(input: &str) -> Self {
        let mut query = Self::default();
        for token in input.split_whitespace() {
            if let Some(status) = token
                .strip_prefix("status:")
                .and_then(GoalStatus::from_str)
            {
                query.status = Some(status);
            } else if let Some(tag) = token
                .strip_prefix('#')
                .or_else(|| token.strip_prefix("tag:"))
                .filter(|t| !t.is_empty())
            {
                query.tags.push(tag.to_string());
            } else {
                query.terms.push(token.to_string());
            }
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.status.is_none() && self.tags.is_empty()
    }

    /// The goal query for this search inside one workspace, newest first.
    pub fn to_goal_query(&self, workspace_id: Uuid) -> GoalQuery {
        let mut query = GoalQuery::new().filter(GoalPredicate::Workspace(Some(workspace_id)));
        for term in &self.terms {
            query = query.filter(GoalPredicate::Text(term.clone()));
        }
        if let Some(status) = self.status {
            query = query.filter(GoalPredicate::Status(status));
        }
        for tag in &self.tags {
            query = query.filter(GoalPredicate::Tag(tag.clone()));
        }
        query
            .order_by(GoalOrder::CreatedDesc)
            .limit(self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
    }
}

fn like_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_renders_scoped_predicates() {
        let ws = Uuid::new_v4();
        let (sql, params) = GoalQuery::backlog(ws).to_sql();

        assert!(sql.ends_with(
            "FROM goals WHERE workspace_id = ? AND sprint_id IS NULL AND parent_id IS NULL AND status != ? ORDER BY rank ASC"
        ));
        assert_eq!(
            params,
            vec![
                Value::Text(ws.to_string()),
                Value::Text("archived".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_query_has_no_where_clause() {
        let (sql, params) = GoalQuery::new().to_sql();
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_search_binds_terms_and_limit() {
        let ws = Uuid::new_v4();
        let query = SearchQuery::parse("50% done status:completed #deep-work");
        let (sql, params) = query.to_goal_query(ws).to_sql();

        assert!(sql.contains("description LIKE ? ESCAPE"));
        assert!(sql.contains("tags LIKE ?"));
        assert!(sql.ends_with("ORDER BY created_at DESC LIMIT ?"));
        assert!(!sql.contains("50"));
        assert_eq!(params[1], Value::Text("%50\\%%".to_string()));
        assert_eq!(params.last(), Some(&Value::Integer(DEFAULT_SEARCH_LIMIT as i64)));
    }

    #[test]
    fn test_parse_search_query() {
        let query = SearchQuery::parse("write docs status:completed #work tag:deep status:bogus");
        assert_eq!(query.terms, vec!["write", "docs", "status:bogus"]);
        assert_eq!(query.status, Some(GoalStatus::Completed));
        assert_eq!(query.tags, vec!["work", "deep"]);
        assert!(!query.is_empty());
        assert!(SearchQuery::parse("  ").is_empty());
        assert!(!SearchQuery::parse("#home").is_empty());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\tmp"), "%c:\\\\tmp%");
    }
}
