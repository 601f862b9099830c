//! Domain models for goalstack.
//!
//! # Core Concepts
//!
//! - [`Workspace`]: Isolated project namespace. Goals, sprints and journal
//!   entries always belong to one workspace and never leak across.
//! - [`Day`]: A calendar date. Sprints and journal entries hang off a day.
//! - [`Sprint`]: A time-boxed block of work within a day (numbered 1..=8).
//! - [`Goal`]: The central entity. Goals form a tree via `parent_id`, live in a
//!   sprint or in the backlog, and may depend on other goals via [`TaskDep`].
//! - [`JournalEntry`]: A timestamped note for a day, optionally tied to a
//!   sprint or goal.
//!
//! ## Derived projections
//!
//! [`GoalTreeNode`] is computed from repository reads and is never written
//! back. Mutations always go through [`crate::db::Database`].

mod day;
mod dependency;
mod goal;
mod journal;
mod sprint;
mod workspace;

pub use day::*;
pub use dependency::*;
pub use goal::*;
pub use journal::*;
pub use sprint::*;
pub use workspace::*;
