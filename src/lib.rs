//! goalstack: goals, sprints and journal persistence.
//!
//! Everything goes through a [`db::Database`] handle. Open one with
//! [`db::Database::open`] (file) or [`db::Database::open_memory`] (tests), then
//! call repository methods on it from as many threads as needed.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod models;
pub mod recurrence;
pub mod vault;
