use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One calendar date. Created at most once per date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Day {
    pub id: Uuid,
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
}
