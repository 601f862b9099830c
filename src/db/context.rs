//! Operation contexts: deadlines, error wrapping and scoped transactions.
//!
//! Every public repository method runs through [`Database::read`] or
//! [`Database::write`]. Both give the closure a bounded time budget that
//! starts before the handle is acquired, so waiting behind another clone
//! counts against it; `write` additionally opens an IMMEDIATE transaction
//! that is rolled back on every exit path unless the closure returns `Ok`.

use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::error::{EntityKind, Result, StoreError};
use super::{Database, Handle};

/// Describes the operation being performed, for diagnostics.
#[derive(Debug, Clone)]
pub(crate) struct Op {
    pub name: &'static str,
    pub entity: EntityKind,
    pub id: Option<String>,
}

impl Op {
    pub fn new(name: &'static str, entity: EntityKind) -> Self {
        Self {
            name,
            entity,
            id: None,
        }
    }

    pub fn id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    fn wrap(&self, err: StoreError) -> StoreError {
        StoreError::Op {
            op: self.name,
            entity: self.entity,
            id: self.id.clone().unwrap_or_default(),
            source: Box::new(err),
        }
    }
}

/// Interrupts any statement still running once the deadline has passed.
/// Disarms itself on drop, so a rollback issued after it is never cut short.
struct Interrupter<'c> {
    conn: &'c Connection,
}

impl<'c> Interrupter<'c> {
    fn arm(conn: &'c Connection, deadline: Instant) -> Self {
        conn.progress_handler(1_000, Some(move || Instant::now() >= deadline));
        Self { conn }
    }
}

impl Drop for Interrupter<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

impl Database {
    /// Run a read-only operation under the configured deadline.
    pub(crate) fn read<T>(&self, op: Op, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = (|| {
            let handle = self.acquire(&op, started)?;
            let deadline = self.remaining_budget(&op, started)?;
            handle.conn.busy_timeout(deadline.1)?;
            let interrupter = Interrupter::arm(&handle.conn, deadline.0);
            let out = f(&handle.conn);
            drop(interrupter);
            out
        })();
        result.map_err(|e| self.finish_error(&op, e))
    }

    /// Run a mutating operation inside a scoped IMMEDIATE transaction.
    ///
    /// The transaction commits only if `f` returns `Ok`. Early returns and
    /// panics drop it, which rolls it back.
    pub(crate) fn write<T>(
        &self,
        op: Op,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = (|| {
            let handle = self.acquire(&op, started)?;
            let (deadline, remaining) = self.remaining_budget(&op, started)?;
            handle.conn.busy_timeout(remaining)?;
            let tx = Transaction::new_unchecked(&handle.conn, TransactionBehavior::Immediate)?;
            let interrupter = Interrupter::arm(&tx, deadline);
            let out = f(&tx);
            drop(interrupter);
            let value = out?;
            tx.commit()?;
            Ok(value)
        })();
        result.map_err(|e| self.finish_error(&op, e))
    }

    /// Run an operation that needs the handle itself, such as swapping the
    /// underlying file. Acquiring the handle is bounded by the budget; the
    /// work is not, since whole-file rewrites take as long as the file is large.
    pub(crate) fn with_handle<T>(
        &self,
        op: Op,
        f: impl FnOnce(&mut Handle) -> Result<T>,
    ) -> Result<T> {
        let mut handle = self
            .acquire(&op, Instant::now())
            .map_err(|e| op.wrap(e))?;
        f(&mut handle).map_err(|e| op.wrap(e))
    }

    /// Wait for the shared handle until the operation's deadline.
    fn acquire(&self, op: &Op, started: Instant) -> Result<MutexGuard<'_, Handle>> {
        let (_, remaining) = self.remaining_budget(op, started)?;
        self.try_lock_for(remaining).ok_or(StoreError::Timeout {
            op: op.name,
            after: self.op_timeout,
        })
    }

    fn remaining_budget(&self, op: &Op, started: Instant) -> Result<(Instant, Duration)> {
        let deadline = started + self.op_timeout;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StoreError::Timeout {
                op: op.name,
                after: self.op_timeout,
            });
        }
        Ok((deadline, remaining))
    }

    fn finish_error(&self, op: &Op, err: StoreError) -> StoreError {
        let err = if err.is_interrupt() || is_busy(&err) {
            StoreError::Timeout {
                op: op.name,
                after: self.op_timeout,
            }
        } else {
            err
        };
        op.wrap(err)
    }
}

fn is_busy(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateGoalInput;

    #[test]
    fn test_waiting_for_a_held_handle_times_out() {
        let db = Database::open_memory().unwrap();
        let ws = db.ensure_default_workspace().unwrap();
        let goal = db
            .add_goal(CreateGoalInput::new("Held").in_workspace(ws.id))
            .unwrap();
        let impatient = db.with_op_timeout(Duration::from_millis(50));

        let held = db.lock();
        let (read, write, swap) = std::thread::scope(|s| {
            s.spawn(|| {
                let started = Instant::now();
                let read = impatient.get_goal(goal.id);
                let write = impatient.set_goal_priority(goal.id, 1);
                let swap = impatient.with_handle(Op::new("swap", EntityKind::Store), |_| Ok(()));
                assert!(started.elapsed() < Duration::from_secs(2));
                (read, write, swap)
            })
            .join()
            .unwrap()
        });
        drop(held);

        assert!(read.unwrap_err().is_timeout());
        assert!(write.unwrap_err().is_timeout());
        assert!(swap.unwrap_err().is_timeout());
        assert_eq!(impatient.get_goal(goal.id).unwrap().priority, goal.priority);
    }
}
