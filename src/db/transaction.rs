//! Transaction scoping.
//!
//! A [`Transaction`] issues `BEGIN` when created and exactly one `COMMIT` or
//! `ROLLBACK` over its lifetime: explicitly through [`Transaction::commit`]
//! or [`Transaction::rollback`], or implicitly when it goes out of scope.
//!
//! The engine's `BEGIN` is not reentrant. Opening a second transaction on a
//! database that already has one in flight fails with the engine's error.

use tracing::debug;

use super::{Database, Result, discard_teardown_error};

/// What an unfinished transaction does when it goes out of scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnExit {
    #[default]
    Rollback,
    Commit,
}

/// Locking behaviour of `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lock {
    /// Plain `BEGIN`; locks are taken on first access.
    #[default]
    Deferred,
    /// `BEGIN IMMEDIATE`; the write lock is reserved up front.
    Immediate,
}

impl Lock {
    fn begin_sql(self) -> &'static str {
        match self {
            Lock::Deferred => "BEGIN",
            Lock::Immediate => "BEGIN IMMEDIATE",
        }
    }
}

/// A bracketed region of work on one [`Database`].
///
/// ```no_run
/// # use litebind::{Command, Database, Transaction};
/// # fn demo(db: &Database) -> litebind::Result<()> {
/// let tx = Transaction::begin(db)?;
/// let mut cmd = Command::new(db, "INSERT INTO contacts (name) VALUES (?)")?;
/// cmd.bind(1, "name_2")?;
/// cmd.execute()?;
/// drop(cmd);
/// tx.commit()
/// # }
/// ```
#[must_use = "a transaction rolls back when dropped unless committed"]
#[derive(Debug)]
pub struct Transaction<'db> {
    db: Option<&'db Database>,
    on_exit: OnExit,
}

impl<'db> Transaction<'db> {
    /// `BEGIN` a deferred transaction that rolls back unless committed.
    pub fn begin(db: &'db Database) -> Result<Self> {
        Self::new(db, OnExit::Rollback, Lock::Deferred)
    }

    pub fn new(db: &'db Database, on_exit: OnExit, lock: Lock) -> Result<Self> {
        db.execute(lock.begin_sql())?;
        debug!(path = db.path(), ?lock, ?on_exit, "began transaction");
        Ok(Self {
            db: Some(db),
            on_exit,
        })
    }

    /// Issue `COMMIT`. The scope is detached even when the commit fails, so
    /// nothing further is issued on drop.
    pub fn commit(mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    /// Issue `ROLLBACK`. Detaches like [`commit`](Self::commit).
    pub fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn finish(&mut self, sql: &'static str) -> Result<()> {
        let Some(db) = self.db.take() else {
            return Ok(());
        };
        debug!(path = db.path(), sql, "ending transaction");
        db.execute(sql)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let sql = match self.on_exit {
            OnExit::Commit => "COMMIT",
            OnExit::Rollback => "ROLLBACK",
        };
        if self.db.is_some() {
            discard_teardown_error("implicit transaction end", self.finish(sql));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Command, DbError, Query};
    use rstest::{fixture, rstest};

    #[fixture]
    fn db() -> Database {
        Database::open_in_memory("CREATE TABLE t (x INTEGER NOT NULL);")
            .expect("Failed to open in-memory database")
    }

    fn values(db: &Database) -> Vec<i64> {
        let mut q = Query::new(db, "SELECT x FROM t ORDER BY x").unwrap();
        q.map_rows(|row| row.read()).unwrap()
    }

    fn insert(db: &Database, x: i64) {
        let mut cmd = Command::new(db, "INSERT INTO t (x) VALUES (?)").unwrap();
        cmd.bind(1, x).unwrap();
        cmd.execute().unwrap();
    }

    #[rstest]
    fn test_drop_rolls_back_by_default(db: Database) {
        insert(&db, 1);
        {
            let _tx = Transaction::begin(&db).unwrap();
            insert(&db, 2);
        }
        assert_eq!(values(&db), vec![1]);
    }

    #[rstest]
    fn test_explicit_commit_persists(db: Database) {
        let tx = Transaction::begin(&db).unwrap();
        insert(&db, 3);
        tx.commit().unwrap();
        assert_eq!(values(&db), vec![3]);
    }

    #[rstest]
    fn test_explicit_rollback_discards(db: Database) {
        let tx = Transaction::new(&db, OnExit::Commit, Lock::Deferred).unwrap();
        insert(&db, 4);
        tx.rollback().unwrap();
        assert!(values(&db).is_empty());
    }

    #[rstest]
    fn test_commit_on_exit(db: Database) {
        {
            let _tx = Transaction::new(&db, OnExit::Commit, Lock::Immediate).unwrap();
            insert(&db, 5);
        }
        assert_eq!(values(&db), vec![5]);
    }

    #[rstest]
    fn test_nested_begin_is_engine_error(db: Database) {
        let _outer = Transaction::begin(&db).unwrap();
        match Transaction::begin(&db) {
            Err(DbError::Execution { sql, context }) => {
                assert_eq!(sql, "BEGIN");
                assert!(context.message.contains("within a transaction"));
            }
            other => panic!("Expected Execution error, got {other:?}"),
        }
    }

    #[rstest]
    fn test_failed_commit_detaches() {
        let db = Database::open_in_memory(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);\
             CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));",
        )
        .unwrap();
        db.enable_foreign_keys(true).unwrap();

        let tx = Transaction::begin(&db).unwrap();
        db.execute("PRAGMA defer_foreign_keys = ON").unwrap();
        db.execute("INSERT INTO child (parent_id) VALUES (42)").unwrap();
        // The deferred violation makes COMMIT fail and leaves the engine
        // transaction open.
        match tx.commit() {
            Err(DbError::Execution { sql, context }) => {
                assert_eq!(sql, "COMMIT");
                assert!(context.message.contains("FOREIGN KEY"));
            }
            other => panic!("Expected Execution error, got {other:?}"),
        }
        // Still open, so nothing was issued when the scope went away.
        db.execute("ROLLBACK").unwrap();
        let mut q = Query::new(&db, "SELECT COUNT(*) FROM child").unwrap();
        assert_eq!(q.map_rows(|row| row.read::<i64>()).unwrap(), vec![0]);
    }

    #[rstest]
    fn test_implicit_failure_is_swallowed(db: Database) {
        {
            let _tx = Transaction::begin(&db).unwrap();
            db.execute("COMMIT").unwrap();
        }
        assert!(values(&db).is_empty());
    }

    #[rstest]
    fn test_begin_on_closed_database_fails() {
        let db = Database::new();
        assert!(matches!(Transaction::begin(&db), Err(DbError::Execution { .. })));
    }
}
