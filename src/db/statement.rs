//! Prepared statements and the row-less [`Command`].
//!
//! A [`Statement`] owns one compiled engine statement and borrows the
//! [`Database`] it was prepared against. The `K` parameter selects the
//! specialization: [`Exec`] for [`Command`], [`Select`] for [`Query`]
//! (whose row-producing half lives in the `query` module).
//!
//! ```text
//! Unprepared --prepare--> Prepared --step--> RowAvailable <--step--> ...
//!                            ^                    |
//!                            |                  step
//!                          reset                  v
//!                            +------------ Done | Error
//! ```

use std::ffi::{CString, c_int};
use std::marker::PhantomData;

use tracing::debug;

use super::engine::{RawStatement, Step};
use super::value::{ToSql, ValueRef};
use super::{Database, DbError, Result, discard_teardown_error};

/// Whether [`Statement::reset`] also clears bound parameter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearBindings {
    /// Keep the current bindings and the streaming bind cursor.
    #[default]
    Keep,
    /// Clear every binding back to NULL and rewind the streaming cursor.
    Clear,
}

/// Statement specialization for commands that produce no rows.
#[derive(Debug)]
pub struct Exec;

/// Statement specialization for row-producing queries.
#[derive(Debug)]
pub struct Select;

/// A statement expected to run to completion without producing rows.
pub type Command<'db> = Statement<'db, Exec>;

/// A statement whose result rows are read through a [`QueryIter`](super::QueryIter).
pub type Query<'db> = Statement<'db, Select>;

/// One compiled statement bound to a borrowed [`Database`].
pub struct Statement<'db, K> {
    db: &'db Database,
    sql: String,
    raw: Option<RawStatement>,
    bind_cursor: c_int,
    _kind: PhantomData<K>,
}

impl<'db, K> Statement<'db, K> {
    /// Create a statement, preparing `sql` unless it is empty.
    pub(crate) fn with_sql(db: &'db Database, sql: &str) -> Result<Self> {
        let mut stmt = Self {
            db,
            sql: String::new(),
            raw: None,
            bind_cursor: 1,
            _kind: PhantomData,
        };
        if !sql.is_empty() {
            stmt.prepare(sql)?;
        }
        Ok(stmt)
    }

    /// Compile `sql`, finalizing any previously compiled statement first.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.finish()?;

        let prepare_error = |message: Option<&str>| DbError::Prepare {
            sql: sql.to_string(),
            context: match message {
                Some(message) => self.db.context_with(message),
                None => self.db.context(),
            },
        };

        let c_sql = CString::new(sql).map_err(|_| prepare_error(Some("SQL text contains a NUL byte")))?;
        let conn = self
            .db
            .raw_connection()
            .ok_or_else(|| prepare_error(Some("database is not open")))?;
        let raw = match RawStatement::prepare(conn, &c_sql) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(prepare_error(Some("SQL text contains no statement"))),
            Err(_) => return Err(prepare_error(None)),
        };

        debug!(sql, "prepared statement");
        self.raw = Some(raw);
        self.sql = sql.to_string();
        self.bind_cursor = 1;
        Ok(())
    }

    /// Finalize the compiled statement, if any. Idempotent.
    ///
    /// The native handle is released even when the engine reports an error
    /// (which it does when the most recent step failed).
    pub fn finish(&mut self) -> Result<()> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        let sql = std::mem::take(&mut self.sql);
        self.bind_cursor = 1;
        if raw.finalize() != libsqlite3_sys::SQLITE_OK {
            return Err(DbError::Finalize {
                sql,
                context: self.db.context(),
            });
        }
        Ok(())
    }

    /// Rewind to the pre-execution state so the statement can run again.
    pub fn reset(&mut self, clear: ClearBindings) -> Result<()> {
        let raw = self.raw("reset")?;
        if raw.reset() != libsqlite3_sys::SQLITE_OK {
            return Err(DbError::Reset {
                sql: self.sql.clone(),
                context: self.db.context(),
            });
        }
        if clear == ClearBindings::Clear {
            if raw.clear_bindings() != libsqlite3_sys::SQLITE_OK {
                return Err(DbError::BindClear {
                    sql: self.sql.clone(),
                    context: self.db.context(),
                });
            }
            self.bind_cursor = 1;
        }
        Ok(())
    }

    /// Bind `value` at a 1-based position or a named placeholder.
    ///
    /// Unsigned values above `i32::MAX` fail with [`DbError::Range`] before
    /// the placeholder is resolved or the engine is called.
    ///
    /// ```no_run
    /// # use litebind::{Command, Database};
    /// # fn demo(db: &Database) -> litebind::Result<()> {
    /// let mut cmd = Command::new(db, "INSERT INTO contacts (name, phone) VALUES (:name, ?2)")?;
    /// cmd.bind(":name", "name_1")?;
    /// cmd.bind(2, "0001")?;
    /// cmd.execute()
    /// # }
    /// ```
    pub fn bind<P: Placeholder, V: ToSql>(&mut self, at: P, value: V) -> Result<()> {
        let value = value.to_sql()?;
        let index = at.resolve(self)?;
        self.bind_value(index, value)
    }

    /// Bind `value` at the streaming cursor and advance it by one.
    ///
    /// The cursor starts at 1 and is rewound by [`prepare`](Self::prepare),
    /// [`finish`](Self::finish) and a clearing [`reset`](Self::reset).
    pub fn bind_next<V: ToSql>(&mut self, value: V) -> Result<&mut Self> {
        self.bind(self.bind_cursor, value)?;
        self.bind_cursor += 1;
        Ok(self)
    }

    fn bind_value(&mut self, index: c_int, value: ValueRef<'_>) -> Result<()> {
        let raw = self.raw("bind")?;
        let rc = match value {
            ValueRef::Null => raw.bind_null(index),
            ValueRef::Int(v) => raw.bind_int(index, v),
            ValueRef::Int64(v) => raw.bind_int64(index, v),
            ValueRef::Real(v) => raw.bind_double(index, v),
            ValueRef::Text(v) => raw.bind_text(index, v),
            ValueRef::Blob(v) => raw.bind_blob(index, v),
        };
        if rc != libsqlite3_sys::SQLITE_OK {
            return Err(DbError::Bind {
                kind: value.kind(),
                index,
                sql: self.sql.clone(),
                context: self.db.context(),
            });
        }
        Ok(())
    }

    /// Advance execution by one unit. Interpreting the result is up to the
    /// specialization.
    pub(crate) fn step(&mut self) -> Result<Step> {
        Ok(self.raw("step")?.step())
    }

    /// SQL text of the prepared statement; empty when unprepared.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_prepared(&self) -> bool {
        self.raw.is_some()
    }

    /// Number of placeholders in the statement; 0 when unprepared.
    pub fn parameter_count(&self) -> i32 {
        self.raw.as_ref().map_or(0, RawStatement::parameter_count)
    }

    pub(crate) fn database(&self) -> &'db Database {
        self.db
    }

    pub(crate) fn raw(&self, operation: &'static str) -> Result<&RawStatement> {
        self.raw.as_ref().ok_or(DbError::NotPrepared { operation })
    }

    pub(crate) fn raw_opt(&self) -> Option<&RawStatement> {
        self.raw.as_ref()
    }
}

impl<K> Drop for Statement<'_, K> {
    fn drop(&mut self) {
        discard_teardown_error("finalize statement", self.finish());
    }
}

impl<'db> Statement<'db, Exec> {
    /// Create a command, preparing `sql` unless it is empty.
    pub fn new(db: &'db Database, sql: &str) -> Result<Self> {
        Self::with_sql(db, sql)
    }

    /// Run the command to completion.
    ///
    /// Exactly one step is taken. Producing a row is a misuse and is
    /// reported as [`DbError::Execution`] like any engine failure.
    pub fn execute(&mut self) -> Result<()> {
        match self.step()? {
            Step::Done => Ok(()),
            Step::Row => Err(DbError::Execution {
                sql: self.sql.clone(),
                context: self.db.context_with("command produced result rows"),
            }),
            Step::Error(_) => Err(DbError::Execution {
                sql: self.sql.clone(),
                context: self.db.context(),
            }),
        }
    }
}

// =============================================================================
// Placeholder resolution
// =============================================================================

/// A parameter slot: a 1-based position or a placeholder name such as
/// `:name`, `@name` or `$name`.
pub trait Placeholder {
    /// Resolve to a 1-based position.
    fn resolve<K>(&self, stmt: &Statement<'_, K>) -> Result<i32>;
}

impl Placeholder for i32 {
    fn resolve<K>(&self, _stmt: &Statement<'_, K>) -> Result<i32> {
        Ok(*self)
    }
}

impl Placeholder for &str {
    fn resolve<K>(&self, stmt: &Statement<'_, K>) -> Result<i32> {
        let raw = stmt.raw("bind")?;
        let unknown = || DbError::UnknownPlaceholder {
            name: self.to_string(),
            sql: stmt.sql.clone(),
        };
        let name = CString::new(*self).map_err(|_| unknown())?;
        match raw.parameter_index(&name) {
            index if index > 0 => Ok(index),
            _ => Err(unknown()),
        }
    }
}

impl Placeholder for String {
    fn resolve<K>(&self, stmt: &Statement<'_, K>) -> Result<i32> {
        self.as_str().resolve(stmt)
    }
}

impl Placeholder for &String {
    fn resolve<K>(&self, stmt: &Statement<'_, K>) -> Result<i32> {
        self.as_str().resolve(stmt)
    }
}
