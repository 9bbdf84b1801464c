//! Row-producing queries: the single-pass [`QueryIter`] cursor and the
//! [`Row`] view over the current result row.
//!
//! ```no_run
//! # use litebind::{Database, Query};
//! # fn demo(db: &Database) -> litebind::Result<()> {
//! let mut query = Query::new(db, "SELECT name, phone FROM contacts")?;
//! let mut rows = query.begin()?;
//! while let Some(mut row) = rows.next_row()? {
//!     let name: String = row.read()?;
//!     let phone: Option<String> = row.read()?;
//!     println!("{name}: {phone:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::ffi::c_int;

use super::engine::{RawStatement, Step};
use super::statement::{ClearBindings, Select, Statement};
use super::value::FromColumn;
use super::{ColumnType, Database, DbError, Result};

impl<'db> Statement<'db, Select> {
    /// Create a query, preparing `sql` unless it is empty.
    pub fn new(db: &'db Database, sql: &str) -> Result<Self> {
        Self::with_sql(db, sql)
    }

    /// Number of columns in the result shape; 0 when unprepared.
    pub fn column_count(&self) -> i32 {
        self.raw_opt().map_or(0, RawStatement::column_count)
    }

    /// Result column names, in order.
    pub fn column_names(&self) -> Vec<String> {
        let Some(raw) = self.raw_opt() else {
            return Vec::new();
        };
        (0..raw.column_count()).map(|col| raw.column_name(col)).collect()
    }

    /// Rewind the query (keeping its bindings) and position a cursor on the
    /// first row.
    ///
    /// The cursor mutably borrows the query, so only one iteration can be in
    /// flight; calling `begin` again once it is dropped re-executes from the
    /// first row.
    pub fn begin(&mut self) -> Result<QueryIter<'_, 'db>> {
        self.reset(ClearBindings::Keep)?;
        QueryIter::start(self)
    }

    /// Run the query from the first row and collect `f` over every row.
    pub fn map_rows<T, F>(&mut self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Row<'_>) -> Result<T>,
    {
        let mut rows = self.begin()?;
        let mut out = Vec::new();
        while let Some(mut row) = rows.next_row()? {
            out.push(f(&mut row)?);
        }
        Ok(out)
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Single-pass cursor over the rows of a [`Query`](super::Query).
///
/// Two cursors compare equal only when both are exhausted, which makes
/// `it != QueryIter::end()` a valid loop condition. Two live cursors never
/// compare equal.
pub struct QueryIter<'q, 'db> {
    query: Option<&'q mut Statement<'db, Select>>,
    state: Step,
    yielded: bool,
}

impl<'q, 'db> QueryIter<'q, 'db> {
    fn start(query: &'q mut Statement<'db, Select>) -> Result<Self> {
        let mut iter = Self {
            query: Some(query),
            state: Step::Done,
            yielded: false,
        };
        iter.step()?;
        Ok(iter)
    }

    /// The canonical exhausted cursor.
    pub fn end() -> Self {
        Self {
            query: None,
            state: Step::Done,
            yielded: true,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == Step::Done
    }

    /// Move to the next row. Advancing an exhausted cursor is a no-op.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_done() {
            return Ok(());
        }
        self.step()
    }

    /// View of the current row, `None` once exhausted.
    ///
    /// The view borrows the cursor and therefore cannot outlive the next
    /// [`advance`](Self::advance).
    pub fn row(&self) -> Option<Row<'_>> {
        if self.state != Step::Row {
            return None;
        }
        let query = self.query.as_deref()?;
        let raw = query.raw_opt()?;
        Some(Row::new(raw, query.sql()))
    }

    /// Lending iteration: yields the current row on the first call after
    /// `begin` or `advance`, and advances before yielding otherwise.
    pub fn next_row(&mut self) -> Result<Option<Row<'_>>> {
        if self.yielded {
            self.advance()?;
        }
        self.yielded = true;
        Ok(self.row())
    }

    fn step(&mut self) -> Result<()> {
        let Some(query) = self.query.as_deref_mut() else {
            self.state = Step::Done;
            return Ok(());
        };
        self.state = query.step()?;
        self.yielded = false;
        match self.state {
            Step::Row | Step::Done => Ok(()),
            Step::Error(_) => Err(DbError::Step {
                sql: query.sql().to_string(),
                context: query.database().context(),
            }),
        }
    }
}

impl PartialEq for QueryIter<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.is_done() && other.is_done()
    }
}

impl std::fmt::Debug for QueryIter<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryIter")
            .field("sql", &self.query.as_ref().map(|q| q.sql()))
            .field("state", &self.state)
            .finish()
    }
}

// =============================================================================
// Row
// =============================================================================

/// View of the current result row.
///
/// Columns are 1-based. Every typed read except [`Null`](super::Null) is
/// checked against the engine's column count for the row.
pub struct Row<'r> {
    raw: &'r RawStatement,
    sql: &'r str,
    cursor: c_int,
}

impl<'r> Row<'r> {
    fn new(raw: &'r RawStatement, sql: &'r str) -> Self {
        Self { raw, sql, cursor: 1 }
    }

    /// Read column `index` (1-based) as `T`.
    pub fn get<T: FromColumn<'r>>(&self, index: i32) -> Result<T> {
        T::from_column(self, index)
    }

    /// Read the column at the streaming cursor and advance it by one.
    pub fn read<T: FromColumn<'r>>(&mut self) -> Result<T> {
        let value = self.get(self.cursor)?;
        self.cursor += 1;
        Ok(value)
    }

    /// Chained form of [`read`](Self::read) writing into `out`.
    pub fn read_into<T: FromColumn<'r>>(&mut self, out: &mut T) -> Result<&mut Self> {
        *out = self.read()?;
        Ok(self)
    }

    /// Number of columns in this row.
    pub fn column_count(&self) -> i32 {
        self.raw.data_count()
    }

    /// Storage class of column `index` (1-based).
    pub fn column_type(&self, index: i32) -> Result<ColumnType> {
        let col = self.checked_column(index)?;
        Ok(self.raw.column_type(col))
    }

    /// Validate a 1-based index and convert it to the engine's 0-based one.
    pub(crate) fn checked_column(&self, index: i32) -> Result<c_int> {
        if index < 1 || index > self.raw.data_count() {
            return Err(DbError::ColumnOutOfBounds {
                index,
                sql: self.sql.to_string(),
            });
        }
        Ok(index - 1)
    }

    pub(crate) fn raw(&self) -> &'r RawStatement {
        self.raw
    }

    pub(crate) fn sql(&self) -> &'r str {
        self.sql
    }
}
