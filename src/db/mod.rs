//! Typed, resource-safe access to an embedded SQLite engine.
//!
//! This module provides the client layer on top of the raw engine:
//! - Connection management ([`Database`]), including store bootstrap
//! - Prepared statements with positional, named and streaming binds
//! - [`Command`] for row-less statements, [`Query`] for lazy row iteration
//! - Typed column extraction from the current [`Row`]
//! - Transaction scoping with rollback-by-default ([`Transaction`])
//!
//! # Ownership
//!
//! A [`Database`] owns its native connection. Statements borrow the
//! database, cursors borrow the statement and rows borrow the cursor, so the
//! borrow checker enforces the teardown order: a connection cannot be closed
//! or reopened while a statement exists, and a row cannot be held across the
//! next step of its cursor.
//!
//! # Teardown
//!
//! Explicit `close`, `finish`, `commit` and `rollback` calls report failures.
//! The `Drop` paths run the same operations but only log failures through
//! `tracing` and carry on.

mod bootstrap;
mod config;
mod connection;
mod engine;
mod query;
mod statement;
mod transaction;
mod value;

use std::fmt;

use thiserror::Error;

pub use config::{ConfigFile, DatabaseConfig, Location};
pub use connection::Database;
pub use engine::ColumnType;
pub use query::{QueryIter, Row};
pub use statement::{ClearBindings, Command, Exec, Placeholder, Query, Select, Statement};
pub use transaction::{Lock, OnExit, Transaction};
pub use value::{FromColumn, Null, ToSql, Value, ValueRef};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DbError>;

/// Engine diagnostics captured at the moment a handle-bound error is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContext {
    /// The engine's last error text for the connection.
    pub message: String,
    /// Path of the connection the error was raised on.
    pub path: String,
}

impl fmt::Display for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. Db at {}", self.message, self.path)
    }
}

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("{operation} '{path}'. Sqlite3 error code: {code} ({message})")]
    Connection {
        operation: &'static str,
        path: String,
        code: i32,
        message: String,
    },

    #[error("Failed to create Db at {path}. {message}")]
    Bootstrap { path: String, message: String },

    #[error("Failed to load Db extension from {extension}. {message}")]
    Extension { extension: String, message: String },

    #[error("Failed to execute '{sql}'. {context}")]
    Execution { sql: String, context: EngineContext },

    #[error("Failed to prepare query '{sql}'. {context}")]
    Prepare { sql: String, context: EngineContext },

    #[error("Failed to bind {kind} value at position {index} for query '{sql}'. {context}")]
    Bind {
        kind: &'static str,
        index: i32,
        sql: String,
        context: EngineContext,
    },

    #[error("Invalid bind placeholder {name} for query '{sql}'")]
    UnknownPlaceholder { name: String, sql: String },

    #[error("Failed to bind unsigned integer value {value} because it cannot be promoted to an integer")]
    Range { value: u64 },

    #[error("Failed to reset query '{sql}'. {context}")]
    Reset { sql: String, context: EngineContext },

    #[error("Failed to clear bindings for query '{sql}'. {context}")]
    BindClear { sql: String, context: EngineContext },

    #[error("Failed to step through the query '{sql}'. {context}")]
    Step { sql: String, context: EngineContext },

    #[error("Column {index} is out-of-bounds for query '{sql}'")]
    ColumnOutOfBounds { index: i32, sql: String },

    #[error("Column {index} of query '{sql}' does not hold valid UTF-8 text")]
    InvalidUtf8 { index: i32, sql: String },

    #[error("Failed to finalise query '{sql}'. {context}")]
    Finalize { sql: String, context: EngineContext },

    #[error("Cannot {operation}: statement is not prepared")]
    NotPrepared { operation: &'static str },
}

/// Log and discard a failure from a scope-exit path.
///
/// Used by `Drop` implementations and by cleanup after an already failed
/// operation. Explicit operations always return their own errors.
pub(crate) fn discard_teardown_error(what: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "{what} failed during teardown; error discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_engine_context_display() {
        let context = EngineContext {
            message: "no such table: missing".to_string(),
            path: "/tmp/test.db".to_string(),
        };
        let err = DbError::Prepare {
            sql: "SELECT * FROM missing".to_string(),
            context,
        };
        assert_eq!(
            err.to_string(),
            "Failed to prepare query 'SELECT * FROM missing'. no such table: missing. Db at /tmp/test.db"
        );
    }

    #[rstest]
    fn test_range_error_message_names_value() {
        let err = DbError::Range { value: 4_294_967_295 };
        assert!(err.to_string().contains("4294967295"));
    }

    #[rstest]
    fn test_discard_teardown_error_swallows() {
        discard_teardown_error(
            "finalize",
            Err(DbError::NotPrepared { operation: "finalize" }),
        );
        discard_teardown_error("finalize", Ok(()));
    }
}
