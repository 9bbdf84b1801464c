//! Database connection management.

use std::ffi::CString;
use std::path::Path;

use tracing::debug;

use super::bootstrap::{create_if_missing, load_extension};
use super::engine::{RawConnection, code_message};
use super::{DbError, EngineContext, Result, discard_teardown_error};

/// Path understood by the engine as a private in-memory store.
pub(crate) const MEMORY_PATH: &str = ":memory:";

/// One connection to the engine.
///
/// The native connection is either absent (closed) or valid and associated
/// with [`path`](Self::path). Statements and transactions borrow the
/// database, so it cannot be closed or reopened while any of them is alive.
///
/// A `Database` may be moved to another thread but not shared between
/// threads; every operation blocks until the engine call returns.
#[derive(Default)]
pub struct Database {
    path: String,
    raw: Option<RawConnection>,
}

impl Database {
    /// A closed handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the store at `path`, creating it with `bootstrap_sql` when it
    /// does not exist yet.
    pub fn connect(path: impl AsRef<Path>, bootstrap_sql: &str) -> Result<Self> {
        let mut db = Self::new();
        db.open(path, bootstrap_sql, None)?;
        Ok(db)
    }

    /// Open a private in-memory store and run `bootstrap_sql` on it.
    pub fn open_in_memory(bootstrap_sql: &str) -> Result<Self> {
        Self::connect(MEMORY_PATH, bootstrap_sql)
    }

    /// (Re)open this handle.
    ///
    /// Any open connection is closed first. A missing store is created by
    /// running `bootstrap_sql`; an existing one is opened as is. When
    /// `extension` is given it is loaded before returning, and a failed load
    /// leaves the handle closed.
    ///
    /// Foreign key enforcement starts off on every new connection; turn it on
    /// with [`enable_foreign_keys`](Self::enable_foreign_keys).
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        bootstrap_sql: &str,
        extension: Option<&Path>,
    ) -> Result<()> {
        self.close()?;

        let path = path.as_ref();
        let shown = path.display().to_string();
        if shown.is_empty() {
            return Err(DbError::Connection {
                operation: "Failed to open Db",
                path: shown,
                code: libsqlite3_sys::SQLITE_CANTOPEN,
                message: "database path is empty".to_string(),
            });
        }
        let c_path = path
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or_else(|| DbError::Connection {
                operation: "Failed to open Db",
                path: shown.clone(),
                code: libsqlite3_sys::SQLITE_CANTOPEN,
                message: "path is not valid UTF-8 or contains a NUL byte".to_string(),
            })?;

        let memory = shown == MEMORY_PATH;
        if !memory {
            create_if_missing(path, &c_path, bootstrap_sql)?;
        }

        let raw = RawConnection::open(&c_path).map_err(|code| DbError::Connection {
            operation: "Failed to open Db",
            path: shown.clone(),
            code,
            message: code_message(code),
        })?;
        self.raw = Some(raw);
        self.path = shown;
        debug!(path = %self.path, "opened database");

        // The bundled engine is built with enforcement on by default.
        let setup = self.enable_foreign_keys(false).and_then(|()| {
            if memory && !bootstrap_sql.is_empty() {
                self.run_memory_bootstrap(bootstrap_sql)
            } else {
                Ok(())
            }
        });
        let setup = setup.and_then(|()| match (extension, self.raw.as_ref()) {
            (Some(extension), Some(raw)) => load_extension(raw, extension),
            _ => Ok(()),
        });
        if let Err(e) = setup {
            discard_teardown_error("close database after failed setup", self.close());
            return Err(e);
        }
        Ok(())
    }

    fn run_memory_bootstrap(&self, bootstrap_sql: &str) -> Result<()> {
        self.execute(bootstrap_sql).map_err(|e| DbError::Bootstrap {
            path: self.path.clone(),
            message: match e {
                DbError::Execution { context, .. } => context.message,
                other => other.to_string(),
            },
        })
    }

    /// Release the native connection. Idempotent.
    ///
    /// A failed close keeps the connection open; it is not retried.
    pub fn close(&mut self) -> Result<()> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        match raw.close() {
            Ok(()) => {
                debug!(path = %self.path, "closed database");
                self.path.clear();
                Ok(())
            }
            Err((raw, code)) => {
                let message = raw.errmsg();
                self.raw = Some(raw);
                Err(DbError::Connection {
                    operation: "Failed to close Db",
                    path: self.path.clone(),
                    code,
                    message,
                })
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.raw.is_some()
    }

    /// Path of the open store; empty when closed.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run SQL text without parameters or result rows to completion.
    ///
    /// The text may hold several `;`-separated statements.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let execution_error = |context| DbError::Execution {
            sql: sql.to_string(),
            context,
        };
        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| execution_error(self.context()))?;
        let c_sql = CString::new(sql)
            .map_err(|_| execution_error(self.context_with("SQL text contains a NUL byte")))?;
        if raw.exec(&c_sql) != libsqlite3_sys::SQLITE_OK {
            return Err(execution_error(self.context()));
        }
        Ok(())
    }

    /// Wait up to `ms` milliseconds for locks held by other connections
    /// before failing with a busy error. Zero or negative disables waiting.
    pub fn set_busy_timeout(&self, ms: i32) -> Result<()> {
        let raw = self.raw.as_ref().ok_or_else(|| self.not_open("Failed to set busy timeout on Db"))?;
        let code = raw.busy_timeout(ms);
        if code != libsqlite3_sys::SQLITE_OK {
            return Err(DbError::Connection {
                operation: "Failed to set busy timeout on Db",
                path: self.path.clone(),
                code,
                message: code_message(code),
            });
        }
        Ok(())
    }

    /// Toggle foreign key enforcement for this connection.
    pub fn enable_foreign_keys(&self, enable: bool) -> Result<()> {
        self.execute(if enable {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = OFF;"
        })
    }

    /// Row id of the most recent successful insert; 0 when closed or when
    /// nothing has been inserted yet.
    pub fn last_insert_rowid(&self) -> i64 {
        self.raw.as_ref().map_or(0, RawConnection::last_insert_rowid)
    }

    /// Rows modified by the most recent insert, update or delete.
    pub fn changes(&self) -> usize {
        self.raw.as_ref().map_or(0, |raw| raw.changes().max(0) as usize)
    }

    pub(crate) fn raw_connection(&self) -> Option<&RawConnection> {
        self.raw.as_ref()
    }

    /// Capture the engine's last error text together with the path.
    pub(crate) fn context(&self) -> EngineContext {
        match &self.raw {
            Some(raw) => self.context_with(raw.errmsg()),
            None => self.context_with("database is not open"),
        }
    }

    pub(crate) fn context_with(&self, message: impl Into<String>) -> EngineContext {
        EngineContext {
            message: message.into(),
            path: self.path.clone(),
        }
    }

    fn not_open(&self, operation: &'static str) -> DbError {
        DbError::Connection {
            operation,
            path: self.path.clone(),
            code: libsqlite3_sys::SQLITE_MISUSE,
            message: "database is not open".to_string(),
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        discard_teardown_error("close database", self.close());
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}
