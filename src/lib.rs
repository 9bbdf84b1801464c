//! litebind - typed, resource-safe SQLite client
//!
//! Wraps the embedded SQLite engine in owning handles: a [`Database`]
//! connection, [`Command`]s for statements that return no rows, [`Query`]s
//! with a lazy [`Row`] cursor, and [`Transaction`] scopes that roll back
//! unless committed.
//!
//! ```no_run
//! use litebind::{Command, Database, Query, Transaction};
//!
//! fn demo() -> litebind::Result<()> {
//!     let db = Database::connect(
//!         "contacts.db",
//!         "CREATE TABLE contacts (name TEXT NOT NULL, phone TEXT NOT NULL);",
//!     )?;
//!
//!     let tx = Transaction::begin(&db)?;
//!     let mut insert = Command::new(&db, "INSERT INTO contacts VALUES (:name, :phone)")?;
//!     insert.bind(":name", "name_1")?;
//!     insert.bind(":phone", "555-0100")?;
//!     insert.execute()?;
//!     drop(insert);
//!     tx.commit()?;
//!
//!     let mut select = Query::new(&db, "SELECT name, phone FROM contacts")?;
//!     let mut rows = select.begin()?;
//!     while let Some(mut row) = rows.next_row()? {
//!         let name: &str = row.read()?;
//!         let phone: String = row.read()?;
//!         println!("{name}: {phone}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod db;

pub use db::{
    ClearBindings, ColumnType, Command, ConfigFile, Database, DatabaseConfig, DbError,
    EngineContext, Exec, FromColumn, Lock, Location, Null, OnExit, Placeholder, Query, QueryIter,
    Result, Row, Select, Statement, ToSql, Transaction, Value, ValueRef,
};
