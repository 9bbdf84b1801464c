//! Store creation and extension loading performed while opening a
//! [`Database`](super::Database).

use std::ffi::{CStr, CString};
use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::{debug, warn};

use super::engine::{RawConnection, code_message};
use super::{DbError, Result};

const FOREIGN_KEYS_OFF: &CStr = c"PRAGMA foreign_keys = OFF;";

/// Make sure a readable and writable store exists at `path`.
///
/// A missing store is created by running `bootstrap_sql` on a short-lived
/// connection. When that fails the partially created file is removed. An
/// existing path that is not a readable and writable regular file is
/// reported instead of being overwritten.
pub(crate) fn create_if_missing(path: &Path, c_path: &CStr, bootstrap_sql: &str) -> Result<()> {
    let shown = path.display().to_string();
    if let Ok(metadata) = fs::metadata(path) {
        let usable = metadata.is_file()
            && OpenOptions::new().read(true).write(true).open(path).is_ok();
        if usable {
            return Ok(());
        }
        return Err(DbError::Bootstrap {
            path: shown,
            message: "path exists but is not a readable and writable regular file".to_string(),
        });
    }

    debug!(path = %shown, "creating database");
    let conn = RawConnection::open(c_path).map_err(|code| DbError::Connection {
        operation: "Failed to create Db",
        path: shown.clone(),
        code,
        message: code_message(code),
    })?;

    let failure = match CString::new(bootstrap_sql) {
        Err(_) => Some("bootstrap SQL contains a NUL byte".to_string()),
        Ok(_) if conn.exec(FOREIGN_KEYS_OFF) != libsqlite3_sys::SQLITE_OK => Some(conn.errmsg()),
        Ok(sql) if conn.exec(&sql) != libsqlite3_sys::SQLITE_OK => Some(conn.errmsg()),
        Ok(_) => None,
    };

    // No statement was ever prepared on this connection, so a failed close
    // is reported but cannot be recovered from.
    let closed = conn.close().map_err(|(conn, code)| (code, conn.errmsg()));

    if let Some(message) = failure {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %shown, error = %e, "failed to remove partially created database");
        }
        return Err(DbError::Bootstrap {
            path: shown,
            message,
        });
    }

    closed.map_err(|(code, message)| DbError::Connection {
        operation: "Failed to close newly created Db",
        path: shown,
        code,
        message,
    })
}

/// Enable extension loading on `conn` and load the extension at `extension`.
pub(crate) fn load_extension(conn: &RawConnection, extension: &Path) -> Result<()> {
    let shown = extension.display().to_string();
    let extension_error = |message: String| DbError::Extension {
        extension: shown.clone(),
        message,
    };

    let c_extension = extension
        .to_str()
        .and_then(|p| CString::new(p).ok())
        .ok_or_else(|| extension_error("path is not valid UTF-8 or contains a NUL byte".to_string()))?;

    let rc = conn.enable_load_extension(true);
    if rc != libsqlite3_sys::SQLITE_OK {
        return Err(extension_error(format!(
            "Failed to enable extensions. Error code: {rc}"
        )));
    }

    let loaded = conn.load_extension(&c_extension);
    if conn.enable_load_extension(false) != libsqlite3_sys::SQLITE_OK {
        warn!(extension = %shown, "failed to disable extension loading");
    }

    match loaded {
        Ok(()) => {
            debug!(extension = %shown, "loaded extension");
            Ok(())
        }
        Err((_, Some(message))) => Err(extension_error(message)),
        Err((rc, None)) => Err(extension_error(format!("Error code: {rc}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    fn c_path(path: &Path) -> CString {
        CString::new(path.to_str().unwrap()).unwrap()
    }

    #[rstest]
    fn test_creates_missing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.db");
        create_if_missing(&path, &c_path(&path), "CREATE TABLE t (x);").unwrap();
        assert!(path.is_file());
    }

    #[rstest]
    fn test_empty_bootstrap_creates_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.db");
        create_if_missing(&path, &c_path(&path), "").unwrap();
        assert!(path.is_file());
    }

    #[rstest]
    fn test_existing_store_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existing.db");
        fs::write(&path, b"").unwrap();
        // Would fail if executed.
        create_if_missing(&path, &c_path(&path), "NOT SQL").unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }

    #[rstest]
    fn test_bootstrap_runs_without_foreign_key_enforcement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seeded.db");
        let sql = "CREATE TABLE parent (id INTEGER PRIMARY KEY);\
                   CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));\
                   INSERT INTO child (parent_id) VALUES (7);";
        create_if_missing(&path, &c_path(&path), sql).unwrap();
        assert!(path.is_file());
    }

    #[rstest]
    fn test_directory_path_is_rejected() {
        let dir = tempdir().unwrap();
        let result = create_if_missing(dir.path(), &c_path(dir.path()), "");
        assert!(matches!(result, Err(DbError::Bootstrap { .. })));
        assert!(dir.path().is_dir());
    }

    #[rstest]
    #[case("NOT SQL")]
    #[case("CREATE TABLE t (x); CREATE TABLE t (x);")]
    fn test_failed_bootstrap_removes_file(#[case] sql: &str) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.db");
        let result = create_if_missing(&path, &c_path(&path), sql);
        assert!(matches!(result, Err(DbError::Bootstrap { .. })));
        assert!(!path.exists());
    }
}
