//! Thin ownership wrappers over the SQLite C API.
//!
//! This is the only module that talks to `libsqlite3-sys` directly. Every
//! function here is a one-to-one mapping onto an engine primitive and reports
//! failures as raw result codes; turning those codes into [`DbError`] values
//! with context is the job of the public layer.
//!
//! Neither wrapper implements `Drop`. The public owners ([`Database`] and
//! [`Statement`]) release the native handle exactly once, either through an
//! explicit `close`/`finalize` call or from their own `Drop`.
//!
//! [`DbError`]: super::DbError
//! [`Database`]: super::Database
//! [`Statement`]: super::Statement

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr::{self, NonNull};

use libsqlite3_sys as ffi;

/// Raw engine result code.
pub(crate) type Code = c_int;

/// Classification of one `sqlite3_step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// A result row is available for reading.
    Row,
    /// The statement ran to completion.
    Done,
    /// Anything else, carrying the engine's result code.
    Error(Code),
}

impl Step {
    fn from_code(rc: Code) -> Self {
        match rc {
            ffi::SQLITE_ROW => Step::Row,
            ffi::SQLITE_DONE => Step::Done,
            rc => Step::Error(rc),
        }
    }
}

/// Storage class of a single result cell, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Null,
}

impl ColumnType {
    fn from_code(code: c_int) -> Self {
        match code {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Real,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }
}

/// Engine text for a result code, e.g. "database is locked".
pub(crate) fn code_message(rc: Code) -> String {
    unsafe { cstr_to_string(ffi::sqlite3_errstr(rc)) }
}

unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

// =============================================================================
// Connection
// =============================================================================

/// Exclusively owned `sqlite3*`.
pub(crate) struct RawConnection {
    db: NonNull<ffi::sqlite3>,
}

// The bundled engine is compiled in serialized mode, so moving a connection
// to another thread is fine. Shared access is not, hence no `Sync`.
unsafe impl Send for RawConnection {}

impl RawConnection {
    /// Open (or create) the database at `path`.
    ///
    /// On failure any partially allocated handle is released before the
    /// code is returned.
    pub(crate) fn open(path: &CStr) -> Result<Self, Code> {
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let rc = unsafe { ffi::sqlite3_open(path.as_ptr(), &mut db) };
        if rc != ffi::SQLITE_OK {
            if !db.is_null() {
                unsafe { ffi::sqlite3_close(db) };
            }
            return Err(rc);
        }
        NonNull::new(db)
            .map(|db| Self { db })
            .ok_or(ffi::SQLITE_NOMEM)
    }

    /// Close the connection. On failure the connection is handed back
    /// together with the engine code so the caller keeps ownership.
    pub(crate) fn close(self) -> Result<(), (Self, Code)> {
        let rc = unsafe { ffi::sqlite3_close(self.db.as_ptr()) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err((self, rc))
        }
    }

    pub(crate) fn exec(&self, sql: &CStr) -> Code {
        unsafe {
            ffi::sqlite3_exec(
                self.db.as_ptr(),
                sql.as_ptr(),
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        }
    }

    /// The engine's last error text for this connection.
    pub(crate) fn errmsg(&self) -> String {
        unsafe { cstr_to_string(ffi::sqlite3_errmsg(self.db.as_ptr())) }
    }

    pub(crate) fn busy_timeout(&self, ms: c_int) -> Code {
        unsafe { ffi::sqlite3_busy_timeout(self.db.as_ptr(), ms) }
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.db.as_ptr()) }
    }

    pub(crate) fn changes(&self) -> c_int {
        unsafe { ffi::sqlite3_changes(self.db.as_ptr()) }
    }

    pub(crate) fn enable_load_extension(&self, enable: bool) -> Code {
        unsafe { ffi::sqlite3_enable_load_extension(self.db.as_ptr(), c_int::from(enable)) }
    }

    /// Load a native extension. The engine's own error message is returned
    /// verbatim when it supplies one.
    pub(crate) fn load_extension(&self, file: &CStr) -> Result<(), (Code, Option<String>)> {
        let mut err: *mut c_char = ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_load_extension(self.db.as_ptr(), file.as_ptr(), ptr::null(), &mut err)
        };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        let message = if err.is_null() {
            None
        } else {
            let text = unsafe { cstr_to_string(err) };
            unsafe { ffi::sqlite3_free(err as *mut c_void) };
            Some(text)
        };
        Err((rc, message))
    }

    fn as_ptr(&self) -> *mut ffi::sqlite3 {
        self.db.as_ptr()
    }
}

// =============================================================================
// Statement
// =============================================================================

/// Exclusively owned `sqlite3_stmt*`.
pub(crate) struct RawStatement {
    stmt: NonNull<ffi::sqlite3_stmt>,
}

impl RawStatement {
    /// Compile `sql` against `conn`.
    ///
    /// Returns `Ok(None)` when the text holds no statement at all
    /// (whitespace or comments only).
    pub(crate) fn prepare(conn: &RawConnection, sql: &CStr) -> Result<Option<Self>, Code> {
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(conn.as_ptr(), sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            return Err(rc);
        }
        Ok(NonNull::new(stmt).map(|stmt| Self { stmt }))
    }

    /// Release the compiled statement. The handle is gone afterwards no
    /// matter what code the engine returns.
    pub(crate) fn finalize(self) -> Code {
        unsafe { ffi::sqlite3_finalize(self.stmt.as_ptr()) }
    }

    pub(crate) fn step(&self) -> Step {
        Step::from_code(unsafe { ffi::sqlite3_step(self.stmt.as_ptr()) })
    }

    pub(crate) fn reset(&self) -> Code {
        unsafe { ffi::sqlite3_reset(self.stmt.as_ptr()) }
    }

    pub(crate) fn clear_bindings(&self) -> Code {
        unsafe { ffi::sqlite3_clear_bindings(self.stmt.as_ptr()) }
    }

    pub(crate) fn bind_int(&self, index: c_int, value: i32) -> Code {
        unsafe { ffi::sqlite3_bind_int(self.stmt.as_ptr(), index, value) }
    }

    pub(crate) fn bind_int64(&self, index: c_int, value: i64) -> Code {
        unsafe { ffi::sqlite3_bind_int64(self.stmt.as_ptr(), index, value) }
    }

    pub(crate) fn bind_double(&self, index: c_int, value: f64) -> Code {
        unsafe { ffi::sqlite3_bind_double(self.stmt.as_ptr(), index, value) }
    }

    /// Bind UTF-8 text; the engine takes its own copy.
    pub(crate) fn bind_text(&self, index: c_int, value: &str) -> Code {
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        unsafe {
            ffi::sqlite3_bind_text(
                self.stmt.as_ptr(),
                index,
                value.as_ptr() as *const c_char,
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    /// Bind a byte buffer of explicit length; the engine takes its own copy.
    pub(crate) fn bind_blob(&self, index: c_int, value: &[u8]) -> Code {
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        if len == 0 {
            return unsafe { ffi::sqlite3_bind_zeroblob(self.stmt.as_ptr(), index, 0) };
        }
        unsafe {
            ffi::sqlite3_bind_blob(
                self.stmt.as_ptr(),
                index,
                value.as_ptr() as *const c_void,
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    pub(crate) fn bind_null(&self, index: c_int) -> Code {
        unsafe { ffi::sqlite3_bind_null(self.stmt.as_ptr(), index) }
    }

    /// 1-based index of a named placeholder, or 0 when there is none.
    pub(crate) fn parameter_index(&self, name: &CStr) -> c_int {
        unsafe { ffi::sqlite3_bind_parameter_index(self.stmt.as_ptr(), name.as_ptr()) }
    }

    pub(crate) fn parameter_count(&self) -> c_int {
        unsafe { ffi::sqlite3_bind_parameter_count(self.stmt.as_ptr()) }
    }

    /// Number of columns in the result shape.
    pub(crate) fn column_count(&self) -> c_int {
        unsafe { ffi::sqlite3_column_count(self.stmt.as_ptr()) }
    }

    /// Number of columns in the current row; 0 when no row is available.
    pub(crate) fn data_count(&self) -> c_int {
        unsafe { ffi::sqlite3_data_count(self.stmt.as_ptr()) }
    }

    /// Column name by 0-based position.
    pub(crate) fn column_name(&self, col: c_int) -> String {
        unsafe { cstr_to_string(ffi::sqlite3_column_name(self.stmt.as_ptr(), col)) }
    }

    pub(crate) fn column_type(&self, col: c_int) -> ColumnType {
        ColumnType::from_code(unsafe { ffi::sqlite3_column_type(self.stmt.as_ptr(), col) })
    }

    pub(crate) fn column_int(&self, col: c_int) -> i32 {
        unsafe { ffi::sqlite3_column_int(self.stmt.as_ptr(), col) }
    }

    pub(crate) fn column_int64(&self, col: c_int) -> i64 {
        unsafe { ffi::sqlite3_column_int64(self.stmt.as_ptr(), col) }
    }

    pub(crate) fn column_double(&self, col: c_int) -> f64 {
        unsafe { ffi::sqlite3_column_double(self.stmt.as_ptr(), col) }
    }

    /// Raw bytes of a column, `None` for NULL.
    ///
    /// Text cells come back as their UTF-8 bytes without any conversion, so
    /// repeated borrowed reads of one cell never reallocate it. The slice
    /// stays valid until the statement is stepped, reset or finalized.
    /// Callers tie it to a borrow of the current row.
    pub(crate) fn column_bytes(&self, col: c_int) -> Option<&[u8]> {
        if self.column_type(col) == ColumnType::Null {
            return None;
        }
        unsafe {
            let ptr = ffi::sqlite3_column_blob(self.stmt.as_ptr(), col);
            let len = ffi::sqlite3_column_bytes(self.stmt.as_ptr(), col);
            if ptr.is_null() || len <= 0 {
                // Zero-length values come back as NULL pointers.
                return Some(&[]);
            }
            Some(std::slice::from_raw_parts(ptr as *const u8, len as usize))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cstr(s: &str) -> std::ffi::CString {
        std::ffi::CString::new(s).unwrap()
    }

    fn memory() -> RawConnection {
        RawConnection::open(&cstr(":memory:")).expect("open in-memory engine")
    }

    #[rstest]
    fn test_step_classification() {
        let conn = memory();
        let stmt = RawStatement::prepare(&conn, &cstr("SELECT 1"))
            .unwrap()
            .unwrap();
        assert_eq!(stmt.step(), Step::Row);
        assert_eq!(stmt.column_int(0), 1);
        assert_eq!(stmt.step(), Step::Done);
        assert_eq!(stmt.finalize(), ffi::SQLITE_OK);
        assert!(conn.close().is_ok());
    }

    #[rstest]
    fn test_prepare_comment_only_yields_no_statement() {
        let conn = memory();
        let stmt = RawStatement::prepare(&conn, &cstr("  -- nothing here\n")).unwrap();
        assert!(stmt.is_none());
        assert!(conn.close().is_ok());
    }

    #[rstest]
    fn test_prepare_error_sets_errmsg() {
        let conn = memory();
        let rc = RawStatement::prepare(&conn, &cstr("SELEC 1")).err();
        assert_eq!(rc, Some(ffi::SQLITE_ERROR));
        assert!(conn.errmsg().contains("syntax error"));
        assert!(conn.close().is_ok());
    }

    #[rstest]
    fn test_close_with_open_statement_hands_connection_back() {
        let conn = memory();
        let stmt = RawStatement::prepare(&conn, &cstr("SELECT 1"))
            .unwrap()
            .unwrap();
        let (conn, rc) = match conn.close() {
            Ok(()) => panic!("close should fail while a statement is live"),
            Err(failure) => failure,
        };
        assert_eq!(rc, ffi::SQLITE_BUSY);
        stmt.finalize();
        assert!(conn.close().is_ok());
    }

    #[rstest]
    #[case(ColumnType::Integer, "SELECT 1")]
    #[case(ColumnType::Real, "SELECT 1.5")]
    #[case(ColumnType::Text, "SELECT 'a'")]
    #[case(ColumnType::Blob, "SELECT x'00'")]
    #[case(ColumnType::Null, "SELECT NULL")]
    fn test_column_type(#[case] expected: ColumnType, #[case] sql: &str) {
        let conn = memory();
        let stmt = RawStatement::prepare(&conn, &cstr(sql)).unwrap().unwrap();
        assert_eq!(stmt.step(), Step::Row);
        assert_eq!(stmt.column_type(0), expected);
        stmt.finalize();
        assert!(conn.close().is_ok());
    }

    #[rstest]
    fn test_empty_blob_is_not_null() {
        let conn = memory();
        let stmt = RawStatement::prepare(&conn, &cstr("SELECT ?, NULL"))
            .unwrap()
            .unwrap();
        assert_eq!(stmt.bind_blob(1, &[]), ffi::SQLITE_OK);
        assert_eq!(stmt.step(), Step::Row);
        assert_eq!(stmt.column_bytes(0), Some(&[][..]));
        assert_eq!(stmt.column_bytes(1), None);
        stmt.finalize();
        assert!(conn.close().is_ok());
    }

    #[rstest]
    fn test_code_message() {
        assert_eq!(code_message(ffi::SQLITE_BUSY), "database is locked");
    }
}
