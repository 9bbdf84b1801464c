//! Marshalling between host types and engine cells.
//!
//! Binding goes through [`ToSql`], which turns a host value into a borrowed
//! [`ValueRef`] tagged with the engine primitive that will store it.
//! Extraction goes through [`FromColumn`], which picks the engine read
//! primitive at compile time from the requested type.
//!
//! # Integer widths
//!
//! The engine offers a 32-bit and a 64-bit integer primitive. `i8`..`i32`
//! bind through the 32-bit one, `i64`/`isize` through the 64-bit one.
//! Unsigned values bind through the 32-bit primitive and are rejected with
//! [`DbError::Range`] before any engine call when they exceed `i32::MAX`;
//! `u64` is deliberately not widened to the 64-bit bind.
//!
//! On the read side narrow and unsigned types are plain casts of the
//! engine's 32-bit read, with no range validation beyond the engine's own.

use std::fmt;

use super::query::Row;
use super::{ColumnType, DbError, Result};

/// Marker binding SQL NULL, and discarding a column when extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Null;

/// A borrowed value ready to be handed to one engine bind primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Int(i32),
    Int64(i64),
    Real(f64),
    Text(&'a str),
    Blob(&'a [u8]),
}

impl ValueRef<'_> {
    /// Human readable kind used in bind error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ValueRef::Null => "NULL",
            ValueRef::Int(_) => "integer",
            ValueRef::Int64(_) => "int64",
            ValueRef::Real(_) => "double",
            ValueRef::Text(_) => "string",
            ValueRef::Blob(_) => "BLOB",
        }
    }
}

/// Types that can be bound to a statement parameter.
pub trait ToSql {
    /// Convert into an engine-ready value. Range checks happen here, before
    /// the statement is touched.
    fn to_sql(&self) -> Result<ValueRef<'_>>;
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        (**self).to_sql()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        match self {
            Some(value) => value.to_sql(),
            None => Ok(ValueRef::Null),
        }
    }
}

impl ToSql for Null {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Null)
    }
}

macro_rules! to_sql_int {
    ($($ty:ty),*) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> Result<ValueRef<'_>> {
                Ok(ValueRef::Int(i32::from(*self)))
            }
        }
    )*};
}

macro_rules! to_sql_unsigned {
    ($($ty:ty),*) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> Result<ValueRef<'_>> {
                i32::try_from(*self)
                    .map(ValueRef::Int)
                    .map_err(|_| DbError::Range { value: *self as u64 })
            }
        }
    )*};
}

to_sql_int!(i8, i16, i32, u8, u16, bool);
to_sql_unsigned!(u32, u64, usize);

impl ToSql for i64 {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Int64(*self))
    }
}

impl ToSql for isize {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Int64(*self as i64))
    }
}

impl ToSql for f64 {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Real(*self))
    }
}

impl ToSql for f32 {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Real(f64::from(*self)))
    }
}

impl ToSql for str {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Text(self))
    }
}

impl ToSql for String {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Text(self))
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Blob(self))
    }
}

impl<const N: usize> ToSql for [u8; N] {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Blob(self))
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(ValueRef::Blob(self))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> Result<ValueRef<'_>> {
        Ok(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Int64(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s),
            Value::Blob(b) => ValueRef::Blob(b),
        })
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Types that can be read out of a column of the current row.
///
/// `'r` is the lifetime of the row view, which lets borrowed types such as
/// `&str` and `&[u8]` point straight into engine memory until the cursor
/// moves on.
pub trait FromColumn<'r>: Sized {
    /// Read column `index` (1-based).
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self>;
}

impl<'r> FromColumn<'r> for Null {
    fn from_column(_row: &Row<'r>, _index: i32) -> Result<Self> {
        Ok(Null)
    }
}

impl<'r> FromColumn<'r> for i32 {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        Ok(row.raw().column_int(col))
    }
}

macro_rules! from_column_cast_int {
    ($($ty:ty),*) => {$(
        impl<'r> FromColumn<'r> for $ty {
            fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
                i32::from_column(row, index).map(|v| v as $ty)
            }
        }
    )*};
}

from_column_cast_int!(i8, i16, u8, u16, u32, u64, usize);

impl<'r> FromColumn<'r> for i64 {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        Ok(row.raw().column_int64(col))
    }
}

impl<'r> FromColumn<'r> for isize {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        i64::from_column(row, index).map(|v| v as isize)
    }
}

impl<'r> FromColumn<'r> for bool {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        i32::from_column(row, index).map(|v| v != 0)
    }
}

impl<'r> FromColumn<'r> for f64 {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        Ok(row.raw().column_double(col))
    }
}

impl<'r> FromColumn<'r> for f32 {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        f64::from_column(row, index).map(|v| v as f32)
    }
}

/// NULL reads as the empty string.
impl<'r> FromColumn<'r> for &'r str {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        let bytes = row.raw().column_bytes(col).unwrap_or_default();
        std::str::from_utf8(bytes).map_err(|_| DbError::InvalidUtf8 {
            index,
            sql: row.sql().to_string(),
        })
    }
}

impl<'r> FromColumn<'r> for String {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        <&str>::from_column(row, index).map(str::to_owned)
    }
}

/// NULL reads as an empty slice.
impl<'r> FromColumn<'r> for &'r [u8] {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        Ok(row.raw().column_bytes(col).unwrap_or_default())
    }
}

impl<'r> FromColumn<'r> for Vec<u8> {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        <&[u8]>::from_column(row, index).map(<[u8]>::to_vec)
    }
}

impl<'r, T: FromColumn<'r>> FromColumn<'r> for Option<T> {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        if row.raw().column_type(col) == ColumnType::Null {
            return Ok(None);
        }
        T::from_column(row, index).map(Some)
    }
}

impl<'r> FromColumn<'r> for Value {
    fn from_column(row: &Row<'r>, index: i32) -> Result<Self> {
        let col = row.checked_column(index)?;
        Ok(match row.raw().column_type(col) {
            ColumnType::Null => Value::Null,
            ColumnType::Integer => Value::Integer(row.raw().column_int64(col)),
            ColumnType::Real => Value::Real(row.raw().column_double(col)),
            ColumnType::Text => Value::Text(String::from_column(row, index)?),
            ColumnType::Blob => Value::Blob(Vec::from_column(row, index)?),
        })
    }
}

// =============================================================================
// Owned dynamic value
// =============================================================================

/// An owned cell of any storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Null => ColumnType::Null,
            Value::Integer(_) => ColumnType::Integer,
            Value::Real(_) => ColumnType::Real,
            Value::Text(_) => ColumnType::Text,
            Value::Blob(_) => ColumnType::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer value; reals are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Type name for debugging and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
