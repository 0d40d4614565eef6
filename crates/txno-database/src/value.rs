//! Backend-neutral parameter and row values.

use crate::{DatabaseError, DatabaseResult};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed-width timestamp text. Lexical order matches chronological order,
/// so range comparisons work on engines that store timestamps as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A bound parameter or a column value read back from a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(value as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result row, addressable by column name.
///
/// Column lookup ignores ASCII case since some engines fold unquoted
/// identifiers to upper or lower case.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> DatabaseResult<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| DatabaseError::InvalidData(format!("missing column {}", column)))
    }

    pub fn get_index(&self, index: usize) -> DatabaseResult<&SqlValue> {
        self.values
            .get(index)
            .ok_or_else(|| DatabaseError::InvalidData(format!("missing column #{}", index)))
    }

    pub fn get_opt_string(&self, column: &str) -> DatabaseResult<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(i) => Ok(Some(i.to_string())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    pub fn get_string(&self, column: &str) -> DatabaseResult<String> {
        self.get_opt_string(column)?
            .ok_or_else(|| DatabaseError::InvalidData(format!("{} is null", column)))
    }

    pub fn get_opt_i64(&self, column: &str) -> DatabaseResult<Option<i64>> {
        as_opt_i64(column, self.get(column)?)
    }

    pub fn get_i64(&self, column: &str) -> DatabaseResult<i64> {
        self.get_opt_i64(column)?
            .ok_or_else(|| DatabaseError::InvalidData(format!("{} is null", column)))
    }

    /// Booleans arrive as native booleans or as 0/1 integers. Null reads as false.
    pub fn get_bool(&self, column: &str) -> DatabaseResult<bool> {
        match self.get(column)? {
            SqlValue::Null => Ok(false),
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Integer(i) => Ok(*i != 0),
            SqlValue::Text(s) => match s.as_str() {
                "1" | "true" | "TRUE" => Ok(true),
                "0" | "false" | "FALSE" => Ok(false),
                _ => Err(DatabaseError::InvalidData(format!(
                    "{} is not a boolean: {}",
                    column, s
                ))),
            },
            other => Err(type_mismatch(column, "boolean", other)),
        }
    }

    pub fn get_opt_timestamp(&self, column: &str) -> DatabaseResult<Option<DateTime<Utc>>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(t) => Ok(Some(*t)),
            SqlValue::Text(s) => parse_timestamp(s).map(Some).ok_or_else(|| {
                DatabaseError::InvalidData(format!("{} is not a timestamp: {}", column, s))
            }),
            other => Err(type_mismatch(column, "timestamp", other)),
        }
    }

    pub fn get_timestamp(&self, column: &str) -> DatabaseResult<DateTime<Utc>> {
        self.get_opt_timestamp(column)?
            .ok_or_else(|| DatabaseError::InvalidData(format!("{} is null", column)))
    }
}

pub(crate) fn as_opt_i64(column: &str, value: &SqlValue) -> DatabaseResult<Option<i64>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Integer(i) => Ok(Some(*i)),
        SqlValue::Bool(b) => Ok(Some(*b as i64)),
        SqlValue::Text(s) => s.parse().map(Some).map_err(|_| {
            DatabaseError::InvalidData(format!("{} is not an integer: {}", column, s))
        }),
        other => Err(type_mismatch(column, "integer", other)),
    }
}

fn type_mismatch(column: &str, expected: &str, found: &SqlValue) -> DatabaseError {
    DatabaseError::InvalidData(format!("{} expected {}, found {:?}", column, expected, found))
}

/// Parse the fixed-width form, tolerating a `T` separator and RFC 3339 offsets.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}
