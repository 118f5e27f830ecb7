//! Typed values and row sets exchanged with the backing store.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sql::escape_sql_string;

/// A single typed cell value.
///
/// Covers the scalar types the engine moves between the store and its own
/// key/hash computations. Exotic store types are surfaced as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret the value as a point in time, if it has one.
    ///
    /// Dates map to midnight UTC so that `MAX(date_column)` watermarks and
    /// timestamp windows compare on the same axis.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => Utc
                .from_local_datetime(&d.and_time(NaiveTime::MIN))
                .single(),
            _ => None,
        }
    }

    /// Render the value as a SQL literal suitable for generated statements.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() {
                    // Debug formatting keeps a trailing ".0" so the store
                    // infers a floating-point type, not an integer.
                    format!("{:?}", f)
                } else if f.is_nan() {
                    "CAST('NaN' AS DOUBLE)".to_string()
                } else if f.is_sign_positive() {
                    "CAST('Infinity' AS DOUBLE)".to_string()
                } else {
                    "CAST('-Infinity' AS DOUBLE)".to_string()
                }
            }
            Value::Text(s) => format!("'{}'", escape_sql_string(s)),
            Value::Timestamp(ts) => {
                format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f"))
            }
            Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// A column-ordered result set read from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Row-major cell values; every row has `columns.len()` entries.
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate rows as borrowed views carrying the shared column header.
    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            columns: &self.columns,
            values,
        })
    }

    /// The single cell of a one-row, one-column result (e.g. `SELECT MAX(..)`),
    /// if the shape matches.
    pub fn scalar(&self) -> Option<&Value> {
        if self.rows.len() == 1 && self.rows[0].len() == 1 {
            Some(&self.rows[0][0])
        } else {
            None
        }
    }
}

/// Borrowed view of one row within a [`Rows`] result set.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    /// Look up a cell by column name. `None` means the column is absent,
    /// which is distinct from a present `Value::Null`.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.values[i])
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_null_literal() {
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn test_text_literal_escapes_quotes() {
        assert_eq!(
            Value::Text("O'Brien".to_string()).to_sql_literal(),
            "'O''Brien'"
        );
    }

    #[test]
    fn test_float_literal_keeps_fraction() {
        assert_eq!(Value::Float(1.0).to_sql_literal(), "1.0");
        assert_eq!(Value::Integer(1).to_sql_literal(), "1");
    }

    #[test]
    fn test_date_literal() {
        let d = NaiveDate::from_ymd_opt(2023, 1, 4).unwrap();
        assert_eq!(Value::Date(d).to_sql_literal(), "DATE '2023-01-04'");
    }

    #[test]
    fn test_date_as_timestamp_is_midnight_utc() {
        let d = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();
        let ts = Value::Date(d).as_timestamp().unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-01-03 00:00:00");
    }

    #[test]
    fn test_rows_get_by_name() {
        let rows = Rows {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec![Value::Integer(1), Value::Text("a".to_string())]],
        };
        let row = rows.iter().next().unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_scalar_shape() {
        let rows = Rows {
            columns: vec!["max".to_string()],
            rows: vec![vec![Value::Null]],
        };
        assert_eq!(rows.scalar(), Some(&Value::Null));
        assert!(Rows::new(vec!["max".to_string()]).scalar().is_none());
    }
}
