//! DuckDB store backend implementation

use crate::error::{StoreError, StoreResult};
use crate::traits::Store;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tm_core::schema::Column;
use tm_core::sql::{escape_sql_string, quote_qualified, split_qualified_name};
use tm_core::value::{Rows, Value};

/// DuckDB store backend
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> StoreResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> StoreResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Read rows synchronously
    fn read_sync(&self, sql: &str) -> StoreResult<Rows> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| annotate(e, sql))?;

        let mut columns: Vec<String> = Vec::new();
        let mut data: Vec<Vec<Value>> = Vec::new();
        {
            let mut rows = stmt.query([]).map_err(|e| annotate(e, sql))?;
            while let Some(row) = rows.next().map_err(StoreError::from)? {
                if columns.is_empty() {
                    columns = row
                        .as_ref()
                        .column_names()
                        .iter()
                        .map(|c| c.to_string())
                        .collect();
                }
                let count = row.as_ref().column_count();
                let mut record = Vec::with_capacity(count);
                for i in 0..count {
                    let cell = row.get_ref(i).map_err(StoreError::from)?;
                    record.push(decode_value(cell));
                }
                data.push(record);
            }
        }
        // Empty results still executed, so statement metadata is available
        if columns.is_empty() {
            columns = stmt.column_names().iter().map(|c| c.to_string()).collect();
        }

        Ok(Rows {
            columns,
            rows: data,
        })
    }

    /// Execute a single statement synchronously
    fn write_sync(&self, sql: &str) -> StoreResult<usize> {
        let conn = self.conn()?;
        conn.execute(sql, []).map_err(|e| annotate(e, sql))
    }

    /// Execute statements as one transaction synchronously
    fn write_batch_sync(&self, statements: &[String]) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN TRANSACTION;")
            .map_err(StoreError::from)?;
        for sql in statements {
            if let Err(e) = conn.execute(sql, []) {
                let _ = conn.execute_batch("ROLLBACK;");
                return Err(annotate(e, sql));
            }
        }
        if let Err(e) = conn.execute_batch("COMMIT;") {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(StoreError::from(e));
        }
        Ok(())
    }

    /// Check if relation exists synchronously
    fn relation_exists_sync(&self, name: &str) -> StoreResult<bool> {
        let conn = self.conn()?;

        let (schema, table) = split_qualified_name(name);

        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = '{}' AND table_name = '{}'",
            escape_sql_string(schema),
            escape_sql_string(table)
        );

        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(StoreError::from)?;

        Ok(count > 0)
    }

    /// Count rows of a relation synchronously
    fn row_count_sync(&self, relation: &str) -> StoreResult<usize> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_qualified(relation));
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(StoreError::from)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl Store for DuckDbStore {
    async fn read(&self, sql: &str) -> StoreResult<Rows> {
        self.read_sync(sql)
    }

    async fn atomic_write(&self, sql: &str) -> StoreResult<usize> {
        self.write_sync(sql)
    }

    async fn atomic_write_batch(&self, statements: &[String]) -> StoreResult<()> {
        self.write_batch_sync(statements)
    }

    async fn describe(&self, select: &str) -> StoreResult<Vec<Column>> {
        let described = self.read_sync(&format!("DESCRIBE {}", select))?;
        let name_idx = described
            .column_index("column_name")
            .ok_or_else(|| StoreError::Decode("DESCRIBE output lacks column_name".to_string()))?;
        let type_idx = described
            .column_index("column_type")
            .ok_or_else(|| StoreError::Decode("DESCRIBE output lacks column_type".to_string()))?;

        described
            .rows
            .iter()
            .map(|row| match (&row[name_idx], &row[type_idx]) {
                (Value::Text(name), Value::Text(data_type)) => {
                    Ok(Column::new(name.clone(), data_type.clone()))
                }
                other => Err(StoreError::Decode(format!(
                    "unexpected DESCRIBE row: {:?}",
                    other
                ))),
            })
            .collect()
    }

    async fn relation_exists(&self, name: &str) -> StoreResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn row_count(&self, relation: &str) -> StoreResult<usize> {
        self.row_count_sync(relation)
    }

    fn store_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Attach the offending statement to plain execution errors; classified
/// errors (transient, constraint, not-found) pass through untouched.
fn annotate(err: duckdb::Error, sql: &str) -> StoreError {
    match StoreError::from(err) {
        StoreError::Execution(msg) => StoreError::Execution(format!("{}: {}", msg, sql)),
        other => other,
    }
}

/// Map a DuckDB cell onto the engine's value model.
///
/// Exotic types fall back to their debug rendering as text.
fn decode_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Boolean(b),
        ValueRef::TinyInt(i) => Value::Integer(i64::from(i)),
        ValueRef::SmallInt(i) => Value::Integer(i64::from(i)),
        ValueRef::Int(i) => Value::Integer(i64::from(i)),
        ValueRef::BigInt(i) => Value::Integer(i),
        ValueRef::HugeInt(i) => Value::Integer(i as i64),
        ValueRef::UTinyInt(i) => Value::Integer(i64::from(i)),
        ValueRef::USmallInt(i) => Value::Integer(i64::from(i)),
        ValueRef::UInt(i) => Value::Integer(i64::from(i)),
        ValueRef::UBigInt(i) => Value::Integer(i as i64),
        ValueRef::Float(f) => Value::Float(f64::from(f)),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            Utc.timestamp_micros(micros)
                .single()
                .map(Value::Timestamp)
                .unwrap_or(Value::Null)
        }
        ValueRef::Date32(days) => {
            // Date32 counts days from 1970-01-01; chrono counts from CE day 1
            NaiveDate::from_num_days_from_ce_opt(days.saturating_add(719_163))
                .map(Value::Date)
                .unwrap_or(Value::Null)
        }
        other => Value::Text(format!("{:?}", other)),
    }
}
