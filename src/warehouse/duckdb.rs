//! DuckDB warehouse adapter
//!
//! A file-backed (or in-memory) DuckDB database. Every session is a clone of
//! one root connection, so all sessions see the same catalog.

use super::connection::{quote_ident, LoadMode, TableRef, WarehouseConnection, WarehouseConnector};
use crate::error::{Error, Result};
use crate::types::TargetType;
use ::duckdb::types::Value;
use ::duckdb::Connection;
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float64Type, Int64Type, SchemaRef, TimeUnit, TimestampMicrosecondType};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use std::sync::{Mutex, PoisonError};

/// Opens sessions on one DuckDB database
pub struct DuckDbConnector {
    root: Mutex<Connection>,
    /// Database path, for logging
    path: String,
}

impl std::fmt::Debug for DuckDbConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbConnector")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DuckDbConnector {
    /// Open (or create) a database file; `:memory:` opens a private in-memory database
    pub fn open(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        let root = Connection::open(path)
            .map_err(|e| Error::config(format!("Failed to open DuckDB database '{path}': {e}")))?;
        tracing::debug!(path, "Opened DuckDB warehouse");
        Ok(Self {
            root: Mutex::new(root),
            path: path.to_string(),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let root = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;
        Ok(Self {
            root: Mutex::new(root),
            path: ":memory:".to_string(),
        })
    }

    /// Raw connection sharing this database, for ad-hoc queries
    pub fn raw_connection(&self) -> Result<Connection> {
        let root = self.root.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(root.try_clone()?)
    }
}

impl WarehouseConnector for DuckDbConnector {
    fn connect(&self) -> Result<Box<dyn WarehouseConnection>> {
        Ok(Box::new(DuckDbConnection {
            conn: self.raw_connection()?,
        }))
    }
}

/// One DuckDB session
pub struct DuckDbConnection {
    conn: Connection,
}

impl DuckDbConnection {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl WarehouseConnection for DuckDbConnection {
    fn introspect_columns(&mut self, table: &TableRef) -> Result<Option<Vec<String>>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?)
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(::duckdb::params![table.schema, table.name], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((!columns.is_empty()).then_some(columns))
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "Executing warehouse statement");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn load(&mut self, table: &TableRef, batch: &RecordBatch, mode: LoadMode) -> Result<usize> {
        let schema = batch.schema();
        let tx = self.conn.transaction()?;

        let prelude = match mode {
            LoadMode::Create => create_table_sql(table, &schema),
            LoadMode::Overwrite => format!("DELETE FROM {}", table.qualified()),
        };
        tracing::debug!(sql = %prelude, "Executing warehouse statement");
        tx.execute_batch(&prelude)?;

        if batch.num_columns() > 0 {
            let sql = insert_sql(table, &schema);
            tracing::debug!(sql = %sql, rows = batch.num_rows(), "Inserting rows");
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..batch.num_rows() {
                let values = batch
                    .columns()
                    .iter()
                    .map(|array| sql_value(array, row))
                    .collect::<Result<Vec<_>>>()?;
                stmt.execute(::duckdb::params_from_iter(values))?;
            }
        }

        tx.commit()?;
        Ok(batch.num_rows())
    }
}

fn create_table_sql(table: &TableRef, schema: &SchemaRef) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| {
            format!(
                "{} {}",
                quote_ident(f.name()),
                TargetType::from_arrow(f.data_type()).sql_type()
            )
        })
        .collect();
    format!("CREATE TABLE {} ({})", table.qualified(), columns.join(", "))
}

fn insert_sql(table: &TableRef, schema: &SchemaRef) -> String {
    let names: Vec<String> = schema.fields().iter().map(|f| quote_ident(f.name())).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        table.qualified(),
        names.join(", ")
    )
}

/// Convert one cell into a bindable value
fn sql_value(array: &ArrayRef, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Int64 => Value::BigInt(array.as_primitive::<Int64Type>().value(row)),
        DataType::Float64 => Value::Double(array.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::Binary => Value::Blob(array.as_binary::<i32>().value(row).to_vec()),
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = array.as_primitive::<TimestampMicrosecondType>().value(row);
            let ts = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                Error::sink_fatal("warehouse", format!("timestamp out of range: {micros}"))
            })?;
            // Bound as text; the column type does the cast
            Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        other => {
            return Err(Error::sink_fatal(
                "warehouse",
                format!("unsupported column type {other}"),
            ))
        }
    };
    Ok(value)
}
