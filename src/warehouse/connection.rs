//! Connection traits

use crate::error::Result;
use arrow::record_batch::RecordBatch;

/// A schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Quoted `"schema"."name"` for use in SQL
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Quote a SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// How a load treats the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Create the table with typed columns, then insert
    Create,
    /// Replace every row of an existing table
    Overwrite,
}

/// A live warehouse session
///
/// Calls block; the sink runs them on the blocking thread pool.
pub trait WarehouseConnection: Send {
    /// Column names of a table in ordinal order, or `None` if it does not exist
    fn introspect_columns(&mut self, table: &TableRef) -> Result<Option<Vec<String>>>;

    /// Run a statement that returns no rows
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Load a batch whose columns already match the table, in one transaction
    ///
    /// Returns the number of rows written.
    fn load(&mut self, table: &TableRef, batch: &RecordBatch, mode: LoadMode) -> Result<usize>;
}

/// Opens warehouse sessions
pub trait WarehouseConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn WarehouseConnection>>;
}
