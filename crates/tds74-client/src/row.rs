//! Result set representation: column descriptions and decoded rows.

use tds74_protocol::token::ColumnDesc;
use tds74_types::Value;

/// One entry of a result set description.
///
/// Mirrors the classic driver description tuple
/// `(name, type_id, size, display_size, precision, scale, nullable)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Wire type id.
    pub type_id: u8,
    /// Declared size in bytes.
    pub size: u32,
    /// Display size; equals `size`.
    pub display_size: u32,
    /// Precision for exact numeric and fractional-second types.
    pub precision: Option<u8>,
    /// Scale for exact numeric types.
    pub scale: Option<u8>,
    /// Whether the column admits NULL.
    pub nullable: bool,
}

impl Column {
    /// Build a description entry from a wire descriptor.
    #[must_use]
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            name: desc.name.clone(),
            type_id: desc.type_id,
            size: desc.size,
            display_size: desc.size,
            precision: desc.precision,
            scale: desc.scale,
            nullable: desc.nullable,
        }
    }
}

/// One decoded row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Build a row from decoded values.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// The value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row, yielding its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

/// Everything `execute` returns.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Description of the result set columns.
    pub description: Vec<Column>,
    /// Decoded rows.
    pub rows: Vec<Row>,
    /// Accumulated affected-row count.
    pub rowcount: u64,
}

/// Everything `callproc` returns.
#[derive(Debug, Clone, Default)]
pub struct ProcResult {
    /// Procedure return status, when the server sent one.
    pub return_status: Option<i32>,
    /// Description of the result set columns.
    pub description: Vec<Column>,
    /// Decoded rows.
    pub rows: Vec<Row>,
}
