use serde::Serialize;

use crate::schema::Column;

/// Outcome of one CSV entry: the table it produced (or tried to), how many
/// data rows it carried and how many of those were rejected.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub name: String,
    pub columns: Vec<Column>,
    /// Data rows seen in the entry (header excluded).
    pub rows: usize,
    pub inserted: usize,
    pub failed_rows: usize,
    /// Set when the table itself could not be set up (drop/create failed,
    /// or the entry was unreadable). Row-level problems never land here.
    pub error: Option<String>,
}

impl TableReport {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        TableReport {
            name: name.into(),
            columns,
            rows: 0,
            inserted: 0,
            failed_rows: 0,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        TableReport {
            name: name.into(),
            columns: Vec::new(),
            rows: 0,
            inserted: 0,
            failed_rows: 0,
            error: Some(error.into()),
        }
    }
}

/// Summary of one `load_archive` call: per-table outcomes in archive order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub tables: Vec<TableReport>,
    /// True when the load stopped early because the caller cancelled it;
    /// `tables` then holds only the work finished up to that point.
    pub cancelled: bool,
}

impl LoadReport {
    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_failed_rows(&self) -> usize {
        self.tables.iter().map(|t| t.failed_rows).sum()
    }
}
