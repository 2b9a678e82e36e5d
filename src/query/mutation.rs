//! Insert, update and delete statements.

use crate::query::predicate::Predicate;
use crate::query::Row;

/// `INSERT INTO table (...) VALUES (...), ...`
///
/// Each row may carry a different column set; missing columns are stored as
/// `NULL` (or the store's generated key).
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub rows: Vec<Row>,
}

impl InsertStatement {
    /// Create an empty insert into `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row
    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    /// Append several rows
    pub fn rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.rows.extend(rows);
        self
    }
}

/// `UPDATE table SET ... WHERE ...`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub values: Row,
    pub filter: Option<Predicate>,
}

impl UpdateStatement {
    pub fn new(table: impl Into<String>, values: Row) -> Self {
        Self {
            table: table.into(),
            values,
            filter: None,
        }
    }

    /// Restrict the update; conditions are conjoined
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.filter = crate::query::predicate::conjoin(self.filter.take(), predicate);
        self
    }
}

/// `DELETE FROM table WHERE ...`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub filter: Option<Predicate>,
}

impl DeleteStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    /// Restrict the delete; conditions are conjoined
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.filter = crate::query::predicate::conjoin(self.filter.take(), predicate);
        self
    }
}
