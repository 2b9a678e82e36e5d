//! Select query builder.
//!
//! `SelectQuery` is a structured, dialect-free select statement. It is
//! built by value (every method consumes and returns `self`), rendered
//! through `sea-query` by [`crate::query::render`], and executed through a
//! [`LifeExecutor`].

use crate::executor::{LifeError, LifeExecutor};
use crate::query::predicate::{conjoin, disjoin, ColumnRef, Predicate};
use crate::query::Row;
use serde_json::Value;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// One item of a select list
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*` or `table.*`
    AllColumns(Option<String>),
    /// `column` or `column AS alias`
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    /// `(SELECT COUNT(*) FROM ...) AS alias`, correlated with the outer row
    CountOf { query: Box<SelectQuery>, alias: String },
}

/// Inner join of another table
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: Option<String>,
    pub on: Predicate,
}

impl Join {
    /// Name the joined rows are addressed by
    pub fn source_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Query builder for selecting rows
///
/// # Example
///
/// ```
/// use lifeguard_relations::{Order, Predicate, SelectQuery};
///
/// let query = SelectQuery::new("posts")
///     .and_where(Predicate::eq("published", true))
///     .where_in("user_id", [1, 2, 3])
///     .order_by("id", Order::Desc)
///     .limit(10);
///
/// assert_eq!(query.source_name(), "posts");
/// assert_eq!(query.limit, Some(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub alias: Option<String>,
    /// Empty means `*`
    pub projections: Vec<Projection>,
    pub joins: Vec<Join>,
    pub filter: Option<Predicate>,
    pub order_by: Vec<(ColumnRef, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Create a new select over `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            projections: Vec::new(),
            joins: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Create a new select over `table AS alias`
    ///
    /// Used when a table is correlated with itself (self-referential relations).
    pub fn from_as(table: impl Into<String>, alias: impl Into<String>) -> Self {
        let mut query = Self::new(table);
        query.alias = Some(alias.into());
        query
    }

    /// Name the primary rows are addressed by (alias if set, else table)
    pub fn source_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Add a column to the select list
    pub fn column(mut self, column: impl Into<ColumnRef>) -> Self {
        self.projections.push(Projection::Column {
            column: column.into(),
            alias: None,
        });
        self
    }

    /// Add `column AS alias` to the select list
    pub fn column_as(mut self, column: impl Into<ColumnRef>, alias: impl Into<String>) -> Self {
        self.projections.push(Projection::Column {
            column: column.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Add `table.*` to the select list
    pub fn table_columns(mut self, table: impl Into<String>) -> Self {
        self.projections.push(Projection::AllColumns(Some(table.into())));
        self
    }

    /// Add a correlated `COUNT(*)` subquery to the select list
    ///
    /// If the select list was empty (`*`), the primary table's columns are
    /// kept so the count is appended to the full row.
    pub fn count_as(mut self, query: SelectQuery, alias: impl Into<String>) -> Self {
        if self.projections.is_empty() {
            let source = self.source_name().to_string();
            self.projections.push(Projection::AllColumns(Some(source)));
        }
        self.projections.push(Projection::CountOf {
            query: Box::new(query),
            alias: alias.into(),
        });
        self
    }

    /// Inner join `table` on `on`
    pub fn join(mut self, table: impl Into<String>, on: Predicate) -> Self {
        self.joins.push(Join {
            table: table.into(),
            alias: None,
            on,
        });
        self
    }

    /// Inner join `table AS alias` on `on`
    pub fn join_as(mut self, table: impl Into<String>, alias: impl Into<String>, on: Predicate) -> Self {
        self.joins.push(Join {
            table: table.into(),
            alias: Some(alias.into()),
            on,
        });
        self
    }

    /// Add a filter condition, conjoined with any existing filter
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.filter = conjoin(self.filter.take(), predicate);
        self
    }

    /// Add a filter condition, disjoined with any existing filter
    pub fn or_where(mut self, predicate: Predicate) -> Self {
        self.filter = disjoin(self.filter.take(), predicate);
        self
    }

    /// Shorthand for `and_where(Predicate::is_in(column, values))`
    pub fn where_in<I, V>(self, column: impl Into<ColumnRef>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.and_where(Predicate::is_in(column, values))
    }

    /// Add an ORDER BY clause
    pub fn order_by(mut self, column: impl Into<ColumnRef>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    /// Add a LIMIT clause
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add an OFFSET clause
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Execute the query and return every matching row
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the executor fails.
    pub fn execute(&self, executor: &dyn LifeExecutor) -> Result<Vec<Row>, LifeError> {
        executor.select(self)
    }
}
