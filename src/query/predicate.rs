//! Predicate algebra used by the base query builder.
//!
//! Predicates are plain values: they can be cloned into correlated
//! subqueries, rendered through `sea-query`, or evaluated by an in-memory
//! store without any SQL parsing.

use crate::executor::LifeError;
use crate::query::select::SelectQuery;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A (possibly table-qualified) column reference
///
/// # Example
///
/// ```
/// use lifeguard_relations::ColumnRef;
///
/// let col = ColumnRef::from("posts.user_id");
/// assert_eq!(col.table.as_deref(), Some("posts"));
/// assert_eq!(col.column, "user_id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Table name or alias qualifying the column
    pub table: Option<String>,
    /// Column name
    pub column: String,
}

impl ColumnRef {
    /// Unqualified column
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// Table-qualified column
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// Qualify with `table` unless already qualified
    pub fn or_qualify(self, table: &str) -> Self {
        match self.table {
            Some(_) => self,
            None => Self::qualified(table, self.column),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((table, column)) => Self::qualified(table, column),
            None => Self::new(s),
        }
    }
}

impl From<String> for ColumnRef {
    fn from(s: String) -> Self {
        ColumnRef::from(s.as_str())
    }
}

impl From<&String> for ColumnRef {
    fn from(s: &String) -> Self {
        ColumnRef::from(s.as_str())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    /// SQL spelling of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    /// The logical complement: `a op b` is false exactly when `a op.negate() b` is true
    ///
    /// ```
    /// use lifeguard_relations::CompareOp;
    ///
    /// assert_eq!(CompareOp::Ge.negate(), CompareOp::Lt);
    /// assert_eq!(CompareOp::Eq.negate(), CompareOp::Ne);
    /// ```
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// Whether an ordering of `left` relative to `right` satisfies the operator
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }

    /// Compare two counts
    pub fn compare_counts(self, left: i64, right: i64) -> bool {
        self.matches(left.cmp(&right))
    }
}

impl FromStr for CompareOp {
    type Err = LifeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Ne),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            other => Err(LifeError::config(format!("unsupported operator `{other}`"))),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Bound value
    Value(Value),
    /// Another column (join and correlation conditions)
    Column(ColumnRef),
}

/// A boolean condition over the rows of a query
///
/// `All`/`Any` play the role of sea-query's `Condition::all()`/`Condition::any()`.
/// `Exists` and `CountCompare` hold correlated subqueries: unqualified or
/// outer-qualified columns inside them resolve against the enclosing row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op operand`
    Compare {
        column: ColumnRef,
        op: CompareOp,
        operand: Operand,
    },
    /// `column IN (values)`
    In { column: ColumnRef, values: Vec<Value> },
    /// `column IS NULL`
    IsNull(ColumnRef),
    /// `column IS NOT NULL`
    IsNotNull(ColumnRef),
    /// Conjunction
    All(Vec<Predicate>),
    /// Disjunction
    Any(Vec<Predicate>),
    /// Negation
    Not(Box<Predicate>),
    /// `EXISTS (subquery)`
    Exists(Box<SelectQuery>),
    /// `(SELECT COUNT(*) FROM subquery) op count`
    CountCompare {
        query: Box<SelectQuery>,
        op: CompareOp,
        count: i64,
    },
}

impl Predicate {
    /// `column op value`
    pub fn compare(column: impl Into<ColumnRef>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            operand: Operand::Value(value.into()),
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    /// `left = right` between two columns
    pub fn columns_eq(left: ColumnRef, right: ColumnRef) -> Self {
        Predicate::Compare {
            column: left,
            op: CompareOp::Eq,
            operand: Operand::Column(right),
        }
    }

    /// `column IN (values)`
    pub fn is_in<I, V>(column: impl Into<ColumnRef>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<ColumnRef>) -> Self {
        Predicate::IsNull(column.into())
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: impl Into<ColumnRef>) -> Self {
        Predicate::IsNotNull(column.into())
    }

    /// `EXISTS (query)`
    pub fn exists(query: SelectQuery) -> Self {
        Predicate::Exists(Box::new(query))
    }

    /// `(SELECT COUNT(*) ...) op count`
    pub fn count_compare(query: SelectQuery, op: CompareOp, count: i64) -> Self {
        Predicate::CountCompare {
            query: Box::new(query),
            op,
            count,
        }
    }

    /// Conjoin, flattening nested conjunctions
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All(mut left), Predicate::All(right)) => {
                left.extend(right);
                Predicate::All(left)
            }
            (Predicate::All(mut left), right) => {
                left.push(right);
                Predicate::All(left)
            }
            (left, right) => Predicate::All(vec![left, right]),
        }
    }

    /// Disjoin, flattening nested disjunctions
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Any(mut left), Predicate::Any(right)) => {
                left.extend(right);
                Predicate::Any(left)
            }
            (Predicate::Any(mut left), right) => {
                left.push(right);
                Predicate::Any(left)
            }
            (left, right) => Predicate::Any(vec![left, right]),
        }
    }

    /// Negate
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

/// Append `predicate` to an optional accumulated filter with `AND`
pub(crate) fn conjoin(filter: Option<Predicate>, predicate: Predicate) -> Option<Predicate> {
    Some(match filter {
        Some(existing) => existing.and(predicate),
        None => predicate,
    })
}

/// Append `predicate` to an optional accumulated filter with `OR`
pub(crate) fn disjoin(filter: Option<Predicate>, predicate: Predicate) -> Option<Predicate> {
    Some(match filter {
        Some(existing) => existing.or(predicate),
        None => predicate,
    })
}
