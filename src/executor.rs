//! `LifeExecutor` Module
//!
//! Provides the `LifeExecutor` trait that abstracts the relational store the
//! relation engine talks to, and the `LifeError` taxonomy every operation
//! reports through.
//!
//! The relation layer never writes dialect-specific SQL itself. It hands
//! structured statements ([`SelectQuery`], [`InsertStatement`],
//! [`UpdateStatement`], [`DeleteStatement`]) to an executor, which either
//! renders them through `sea-query` (see [`crate::query::render`]) or evaluates
//! them directly, as [`crate::memory::MemoryStore`] does.

use crate::query::{DeleteStatement, InsertStatement, Row, SelectQuery, UpdateStatement};
use std::fmt;

/// `LifeExecutor` error type
///
/// The variants mirror the failure classes of the relation engine:
///
/// - `Configuration` errors are raised eagerly (registry build, plan
///   construction) before any query executes.
/// - `ConstraintViolation` covers duplicate pivot memberships and key
///   violations reported by the store.
/// - `QueryExecution` passes store failures through verbatim.
/// - `NotFound` is only produced by "must exist" variants such as
///   [`ModelQuery::first_or_fail`](crate::relation::ModelQuery::first_or_fail).
/// - `Cancelled` is returned by eager-load work aborted through a
///   [`CancellationToken`](crate::relation::CancellationToken).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifeError {
    /// Invalid relation, schema or eager-load declaration
    Configuration(String),
    /// Unique or foreign-key constraint violated
    ConstraintViolation(String),
    /// Store failure (connectivity, syntax, timeout)
    QueryExecution(String),
    /// A row required to exist was not found
    NotFound(String),
    /// Work was aborted before completion
    Cancelled(String),
    /// Other execution errors
    Other(String),
}

impl LifeError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        LifeError::Configuration(message.into())
    }

    /// Returns `true` for configuration errors
    pub fn is_configuration(&self) -> bool {
        matches!(self, LifeError::Configuration(_))
    }

    /// Returns `true` for constraint violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, LifeError::ConstraintViolation(_))
    }

    /// Returns `true` for cancellations
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LifeError::Cancelled(_))
    }
}

impl fmt::Display for LifeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifeError::Configuration(s) => {
                write!(f, "Configuration error: {s}")
            }
            LifeError::ConstraintViolation(s) => {
                write!(f, "Constraint violation: {s}")
            }
            LifeError::QueryExecution(s) => {
                write!(f, "Query error: {s}")
            }
            LifeError::NotFound(s) => {
                write!(f, "Row not found: {s}")
            }
            LifeError::Cancelled(s) => {
                write!(f, "Cancelled: {s}")
            }
            LifeError::Other(s) => {
                write!(f, "Execution error: {s}")
            }
        }
    }
}

impl std::error::Error for LifeError {}

impl From<config::ConfigError> for LifeError {
    fn from(err: config::ConfigError) -> Self {
        LifeError::Configuration(err.to_string())
    }
}

/// Unit of work handed to [`LifeExecutor::transaction`]
///
/// The closure receives an executor bound to the open transaction. Returning
/// `Err` rolls every statement issued through that executor back.
pub type TransactionWork<'a> = dyn FnMut(&dyn LifeExecutor) -> Result<(), LifeError> + 'a;

/// Trait for executing statements against the relational store
///
/// This trait abstracts database execution, allowing different implementations
/// (SQL connection, pooled connection, in-memory store, etc.) to be used
/// interchangeably by the relation engine.
///
/// Implementations must be `Send + Sync`: sibling eager-load nodes share one
/// executor across coroutines.
///
/// # Examples
///
/// ```no_run
/// use lifeguard_relations::{LifeExecutor, LifeError, SelectQuery};
/// use lifeguard_relations::memory::MemoryStore;
///
/// # fn main() -> Result<(), LifeError> {
/// let store = MemoryStore::new();
/// store.create_table("users", Some("id"));
///
/// let rows = store.select(&SelectQuery::new("users").where_in("id", [1, 2]))?;
/// assert!(rows.is_empty());
/// # Ok(())
/// # }
/// ```
pub trait LifeExecutor: Send + Sync {
    /// Execute a select and return every matching row
    ///
    /// # Errors
    ///
    /// Returns `LifeError::QueryExecution` if the store rejects the query.
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, LifeError>;

    /// Insert rows and return them as stored (including generated keys)
    ///
    /// # Errors
    ///
    /// Returns `LifeError::ConstraintViolation` when a unique key is violated,
    /// or `LifeError::QueryExecution` for store failures.
    fn insert(&self, statement: &InsertStatement) -> Result<Vec<Row>, LifeError>;

    /// Update matching rows and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the statement fails.
    fn update(&self, statement: &UpdateStatement) -> Result<u64, LifeError>;

    /// Delete matching rows and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the statement fails.
    fn delete(&self, statement: &DeleteStatement) -> Result<u64, LifeError>;

    /// Run `work` inside a transaction
    ///
    /// Every statement issued through the executor passed to `work` commits
    /// together when `work` returns `Ok`, and is rolled back when it returns
    /// `Err`. Calling `transaction` on a transaction executor opens a nested
    /// scope (savepoint semantics).
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, or a store error raised while
    /// beginning, committing or rolling back.
    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), LifeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_life_error_display() {
        let err = LifeError::QueryExecution("connection reset".to_string());
        assert!(err.to_string().contains("Query error"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_life_error_all_variants() {
        let err = LifeError::Configuration("unknown relation".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.is_configuration());

        let err = LifeError::ConstraintViolation("duplicate".to_string());
        assert!(err.to_string().contains("Constraint violation"));
        assert!(err.is_constraint_violation());

        let err = LifeError::NotFound("users".to_string());
        assert!(err.to_string().contains("Row not found"));

        let err = LifeError::Cancelled("sibling failed".to_string());
        assert!(err.to_string().contains("Cancelled"));
        assert!(err.is_cancelled());

        let err = LifeError::Other("test".to_string());
        assert!(err.to_string().contains("Execution error"));
    }

    #[test]
    fn test_config_shorthand() {
        let err = LifeError::config("missing schema");
        assert_eq!(err, LifeError::Configuration("missing schema".to_string()));
    }
}
