//! Relationship existence filters.
//!
//! `has`/`where_has`/`doesnt_have` filter a query's rows by whether (or how
//! many) related rows exist. Without a count the filter renders as a
//! correlated `EXISTS`; with one it compares a correlated `COUNT(*)`.
//! The `or_` variants disjoin with the previous user filters.

use crate::query::{CompareOp, Predicate};
use crate::relation::query::{Constraint, ModelQuery};
use std::sync::Arc;

/// How an existence filter joins the previous user filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boolean {
    And,
    Or,
}

impl ModelQuery {
    fn existence(
        mut self,
        name: &str,
        constraint: Option<Constraint>,
        count: Option<(&str, i64)>,
        negate: bool,
        boolean: Boolean,
    ) -> Self {
        let subquery = match self.related_subquery(name, constraint.as_ref()) {
            Ok(subquery) => subquery,
            Err(err) => {
                self.record_error(err);
                return self;
            }
        };

        let predicate = match count {
            None if negate => Predicate::exists(subquery).not(),
            None => Predicate::exists(subquery),
            Some((op, count)) => match op.parse::<CompareOp>() {
                Ok(op) if negate => Predicate::count_compare(subquery, op.negate(), count),
                Ok(op) => Predicate::count_compare(subquery, op, count),
                Err(err) => {
                    self.record_error(err);
                    return self;
                }
            },
        };

        match boolean {
            Boolean::And => self.filter(predicate),
            Boolean::Or => self.or_filter(predicate),
        }
    }

    /// Keep rows with at least one related row
    pub fn has(self, name: &str) -> Self {
        self.existence(name, None, None, false, Boolean::And)
    }

    /// Keep rows whose related row count satisfies `op count`
    ///
    /// # Example
    ///
    /// ```
    /// use lifeguard_relations::{EntitySchema, LifeError, RelationDef, SchemaRegistry};
    ///
    /// # fn main() -> Result<(), LifeError> {
    /// let registry = SchemaRegistry::builder()
    ///     .schema(EntitySchema::new("Post", "posts").relation("comments", RelationDef::one_to_many("Comment")))
    ///     .schema(EntitySchema::new("Comment", "comments"))
    ///     .build()?;
    ///
    /// let sql = registry.query("Post")?.has_count("comments", ">", 2).to_sql();
    /// assert!(sql.contains("COUNT(*)"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn has_count(self, name: &str, op: &str, count: i64) -> Self {
        self.existence(name, None, Some((op, count)), false, Boolean::And)
    }

    pub fn or_has(self, name: &str) -> Self {
        self.existence(name, None, None, false, Boolean::Or)
    }

    pub fn or_has_count(self, name: &str, op: &str, count: i64) -> Self {
        self.existence(name, None, Some((op, count)), false, Boolean::Or)
    }

    /// Keep rows with at least one related row matching `constraint`
    pub fn where_has<F>(self, name: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.existence(name, Some(Arc::new(constraint)), None, false, Boolean::And)
    }

    /// Keep rows whose count of related rows matching `constraint` satisfies `op count`
    pub fn where_has_count<F>(self, name: &str, constraint: F, op: &str, count: i64) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.existence(name, Some(Arc::new(constraint)), Some((op, count)), false, Boolean::And)
    }

    pub fn or_where_has<F>(self, name: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.existence(name, Some(Arc::new(constraint)), None, false, Boolean::Or)
    }

    /// Keep rows without related rows
    pub fn doesnt_have(self, name: &str) -> Self {
        self.existence(name, None, None, true, Boolean::And)
    }

    /// Keep rows without related rows matching `constraint`
    pub fn where_doesnt_have<F>(self, name: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.existence(name, Some(Arc::new(constraint)), None, true, Boolean::And)
    }

    pub fn or_doesnt_have(self, name: &str) -> Self {
        self.existence(name, None, None, true, Boolean::Or)
    }

    pub fn or_where_doesnt_have<F>(self, name: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.existence(name, Some(Arc::new(constraint)), None, true, Boolean::Or)
    }
}
