//! Entity queries.
//!
//! [`ModelQuery`] is the entity-level query builder: a [`SelectQuery`] over
//! one schema's rows plus everything that shapes its result (eager loads,
//! relation counts, existence filters, cancellation). A query obtained from
//! a relation ([`RelationHandle::query`]) additionally carries the relation's
//! own scoping predicate; user filters are grouped and conjoined with it, so
//! an `or_*` filter can never widen the result beyond the owner's rows.
//!
//! Builder methods never fail: invalid input (an unknown operator, a pivot
//! filter on a relation without a pivot) is recorded and reported by the
//! terminal call, before any query is issued.

use crate::executor::{LifeError, LifeExecutor};
use crate::model::{Model, Related};
use crate::query::predicate::{conjoin, disjoin};
use crate::query::render::to_sql;
use crate::query::{ColumnRef, CompareOp, Operand, Order, Predicate, Row, SelectQuery, Value};
use crate::relation::condition::{count_column_alias, pivot_column_alias, related_rows, Owner, RelatedRows};
use crate::relation::eager::{self, key_of, CancellationToken};
use crate::relation::keys::{PivotKeys, ResolvedRelation};
use crate::relation::pivot::PivotManager;
use crate::relation::preload::{Preloader, QueryPlan};
use crate::relation::types::RelationType;
use crate::schema::{EntitySchema, SchemaRegistry};
use std::collections::HashSet;
use std::sync::Arc;

/// Constraint closure applied to a relation's query
///
/// Used by constrained preloads, `where_has`-style filters and constrained
/// counts. The closure receives the related query and returns it refined.
pub type Constraint = Arc<dyn Fn(ModelQuery) -> ModelQuery + Send + Sync>;

/// Query over the entities of one schema
///
/// # Example
///
/// ```
/// use lifeguard_relations::{EntitySchema, LifeError, RelationDef, SchemaRegistry};
/// use lifeguard_relations::memory::MemoryStore;
/// use serde_json::json;
///
/// # fn main() -> Result<(), LifeError> {
/// let registry = SchemaRegistry::builder()
///     .schema(EntitySchema::new("User", "users").relation("posts", RelationDef::one_to_many("Post")))
///     .schema(EntitySchema::new("Post", "posts"))
///     .build()?;
///
/// let store = MemoryStore::new();
/// store.create_table("users", Some("id"));
/// store.create_table("posts", Some("id"));
/// store.seed("users", json!([{"id": 1, "name": "ada"}, {"id": 2, "name": "bob"}]))?;
/// store.seed("posts", json!([{"id": 10, "user_id": 1}, {"id": 11, "user_id": 1}]))?;
///
/// let users = registry
///     .query("User")?
///     .has("posts")
///     .preload("posts")
///     .all(&store)?;
///
/// assert_eq!(users.len(), 1);
/// assert_eq!(users[0].related_many("posts").len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ModelQuery {
    registry: SchemaRegistry,
    schema: Arc<EntitySchema>,
    relation: Option<Arc<ResolvedRelation>>,
    base: SelectQuery,
    source: String,
    pivot_source: Option<String>,
    filter: Option<Predicate>,
    order_by: Vec<(ColumnRef, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    counts: Vec<(String, SelectQuery)>,
    preloads: Preloader,
    token: Option<CancellationToken>,
    short_circuit: bool,
    error: Option<LifeError>,
}

impl ModelQuery {
    /// Query over every row of `schema`
    pub fn root(registry: SchemaRegistry, schema: Arc<EntitySchema>) -> Self {
        let base = SelectQuery::new(&schema.table);
        let source = schema.table.clone();
        Self::with_base(registry, schema, None, base, source, None)
    }

    /// Query over the related rows described by `rows`
    pub(crate) fn for_relation(registry: SchemaRegistry, relation: Arc<ResolvedRelation>, rows: RelatedRows) -> Self {
        let schema = relation.target().clone();
        Self::with_base(registry, schema, Some(relation), rows.query, rows.target, rows.pivot)
    }

    /// Unscoped query used as the constraint carrier of a preload node
    ///
    /// The owner keys are filled in per batch by the eager loader.
    pub(crate) fn for_preload(registry: SchemaRegistry, relation: Arc<ResolvedRelation>) -> Self {
        let rows = related_rows(&relation, Owner::Keys(&[]), &[]);
        Self::for_relation(registry, relation, rows)
    }

    fn with_base(
        registry: SchemaRegistry,
        schema: Arc<EntitySchema>,
        relation: Option<Arc<ResolvedRelation>>,
        base: SelectQuery,
        source: String,
        pivot_source: Option<String>,
    ) -> Self {
        Self {
            registry,
            schema,
            relation,
            base,
            source,
            pivot_source,
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            counts: Vec::new(),
            preloads: Preloader::default(),
            token: None,
            short_circuit: false,
            error: None,
        }
    }

    /// Schema of the entities this query returns
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// Relation this query was derived from, if any
    pub fn relation(&self) -> Option<&Arc<ResolvedRelation>> {
        self.relation.as_ref()
    }

    /// Name the returned rows are addressed by (table or alias)
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn record_error(&mut self, err: LifeError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn take_error(&mut self) -> Option<LifeError> {
        self.error.take()
    }

    pub(crate) fn take_preloads(&mut self) -> Preloader {
        std::mem::take(&mut self.preloads)
    }

    pub(crate) fn push_count(&mut self, alias: String, query: SelectQuery) {
        self.counts.push((alias, query));
    }

    fn qualify(&self, predicate: Predicate) -> Predicate {
        qualify_predicate(predicate, &self.source)
    }

    // Filters

    /// Add a filter, conjoined with the previous user filters
    ///
    /// Unqualified columns refer to this query's rows.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        let predicate = self.qualify(predicate);
        self.filter = conjoin(self.filter.take(), predicate);
        self
    }

    /// Add a filter, disjoined with the previous user filters
    pub fn or_filter(mut self, predicate: Predicate) -> Self {
        let predicate = self.qualify(predicate);
        self.filter = disjoin(self.filter.take(), predicate);
        self
    }

    pub fn where_eq(self, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::eq(column, value))
    }

    pub fn or_where_eq(self, column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        self.or_filter(Predicate::eq(column, value))
    }

    /// `column op value`, with `op` one of `=`, `!=`, `<>`, `>`, `>=`, `<`, `<=`
    pub fn where_op(self, column: impl Into<ColumnRef>, op: &str, value: impl Into<Value>) -> Self {
        match op.parse::<CompareOp>() {
            Ok(op) => self.filter(Predicate::compare(column, op, value)),
            Err(err) => self.fail(err),
        }
    }

    pub fn or_where_op(self, column: impl Into<ColumnRef>, op: &str, value: impl Into<Value>) -> Self {
        match op.parse::<CompareOp>() {
            Ok(op) => self.or_filter(Predicate::compare(column, op, value)),
            Err(err) => self.fail(err),
        }
    }

    pub fn where_in<I, V>(self, column: impl Into<ColumnRef>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Predicate::is_in(column, values))
    }

    pub fn where_null(self, column: impl Into<ColumnRef>) -> Self {
        self.filter(Predicate::is_null(column))
    }

    pub fn where_not_null(self, column: impl Into<ColumnRef>) -> Self {
        self.filter(Predicate::is_not_null(column))
    }

    pub fn order_by(mut self, column: impl Into<ColumnRef>, order: Order) -> Self {
        let column = column.into().or_qualify(&self.source);
        self.order_by.push((column, order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn fail(mut self, err: LifeError) -> Self {
        self.record_error(err);
        self
    }

    // Pivot filters

    fn pivot_column(&self, column: &str) -> Result<ColumnRef, LifeError> {
        match &self.pivot_source {
            Some(pivot) => Ok(ColumnRef::qualified(pivot, column)),
            None => Err(LifeError::config(format!(
                "pivot filter on `{column}` requires a many_to_many relation query, got {}",
                self.relation
                    .as_ref()
                    .map_or_else(|| format!("a root query over {}", self.schema.name), |r| r.label())
            ))),
        }
    }

    /// Filter on a pivot column (`ManyToMany` relation queries only)
    pub fn where_pivot(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        let parsed = self.pivot_column(column).and_then(|c| Ok((c, op.parse::<CompareOp>()?)));
        match parsed {
            Ok((column, op)) => self.filter(Predicate::compare(column, op, value)),
            Err(err) => self.fail(err),
        }
    }

    pub fn or_where_pivot(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        let parsed = self.pivot_column(column).and_then(|c| Ok((c, op.parse::<CompareOp>()?)));
        match parsed {
            Ok((column, op)) => self.or_filter(Predicate::compare(column, op, value)),
            Err(err) => self.fail(err),
        }
    }

    pub fn where_in_pivot<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        match self.pivot_column(column) {
            Ok(column) => self.filter(Predicate::is_in(column, values)),
            Err(err) => self.fail(err),
        }
    }

    // Eager loading

    /// Eager-load a relation path (`"posts"`, `"posts.comments"`)
    pub fn preload(self, path: &str) -> Self {
        self.add_preload(path, None)
    }

    /// Eager-load a relation path, constraining its last segment
    ///
    /// The closure may filter, order and limit the related query and declare
    /// nested preloads on it.
    pub fn preload_with<F>(self, path: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.add_preload(path, Some(Arc::new(constraint)))
    }

    pub(crate) fn add_preload(mut self, path: &str, constraint: Option<Constraint>) -> Self {
        if let Err(err) = self.preloads.add(path, constraint) {
            self.record_error(err);
        }
        self
    }

    /// Abort this query (and its eager loads) once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Validated eager-load plan of this query
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for unknown relation paths.
    pub fn plan(&self) -> Result<QueryPlan, LifeError> {
        QueryPlan::build(&self.registry, &self.schema, &self.preloads)
    }

    // Composition

    /// Apply the user filter, ordering, pagination and counts on top of `query`
    pub(crate) fn compose(&self, mut query: SelectQuery) -> SelectQuery {
        if let Some(filter) = &self.filter {
            query = query.and_where(filter.clone());
        }
        for (column, order) in &self.order_by {
            query = query.order_by(column.clone(), *order);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        for (index, (_, count)) in self.counts.iter().enumerate() {
            query = query.count_as(count.clone(), count_column_alias(index));
        }
        query
    }

    /// Only the user filter on top of `query` (existence and count subqueries)
    pub(crate) fn compose_filter(&self, query: SelectQuery) -> SelectQuery {
        match &self.filter {
            Some(filter) => query.and_where(filter.clone()),
            None => query,
        }
    }

    /// The select statement this query executes
    pub fn to_select(&self) -> SelectQuery {
        self.compose(self.base.clone())
    }

    /// SQL of the select statement (PostgreSQL dialect, values inlined)
    pub fn to_sql(&self) -> String {
        to_sql(&self.to_select())
    }

    /// Names bound by this query's FROM and JOIN clauses
    pub(crate) fn bound_names(&self) -> Vec<String> {
        let mut names = vec![self.source.clone()];
        names.extend(self.base.joins.iter().map(|join| join.source_name().to_string()));
        if let Some(pivot) = &self.pivot_source {
            if !names.contains(pivot) {
                names.push(pivot.clone());
            }
        }
        names
    }

    /// Correlated subquery over the rows of relation `name`, constrained by `constraint`
    ///
    /// Shared by existence filters and counts.
    pub(crate) fn related_subquery(&self, name: &str, constraint: Option<&Constraint>) -> Result<SelectQuery, LifeError> {
        if name.contains('.') {
            return Err(LifeError::config(format!(
                "nested relation path `{name}` is not supported here; constrain the first relation instead"
            )));
        }
        let relation = self.registry.relation(&self.schema.name, name)?;
        let local = ColumnRef::qualified(&self.source, &relation.keys.local_key);
        let rows = related_rows(&relation, Owner::Column(&local), &self.bound_names());
        let mut related = ModelQuery::for_relation(self.registry.clone(), relation, rows);
        if let Some(constraint) = constraint {
            related = constraint(related);
        }
        if let Some(err) = related.take_error() {
            return Err(err);
        }
        let base = related.base.clone();
        Ok(related.compose_filter(base))
    }

    fn pivot_keys(&self) -> Option<&PivotKeys> {
        self.relation
            .as_ref()
            .filter(|relation| relation.rel_type == RelationType::ManyToMany)
            .and_then(|relation| relation.pivot.as_ref())
    }

    /// Build a model from a fetched row, moving counts and pivot columns aside
    pub(crate) fn model_from_row(&self, row: Row) -> Model {
        self.model_from_row_with(row, self.pivot_keys())
    }

    /// Same as `model_from_row`, reading pivot columns laid out by `pivot`
    pub(crate) fn model_from_row_with(&self, row: Row, pivot: Option<&PivotKeys>) -> Model {
        let mut model = Model::from_row(self.schema.clone(), row);
        for (index, (alias, _)) in self.counts.iter().enumerate() {
            if let Some(value) = model.take_attribute(&count_column_alias(index)) {
                model.set_meta(alias.clone(), count_value(value));
            }
        }
        let pivot = pivot.map(|pivot| {
            let mut values = Row::new();
            for column in pivot.columns() {
                if let Some(value) = model.take_attribute(&pivot_column_alias(column)) {
                    values.insert(column.to_string(), value);
                }
            }
            values
        });
        model.set_pivot(pivot);
        model
    }

    fn materialize(&self, rows: Vec<Row>) -> Vec<Model> {
        let dedupe = self
            .relation
            .as_ref()
            .is_some_and(|relation| relation.rel_type == RelationType::Indirect);
        let mut seen = HashSet::new();
        rows.into_iter()
            .map(|row| self.model_from_row(row))
            .filter(|model| !dedupe || key_of(model.key()).map_or(true, |key| seen.insert(key)))
            .collect()
    }

    // Terminal operations

    /// Fetch every matching entity and run the eager-load plan on them
    ///
    /// The plan is validated before the first query is issued.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for invalid builder input or preload
    /// paths, `LifeError::Cancelled` when the cancellation token fires, or the
    /// executor's error.
    pub fn all(mut self, executor: &dyn LifeExecutor) -> Result<Vec<Model>, LifeError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let plan = self.plan()?;
        if self.short_circuit {
            log::debug!("{}: owner key is null, no query issued", self.schema.name);
            return Ok(Vec::new());
        }

        let token = self.token.clone().unwrap_or_default();
        token.check()?;

        let query = self.to_select();
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}: {}", self.schema.name, to_sql(&query));
        }
        let rows = executor.select(&query)?;
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_relation_query(&self.schema.name);

        let mut models = self.materialize(rows);
        eager::load_plan(&plan.nodes, &mut models, executor, self.registry.config(), &token)?;
        Ok(models)
    }

    /// First matching entity
    ///
    /// # Errors
    ///
    /// Same as [`ModelQuery::all`].
    pub fn first(self, executor: &dyn LifeExecutor) -> Result<Option<Model>, LifeError> {
        Ok(self.limit(1).all(executor)?.into_iter().next())
    }

    /// First matching entity, `LifeError::NotFound` when there is none
    ///
    /// # Errors
    ///
    /// Same as [`ModelQuery::all`], plus `LifeError::NotFound`.
    pub fn first_or_fail(self, executor: &dyn LifeExecutor) -> Result<Model, LifeError> {
        let name = self.schema.name.clone();
        self.first(executor)?
            .ok_or_else(|| LifeError::NotFound(format!("no {name} matches the query")))
    }

    /// Fetch shaped by the relation's cardinality
    ///
    /// To-one relations yield `Related::One`, everything else `Related::Many`.
    ///
    /// # Errors
    ///
    /// Same as [`ModelQuery::all`].
    pub fn fetch(self, executor: &dyn LifeExecutor) -> Result<Related, LifeError> {
        let to_one = self
            .relation
            .as_ref()
            .is_some_and(|relation| relation.rel_type.is_to_one());
        if to_one {
            Ok(Related::One(self.first(executor)?.map(Box::new)))
        } else {
            Ok(Related::Many(self.all(executor)?))
        }
    }
}

/// Counts arrive as whatever integer type the store returns
fn count_value(value: Value) -> Value {
    match &value {
        Value::Number(n) => n.as_i64().map_or(value.clone(), Value::from),
        Value::String(s) => s.parse::<i64>().map_or(value.clone(), Value::from),
        _ => value,
    }
}

fn qualify_predicate(predicate: Predicate, source: &str) -> Predicate {
    match predicate {
        Predicate::Compare { column, op, operand } => Predicate::Compare {
            column: column.or_qualify(source),
            op,
            operand: match operand {
                Operand::Column(other) => Operand::Column(other.or_qualify(source)),
                value => value,
            },
        },
        Predicate::In { column, values } => Predicate::In {
            column: column.or_qualify(source),
            values,
        },
        Predicate::IsNull(column) => Predicate::IsNull(column.or_qualify(source)),
        Predicate::IsNotNull(column) => Predicate::IsNotNull(column.or_qualify(source)),
        Predicate::All(parts) => Predicate::All(parts.into_iter().map(|p| qualify_predicate(p, source)).collect()),
        Predicate::Any(parts) => Predicate::Any(parts.into_iter().map(|p| qualify_predicate(p, source)).collect()),
        Predicate::Not(inner) => Predicate::Not(Box::new(qualify_predicate(*inner, source))),
        subquery @ (Predicate::Exists(_) | Predicate::CountCompare { .. }) => subquery,
    }
}

/// Relation of one owner entity
///
/// Obtained from [`SchemaRegistry::related`]. Queries through the handle are
/// scoped to the owner's key; an owner whose key is null yields an empty
/// result without issuing a query.
#[derive(Debug, Clone)]
pub struct RelationHandle {
    registry: SchemaRegistry,
    relation: Arc<ResolvedRelation>,
    owner_key: Value,
}

impl RelationHandle {
    pub(crate) fn new(registry: SchemaRegistry, relation: Arc<ResolvedRelation>, owner: &Model) -> Self {
        let owner_key = owner.get(&relation.keys.local_key).clone();
        Self {
            registry,
            relation,
            owner_key,
        }
    }

    pub fn relation(&self) -> &Arc<ResolvedRelation> {
        &self.relation
    }

    /// Owner's value of the relation's local key
    pub fn owner_key(&self) -> &Value {
        &self.owner_key
    }

    /// Query over the owner's related entities
    pub fn query(&self) -> ModelQuery {
        let keys = [self.owner_key.clone()];
        let rows = related_rows(&self.relation, Owner::Keys(&keys), &[]);
        let mut query = ModelQuery::for_relation(self.registry.clone(), self.relation.clone(), rows);
        query.short_circuit = self.owner_key.is_null();
        query
    }

    /// Fetch the related entities, shaped by cardinality
    ///
    /// # Errors
    ///
    /// Returns the executor's error.
    pub fn fetch(&self, executor: &dyn LifeExecutor) -> Result<Related, LifeError> {
        self.query().fetch(executor)
    }

    /// Pivot manager of a `ManyToMany` relation
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for any other relation kind.
    pub fn pivot(&self) -> Result<PivotManager, LifeError> {
        if self.relation.rel_type != RelationType::ManyToMany {
            return Err(LifeError::config(format!(
                "relation `{}` is {}; pivot operations need many_to_many",
                self.relation.label(),
                self.relation.rel_type
            )));
        }
        Ok(PivotManager::new(self.relation.clone(), self.owner_key.clone()))
    }
}
