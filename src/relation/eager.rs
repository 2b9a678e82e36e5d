//! Batched eager loading.
//!
//! Executes a [`QueryPlan`] against already-fetched parent entities. Every
//! plan node issues one query for the whole batch of parents (two for
//! indirect relations): the distinct, non-null parent keys are collected and
//! matched with a single `IN` predicate, then the related rows are grouped
//! back onto their parents by key. Loading `posts.comments` for 1000 users
//! therefore costs two queries, not 1001.
//!
//! Sibling nodes are independent and run on scoped `may` coroutines when
//! [`RelationsConfig::concurrent_siblings`] is set. A failing sibling cancels
//! the others, and results are attached only once every sibling succeeded,
//! so a failed load never leaves partially populated parents behind.

use crate::config::RelationsConfig;
use crate::executor::{LifeError, LifeExecutor};
use crate::model::{Model, Related};
use crate::query::render::to_sql;
use crate::query::{Row, Value};
use crate::relation::condition::{intermediate_rows, related_rows, Owner};
use crate::relation::keys::ResolvedRelation;
use crate::relation::preload::PlanNode;
use crate::relation::query::ModelQuery;
use crate::relation::types::RelationType;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared by the queries of one fetch
///
/// A child token observes its parent: cancelling the parent cancels every
/// child, while cancelling a child leaves the parent untouched.
///
/// # Example
///
/// ```
/// use lifeguard_relations::CancellationToken;
///
/// let token = CancellationToken::new();
/// let child = token.child();
/// assert!(!child.is_cancelled());
///
/// token.cancel();
/// assert!(child.is_cancelled());
/// assert!(child.check().unwrap_err().is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled together with `self`
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.parent.as_ref().is_some_and(|parent| parent.is_cancelled())
    }

    /// # Errors
    ///
    /// Returns `LifeError::Cancelled` once the token (or an ancestor) is cancelled.
    pub fn check(&self) -> Result<(), LifeError> {
        if self.is_cancelled() {
            return Err(LifeError::Cancelled("eager load cancelled".to_string()));
        }
        Ok(())
    }
}

/// Grouping key of a column value; `None` for null
///
/// Integral numbers normalize to the same key whatever their JSON
/// representation, so `1` and `1.0` group together.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Distinct non-null values of `column` across `models`, in first-seen order
pub fn distinct_keys(models: &[Model], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    models
        .iter()
        .map(|model| model.get(column))
        .filter(|value| key_of(value).is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

/// Related entities of one node, before grouping onto parents
#[derive(Debug, Default)]
struct Batch {
    /// Related entities, unique by primary key
    models: Vec<Model>,
    /// `(parent key, model index, pivot row)` in result order
    links: Vec<(String, usize, Option<Row>)>,
}

impl Batch {
    fn push(&mut self, index: &mut HashMap<String, usize>, model: Model) -> usize {
        match key_of(model.key()) {
            Some(key) => *index.entry(key).or_insert_with(|| {
                self.models.push(model);
                self.models.len() - 1
            }),
            None => {
                self.models.push(model);
                self.models.len() - 1
            }
        }
    }
}

fn fetch_batch(
    relation: &ResolvedRelation,
    query: &ModelQuery,
    keys: &[Value],
    executor: &dyn LifeExecutor,
    token: &CancellationToken,
) -> Result<Batch, LifeError> {
    if keys.is_empty() {
        return Ok(Batch::default());
    }
    token.check()?;

    if relation.rel_type == RelationType::Indirect {
        return fetch_indirect(relation, query, keys, executor, token);
    }

    let select = query.compose(related_rows(relation, Owner::Keys(keys), &[]).query);
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("{}: {}", relation.label(), to_sql(&select));
    }
    let rows = executor.select(&select)?;
    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_relation_query(&relation.target().name);

    let pivot = relation
        .pivot
        .as_ref()
        .filter(|_| relation.rel_type == RelationType::ManyToMany);
    let mut batch = Batch::default();
    let mut index = HashMap::new();
    for row in rows {
        let model = query.model_from_row_with(row, pivot);
        let link = match pivot {
            Some(pivot) => model
                .pivot()
                .and_then(|values| values.get(&pivot.foreign_key))
                .and_then(key_of),
            None => key_of(model.get(&relation.keys.foreign_key)),
        };
        let Some(link) = link else { continue };
        let pivot_row = model.pivot().cloned();
        let position = batch.push(&mut index, model);
        batch.links.push((link, position, pivot_row));
    }
    Ok(batch)
}

/// Intermediate rows first, then the through relation keyed by them
fn fetch_indirect(
    relation: &ResolvedRelation,
    query: &ModelQuery,
    keys: &[Value],
    executor: &dyn LifeExecutor,
    token: &CancellationToken,
) -> Result<Batch, LifeError> {
    let through = relation.through.as_ref().ok_or_else(|| {
        LifeError::config(format!("indirect relation `{}` has no through relation", relation.label()))
    })?;

    let intermediates = executor.select(&intermediate_rows(relation, keys))?;
    let mut parents_of: HashMap<String, Vec<String>> = HashMap::new();
    let mut mid_keys = Vec::new();
    for row in &intermediates {
        let parent = row.get(&relation.keys.foreign_key).and_then(key_of);
        let mid_value = row.get(&through.keys.local_key).cloned().unwrap_or(Value::Null);
        let (Some(parent), Some(mid)) = (parent, key_of(&mid_value)) else {
            continue;
        };
        let parents = parents_of.entry(mid).or_insert_with(|| {
            mid_keys.push(mid_value);
            Vec::new()
        });
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    let inner = fetch_batch(through, query, &mid_keys, executor, token)?;
    let mut batch = Batch {
        models: inner.models,
        links: Vec::new(),
    };
    for model in &mut batch.models {
        model.set_pivot(None);
    }
    let mut linked = HashSet::new();
    for (mid, position, _) in inner.links {
        for parent in parents_of.get(&mid).into_iter().flatten() {
            if linked.insert((parent.clone(), position)) {
                batch.links.push((parent.clone(), position, None));
            }
        }
    }
    Ok(batch)
}

fn attach(relation: &ResolvedRelation, batch: Batch, parents: &mut [Model]) {
    let mut by_parent: HashMap<String, Vec<(usize, Option<Row>)>> = HashMap::new();
    for (parent, position, pivot) in batch.links {
        by_parent.entry(parent).or_default().push((position, pivot));
    }

    for parent in parents.iter_mut() {
        let related: Vec<Model> = key_of(parent.get(&relation.keys.local_key))
            .and_then(|key| by_parent.get(&key))
            .map(|entries| {
                entries
                    .iter()
                    .map(|(position, pivot)| {
                        let mut model = batch.models[*position].clone();
                        if pivot.is_some() {
                            model.set_pivot(pivot.clone());
                        }
                        model
                    })
                    .collect()
            })
            .unwrap_or_default();

        let slot = if relation.rel_type.is_to_one() {
            Related::One(related.into_iter().next().map(Box::new))
        } else {
            Related::Many(related)
        };
        parent.set_related(relation.name.clone(), slot);
    }
}

static STACK_SIZE: OnceCell<usize> = OnceCell::new();

fn configure_coroutines(config: &RelationsConfig) {
    STACK_SIZE.get_or_init(|| {
        may::config().set_stack_size(config.coroutine_stack_size);
        config.coroutine_stack_size
    });
}

fn load_node(
    node: &PlanNode,
    keys: &[Value],
    executor: &dyn LifeExecutor,
    config: &RelationsConfig,
    token: &CancellationToken,
) -> Result<Batch, LifeError> {
    #[cfg(feature = "tracing")]
    let _span = crate::metrics::tracing_helpers::eager_node_span(&node.path, keys.len()).entered();

    token.check()?;
    log::debug!("eager loading {} for {} parent keys", node.path, keys.len());
    let mut batch = fetch_batch(&node.relation, &node.query, keys, executor, token)?;
    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_eager_node(node.depth);

    load_plan(&node.children, &mut batch.models, executor, config, token)?;
    Ok(batch)
}

/// Load `nodes` onto `parents`
///
/// # Errors
///
/// Returns the first non-cancellation error raised by any node, or
/// `LifeError::Cancelled` when `token` was cancelled from outside.
pub(crate) fn load_plan(
    nodes: &[PlanNode],
    parents: &mut [Model],
    executor: &dyn LifeExecutor,
    config: &RelationsConfig,
    token: &CancellationToken,
) -> Result<(), LifeError> {
    if nodes.is_empty() || parents.is_empty() {
        return Ok(());
    }

    let keys: Vec<Vec<Value>> = nodes
        .iter()
        .map(|node| distinct_keys(parents, &node.relation.keys.local_key))
        .collect();
    let siblings = token.child();
    let mut slots: Vec<Option<Result<Batch, LifeError>>> = nodes.iter().map(|_| None).collect();

    if config.concurrent_siblings && nodes.len() > 1 {
        configure_coroutines(config);
        let siblings = &siblings;
        may::coroutine::scope(|scope| {
            for ((node, keys), slot) in nodes.iter().zip(&keys).zip(slots.iter_mut()) {
                may::go!(scope, move || {
                    let result = load_node(node, keys, executor, config, siblings);
                    if result.is_err() {
                        siblings.cancel();
                    }
                    *slot = Some(result);
                });
            }
        });
    } else {
        for ((node, keys), slot) in nodes.iter().zip(&keys).zip(slots.iter_mut()) {
            let result = load_node(node, keys, executor, config, &siblings);
            let failed = result.is_err();
            *slot = Some(result);
            if failed {
                break;
            }
        }
    }

    let mut batches = Vec::with_capacity(nodes.len());
    let mut failure: Option<LifeError> = None;
    for result in slots.into_iter().flatten() {
        match result {
            Ok(batch) => batches.push(batch),
            Err(err) => {
                let replace = match &failure {
                    None => true,
                    Some(previous) => previous.is_cancelled() && !err.is_cancelled(),
                };
                if replace {
                    failure = Some(err);
                }
            }
        }
    }
    if let Some(err) = failure {
        if err.is_cancelled() {
            #[cfg(feature = "metrics")]
            crate::metrics::METRICS.record_cancellation();
        }
        log::warn!("eager load failed: {err}");
        return Err(err);
    }

    for (node, batch) in nodes.iter().zip(batches) {
        attach(&node.relation, batch, parents);
    }
    Ok(())
}
