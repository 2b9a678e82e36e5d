//! Lazy eager loading.
//!
//! Loads relations onto entities that were already fetched without them,
//! using the same batched algorithm as [`ModelQuery::preload`]. Loading
//! `comments` onto 50 posts costs one query, not 50.

use crate::executor::{LifeError, LifeExecutor};
use crate::model::Model;
use crate::relation::eager::{load_plan, CancellationToken};
use crate::relation::preload::{Preloader, QueryPlan};
use crate::relation::query::{Constraint, ModelQuery};
use crate::schema::SchemaRegistry;
use std::sync::Arc;

/// Post-hoc eager loader bound to a registry and an executor
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
///     .schema(EntitySchema::new("Post", "posts").relation("comments", RelationDef::one_to_many("Comment")))
///     .schema(EntitySchema::new("Comment", "comments"))
///     .build()?;
/// let store = MemoryStore::new();
/// store.create_table("posts", Some("id"));
/// store.create_table("comments", Some("id"));
/// store.seed("posts", json!([{"id": 1}, {"id": 2}]))?;
/// store.seed("comments", json!([{"post_id": 1}, {"post_id": 2}, {"post_id": 2}]))?;
///
/// let mut posts = registry.query("Post")?.all(&store)?;
/// registry.lazy(&store).load(&mut posts, "comments")?;
///
/// assert_eq!(posts[1].related_many("comments").len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct LazyLoader<'a> {
    registry: &'a SchemaRegistry,
    executor: &'a dyn LifeExecutor,
    token: CancellationToken,
}

impl<'a> LazyLoader<'a> {
    pub fn new(registry: &'a SchemaRegistry, executor: &'a dyn LifeExecutor) -> Self {
        Self {
            registry,
            executor,
            token: CancellationToken::new(),
        }
    }

    /// Abort loads once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Load relation path `path` onto `models`
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for an unknown path or models of
    /// different schemas, or the executor's error.
    pub fn load(&self, models: &mut [Model], path: &str) -> Result<(), LifeError> {
        self.load_many(models, &[(path, None)])
    }

    /// Load `path` onto `models`, constraining its last segment
    ///
    /// # Errors
    ///
    /// Same as [`LazyLoader::load`].
    pub fn load_with<F>(&self, models: &mut [Model], path: &str, constraint: F) -> Result<(), LifeError>
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        let constraint: Constraint = Arc::new(constraint);
        self.load_many(models, &[(path, Some(constraint))])
    }

    /// Load a single entity's relation
    ///
    /// # Errors
    ///
    /// Same as [`LazyLoader::load`].
    pub fn load_one(&self, model: &mut Model, path: &str) -> Result<(), LifeError> {
        self.load(std::slice::from_mut(model), path)
    }

    /// Load several relation paths, each with an optional constraint
    ///
    /// Sibling paths are loaded the same way as sibling preloads.
    ///
    /// # Errors
    ///
    /// Same as [`LazyLoader::load`].
    pub fn load_many(&self, models: &mut [Model], paths: &[(&str, Option<Constraint>)]) -> Result<(), LifeError> {
        let mut preloader = Preloader::default();
        for (path, constraint) in paths {
            preloader.add(path, constraint.clone())?;
        }
        let Some(first) = models.first() else {
            return Ok(());
        };
        let schema = first.schema().clone();
        if let Some(other) = models.iter().find(|m| m.schema().name != schema.name) {
            return Err(LifeError::config(format!(
                "cannot lazily load onto a mix of {} and {} entities",
                schema.name,
                other.schema().name
            )));
        }

        let plan = QueryPlan::build(self.registry, &schema, &preloader)?;
        self.token.check()?;
        log::debug!("lazily loading {:?} onto {} {} entities", preloader.paths(), models.len(), schema.name);
        load_plan(&plan.nodes, models, self.executor, self.registry.config(), &self.token)
    }
}
