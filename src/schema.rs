//! Entity schemas and the schema registry.
//!
//! An [`EntitySchema`] describes one entity: its name, table, primary key,
//! fields and declared relations. The [`SchemaRegistry`] holds every schema
//! of an application and resolves all relation declarations once, when it
//! is built, so misconfigured relations fail before any query runs.

use crate::config::RelationsConfig;
use crate::executor::{LifeError, LifeExecutor};
use crate::model::Model;
use crate::query::Row;
use crate::relation::def::RelationDef;
use crate::relation::keys::{resolve, ResolvedRelation};
use crate::relation::lazy::LazyLoader;
use crate::relation::query::{ModelQuery, RelationHandle};
use crate::relation::types::RelationType;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Schema of one entity
///
/// # Example
///
/// ```
/// use lifeguard_relations::{EntitySchema, RelationDef};
///
/// let post = EntitySchema::new("Post", "posts")
///     .fields(["id", "user_id", "title"])
///     .timestamps()
///     .relation("author", RelationDef::inverse_one_to_one("User"));
///
/// assert_eq!(post.primary_key, "id");
/// assert!(post.relation_def("author").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Stable identifier relations refer to
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<String>,
    /// `(created_at, updated_at)` columns maintained on save
    pub timestamps: Option<(String, String)>,
    relations: Vec<(String, RelationDef)>,
}

impl EntitySchema {
    /// Create a schema with primary key `id`
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            fields: Vec::new(),
            timestamps: None,
            relations: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Maintain `created_at`/`updated_at` on save
    pub fn timestamps(self) -> Self {
        self.timestamps_with("created_at", "updated_at")
    }

    /// Maintain the given timestamp columns on save
    pub fn timestamps_with(mut self, created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        self.timestamps = Some((created_at.into(), updated_at.into()));
        self
    }

    /// Declare a relation
    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.push((name.into(), def));
        self
    }

    /// Declaration of the relation `name`
    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, def)| def)
    }

    /// Every declared relation in declaration order
    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationDef)> {
        self.relations.iter().map(|(name, def)| (name.as_str(), def))
    }
}

#[derive(Debug)]
struct RegistryInner {
    schemas: BTreeMap<String, Arc<EntitySchema>>,
    relations: BTreeMap<(String, String), Arc<ResolvedRelation>>,
    config: RelationsConfig,
}

/// Typed registry of entity schemas with resolved relations
///
/// Cheap to clone; clones share the same resolved relations.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    inner: Arc<RegistryInner>,
}

/// Builder for [`SchemaRegistry`]
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<EntitySchema>,
    config: Option<RelationsConfig>,
}

impl SchemaRegistryBuilder {
    pub fn schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn config(mut self, config: RelationsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Resolve every relation and build the registry
    ///
    /// Non-indirect relations are resolved first so indirect relations can
    /// compose them.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for duplicate schema or relation
    /// names and for any relation that fails to resolve.
    pub fn build(self) -> Result<SchemaRegistry, LifeError> {
        let config = self.config.unwrap_or_default();

        let mut schemas = BTreeMap::new();
        for schema in self.schemas {
            let name = schema.name.clone();
            if schemas.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(LifeError::config(format!("schema `{name}` is registered twice")));
            }
        }

        for schema in schemas.values() {
            let mut seen = Vec::new();
            for (name, _) in schema.relations() {
                if seen.contains(&name) {
                    return Err(LifeError::config(format!(
                        "relation `{}.{name}` is declared twice",
                        schema.name
                    )));
                }
                seen.push(name);
            }
        }

        let mut relations = BTreeMap::new();
        for indirect in [false, true] {
            for schema in schemas.values() {
                for (name, def) in schema.relations() {
                    if (def.rel_type == RelationType::Indirect) != indirect {
                        continue;
                    }
                    let resolved = resolve(name, def, schema, &schemas, &relations, &config)?;
                    log::debug!(
                        "resolved relation {}: {} keys {:?}",
                        resolved.label(),
                        resolved.rel_type,
                        resolved.keys
                    );
                    relations.insert((schema.name.clone(), name.to_string()), Arc::new(resolved));
                }
            }
        }

        Ok(SchemaRegistry {
            inner: Arc::new(RegistryInner {
                schemas,
                relations,
                config,
            }),
        })
    }
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn config(&self) -> &RelationsConfig {
        &self.inner.config
    }

    /// Schema registered as `name`
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` if no such schema is registered.
    pub fn get(&self, name: &str) -> Result<Arc<EntitySchema>, LifeError> {
        self.inner
            .schemas
            .get(name)
            .cloned()
            .ok_or_else(|| LifeError::config(format!("unknown schema `{name}`")))
    }

    /// Resolved relation `name` declared on `schema`
    ///
    /// Repeated lookups return the same descriptor.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` if the schema declares no such relation.
    pub fn relation(&self, schema: &str, name: &str) -> Result<Arc<ResolvedRelation>, LifeError> {
        self.inner
            .relations
            .get(&(schema.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LifeError::config(format!("schema `{schema}` has no relation `{name}`")))
    }

    /// Root query over every row of `schema`
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for an unknown schema.
    pub fn query(&self, schema: &str) -> Result<ModelQuery, LifeError> {
        Ok(ModelQuery::root(self.clone(), self.get(schema)?))
    }

    /// New, unpersisted model of `schema` with the given attributes
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for an unknown schema.
    pub fn model(&self, schema: &str, attributes: Row) -> Result<Model, LifeError> {
        let mut model = Model::new(self.get(schema)?);
        for (column, value) in attributes {
            model.set(column, value);
        }
        Ok(model)
    }

    /// Insert a new model of `schema` and return it as stored
    ///
    /// # Errors
    ///
    /// Returns `LifeError` for an unknown schema or a failed insert.
    pub fn create(&self, executor: &dyn LifeExecutor, schema: &str, attributes: Row) -> Result<Model, LifeError> {
        let mut model = self.model(schema, attributes)?;
        model.save(executor)?;
        Ok(model)
    }

    /// Relation `name` of `owner`, scoped to that owner
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` if the owner's schema declares no such relation.
    pub fn related(&self, owner: &Model, name: &str) -> Result<RelationHandle, LifeError> {
        let relation = self.relation(&owner.schema().name, name)?;
        Ok(RelationHandle::new(self.clone(), relation, owner))
    }

    /// Lazy eager loader bound to `executor`
    pub fn lazy<'a>(&'a self, executor: &'a dyn LifeExecutor) -> LazyLoader<'a> {
        LazyLoader::new(self, executor)
    }
}
