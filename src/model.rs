//! Entity instances.
//!
//! A [`Model`] is one row materialized against its [`EntitySchema`]: its own
//! attributes, the relations loaded onto it, the count aggregates requested
//! with `with_count` and, for rows fetched through a many-to-many relation,
//! the pivot columns of the membership that produced it.
//!
//! Serialization follows the result contract
//! `{ ...attributes, [relation]: entity | [entity], __meta__?: { alias: count } }`:
//! `__meta__` is only emitted when a count was requested, and pivot columns
//! are not serialized.

pub mod persist;

use crate::query::Row;
use crate::schema::EntitySchema;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Relation slot of a model
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// `OneToOne` / `InverseOneToOne`
    One(Option<Box<Model>>),
    /// `OneToMany` / `ManyToMany` / `Indirect`
    Many(Vec<Model>),
}

impl Related {
    /// Number of related entities
    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single entity of a to-one slot, or the first of a to-many slot
    pub fn first(&self) -> Option<&Model> {
        match self {
            Related::One(one) => one.as_deref(),
            Related::Many(many) => many.first(),
        }
    }

    /// Every related entity
    pub fn models(&self) -> Vec<&Model> {
        match self {
            Related::One(one) => one.as_deref().into_iter().collect(),
            Related::Many(many) => many.iter().collect(),
        }
    }

    /// Consume into the list of related entities
    pub fn into_models(self) -> Vec<Model> {
        match self {
            Related::One(one) => one.map(|m| vec![*m]).unwrap_or_default(),
            Related::Many(many) => many,
        }
    }
}

/// A materialized entity
///
/// # Example
///
/// ```
/// use lifeguard_relations::{EntitySchema, Model};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let mut post = Model::new(Arc::new(EntitySchema::new("Post", "posts")));
/// post.set("title", json!("Hello"));
///
/// assert_eq!(post.get("title"), &json!("Hello"));
/// assert!(post.get("missing").is_null());
/// assert_eq!(post.to_json(), json!({"title": "Hello"}));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    schema: Arc<EntitySchema>,
    attributes: Row,
    relations: BTreeMap<String, Related>,
    meta: Row,
    pivot: Option<Row>,
    persisted: bool,
}

impl Model {
    /// New, unpersisted model
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            attributes: Row::new(),
            relations: BTreeMap::new(),
            meta: Row::new(),
            pivot: None,
            persisted: false,
        }
    }

    /// Model materialized from a stored row
    pub fn from_row(schema: Arc<EntitySchema>, row: Row) -> Self {
        Self {
            schema,
            attributes: row,
            relations: BTreeMap::new(),
            meta: Row::new(),
            pivot: None,
            persisted: true,
        }
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Attribute value, `Null` when absent
    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(column.into(), value.into());
    }

    /// Primary key value, `Null` until persisted
    pub fn key(&self) -> &Value {
        self.get(&self.schema.primary_key)
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Loaded relation slot, `None` when the relation was not loaded
    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Entities of a loaded to-many relation (empty when not loaded)
    pub fn related_many(&self, name: &str) -> &[Model] {
        match self.relations.get(name) {
            Some(Related::Many(many)) => many,
            _ => &[],
        }
    }

    /// Entity of a loaded to-one relation
    pub fn related_one(&self, name: &str) -> Option<&Model> {
        match self.relations.get(name) {
            Some(Related::One(one)) => one.as_deref(),
            _ => None,
        }
    }

    /// Attach a loaded relation, replacing any previous load
    pub fn set_related(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Count aggregate stored under `alias`
    pub fn count(&self, alias: &str) -> Option<i64> {
        self.meta.get(alias).and_then(Value::as_i64)
    }

    /// Metadata bucket (`with_count` aggregates)
    pub fn meta(&self) -> &Row {
        &self.meta
    }

    /// Pivot columns of the membership this model was fetched through
    pub fn pivot(&self) -> Option<&Row> {
        self.pivot.as_ref()
    }

    pub(crate) fn set_meta(&mut self, alias: String, value: Value) {
        self.meta.insert(alias, value);
    }

    pub(crate) fn set_pivot(&mut self, pivot: Option<Row>) {
        self.pivot = pivot;
    }

    pub(crate) fn take_attribute(&mut self, column: &str) -> Option<Value> {
        self.attributes.remove(column)
    }

    pub(crate) fn replace_attributes(&mut self, attributes: Row) {
        self.attributes = attributes;
        self.persisted = true;
    }

    /// JSON form following the serialization contract
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = self.relations.len() + usize::from(!self.meta.is_empty());
        let mut map = serializer.serialize_map(Some(self.attributes.len() + extra))?;
        for (column, value) in &self.attributes {
            map.serialize_entry(column, value)?;
        }
        for (name, related) in &self.relations {
            match related {
                Related::One(one) => map.serialize_entry(name, &one.as_deref())?,
                Related::Many(many) => map.serialize_entry(name, many)?,
            }
        }
        if !self.meta.is_empty() {
            map.serialize_entry("__meta__", &self.meta)?;
        }
        map.end()
    }
}
