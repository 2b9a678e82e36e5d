//! # Lifeguard Relations
//!
//! Relationship resolution, batched eager loading and pivot management for
//! the Lifeguard data access layer, with sibling loads on `may` coroutines.
//!
//! Relations are declared on entity schemas and resolved once, when the
//! registry is built. Fetches with `preload` paths cost one query per relation
//! node, however many parents the base query returned.
//!
//! ```
//! use lifeguard_relations::{EntitySchema, LifeError, RelationDef, SchemaRegistry};
//! use lifeguard_relations::memory::MemoryStore;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), LifeError> {
//! let registry = SchemaRegistry::builder()
//!     .schema(EntitySchema::new("User", "users").relation("posts", RelationDef::one_to_many("Post")))
//!     .schema(EntitySchema::new("Post", "posts"))
//!     .build()?;
//!
//! let store = MemoryStore::new();
//! store.create_table("users", Some("id"));
//! store.create_table("posts", Some("id"));
//! store.seed("users", json!([{"id": 1}, {"id": 2}]))?;
//! store.seed("posts", json!([{"user_id": 1}, {"user_id": 1}, {"user_id": 2}]))?;
//!
//! let users = registry.query("User")?.preload("posts").all(&store)?;
//! assert_eq!(users[0].related_many("posts").len(), 2);
//! assert_eq!(store.select_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! See [README on GitHub](https://github.com/microscaler/lifeguard) for the wider platform.

pub mod config;
pub mod executor;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod query;
pub mod relation;
pub mod schema;
pub mod transaction;

pub use config::RelationsConfig;
pub use executor::{LifeError, LifeExecutor};
pub use model::{Model, Related};
pub use query::{
    ColumnRef, CompareOp, DeleteStatement, InsertStatement, Order, Predicate, Row, SelectQuery, UpdateStatement,
};
pub use relation::{
    CancellationToken, Constraint, LazyLoader, ModelQuery, PivotManager, QueryPlan, RelationDef, RelationHandle,
    RelationType, SyncChanges,
};
pub use schema::{EntitySchema, SchemaRegistry};
