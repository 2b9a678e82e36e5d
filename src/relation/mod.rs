//! Relation module for entity relationships.
//!
//! Relations are declared on an [`EntitySchema`](crate::schema::EntitySchema)
//! with [`RelationDef`] and resolved once, when the
//! [`SchemaRegistry`](crate::schema::SchemaRegistry) is built:
//! - `OneToOne` / `OneToMany`: the related row holds the owner's key
//! - `InverseOneToOne`: the owner holds the related row's key
//! - `ManyToMany`: memberships live in a pivot table
//! - `Indirect`: a relation reached through an intermediate schema
//!
//! # Architecture
//!
//! - **Def / Keys**: declarations and the default-key algorithm
//! - **Condition**: join predicates and correlated subqueries
//! - **Query**: the relation-scoped [`ModelQuery`] builder
//! - **Existence / Count**: `has`-style filters and `with_count` columns
//! - **Preload / Eager / Lazy**: batched eager loading
//! - **Pivot / Persist**: join-table mutations and saving through relations

pub mod types;
#[doc(inline)]
pub use types::RelationType;

pub mod def;
#[doc(inline)]
pub use def::RelationDef;

pub mod keys;
#[doc(inline)]
pub use keys::{PivotKeys, ResolvedKeys, ResolvedRelation};

pub mod condition;

pub mod query;
#[doc(inline)]
pub use query::{Constraint, ModelQuery, RelationHandle};

pub mod count;
pub mod existence;

pub mod preload;
#[doc(inline)]
pub use preload::{Preloader, QueryPlan};

pub mod eager;
#[doc(inline)]
pub use eager::CancellationToken;

pub mod lazy;
#[doc(inline)]
pub use lazy::LazyLoader;

pub mod pivot;
#[doc(inline)]
pub use pivot::{PivotManager, PivotQuery, SyncChanges};

mod persist;
