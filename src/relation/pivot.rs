//! Pivot membership management for many-to-many relations.
//!
//! A [`PivotManager`] is bound to one owner entity and one `ManyToMany`
//! relation. Every mutating operation runs in its own transaction: a failing
//! statement rolls back everything the operation issued before it.
//!
//! Membership pairs are either present or absent. `attach` makes absent
//! pairs present and rejects pairs that already exist; `detach` removes
//! them; `sync` makes the membership exactly the given set. Re-syncing the
//! same set is a no-op.

use crate::executor::{LifeError, LifeExecutor};
use crate::model::persist::now;
use crate::model::Model;
use crate::query::{CompareOp, DeleteStatement, InsertStatement, Predicate, Row, SelectQuery, UpdateStatement, Value};
use crate::relation::eager::key_of;
use crate::relation::keys::{PivotKeys, ResolvedRelation};
use crate::schema::EntitySchema;
use crate::transaction::transaction;
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of a pivot mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncChanges {
    /// Related ids that gained a membership
    pub attached: Vec<Value>,
    /// Related ids that lost their membership
    pub detached: Vec<Value>,
    /// Related ids whose extra pivot columns were rewritten
    pub updated: Vec<Value>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty() && self.updated.is_empty()
    }
}

/// Pivot operations of one owner's `ManyToMany` relation
///
/// When the relation names a pivot model, pivot rows are inserted, updated
/// and deleted as models of that schema.
///
/// Obtained from [`RelationHandle::pivot`](crate::RelationHandle::pivot).
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
///     .schema(EntitySchema::new("User", "users").relation("roles", RelationDef::many_to_many("Role")))
///     .schema(EntitySchema::new("Role", "roles"))
///     .build()?;
/// let store = MemoryStore::new();
/// store.create_table("users", Some("id"));
/// store.create_table("roles", Some("id"));
/// store.create_table("role_user", None);
/// store.seed("users", json!({"id": 1}))?;
///
/// let user = registry.query("User")?.first_or_fail(&store)?;
/// let roles = registry.related(&user, "roles")?.pivot()?;
/// roles.attach(&store, [5, 7])?;
/// roles.detach(&store, [5])?;
///
/// let ids: Vec<_> = roles.pivot_query().all(&store)?.into_iter().map(|r| r["role_id"].clone()).collect();
/// assert_eq!(ids, vec![json!(7)]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PivotManager {
    relation: Arc<ResolvedRelation>,
    owner_key: Value,
}

impl PivotManager {
    pub(crate) fn new(relation: Arc<ResolvedRelation>, owner_key: Value) -> Self {
        Self {
            relation,
            owner_key,
        }
    }

    pub fn relation(&self) -> &Arc<ResolvedRelation> {
        &self.relation
    }

    fn keys(&self) -> Result<&PivotKeys, LifeError> {
        self.relation
            .pivot
            .as_ref()
            .ok_or_else(|| LifeError::config(format!("relation `{}` has no pivot table", self.relation.label())))
    }

    fn owner(&self) -> Result<&Value, LifeError> {
        if self.owner_key.is_null() {
            return Err(LifeError::Other(format!(
                "cannot change `{}` memberships of an owner without a `{}` value",
                self.relation.label(),
                self.relation.keys.local_key
            )));
        }
        Ok(&self.owner_key)
    }

    fn owner_scope(&self) -> Result<Predicate, LifeError> {
        Ok(Predicate::eq(self.keys()?.foreign_key.as_str(), self.owner()?.clone()))
    }

    /// Pivot rows of the owner, optionally restricted to `ids`
    fn memberships(&self, executor: &dyn LifeExecutor, ids: Option<&[Value]>) -> Result<Vec<Row>, LifeError> {
        let keys = self.keys()?;
        let mut query = SelectQuery::new(&keys.table).and_where(self.owner_scope()?);
        if let Some(ids) = ids {
            query = query.where_in(keys.related_foreign_key.as_str(), ids.iter().cloned());
        }
        executor.select(&query)
    }

    fn new_row(&self, id: &Value) -> Result<Row, LifeError> {
        let keys = self.keys()?;
        let mut row = Row::new();
        row.insert(keys.foreign_key.clone(), self.owner()?.clone());
        row.insert(keys.related_foreign_key.clone(), id.clone());
        Ok(row)
    }

    /// Insert one membership per id inside an open transaction
    pub(crate) fn attach_in(
        &self,
        tx: &dyn LifeExecutor,
        ids: &[Value],
        callback: &mut dyn FnMut(&mut Row),
    ) -> Result<Vec<Value>, LifeError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys = self.keys()?;

        let mut seen = HashSet::new();
        for id in ids {
            let key = key_of(id).ok_or_else(|| {
                LifeError::ConstraintViolation(format!("cannot attach a null id to `{}`", self.relation.label()))
            })?;
            if !seen.insert(key) {
                return Err(LifeError::ConstraintViolation(format!(
                    "{id} is listed twice for `{}`",
                    self.relation.label()
                )));
            }
        }
        if let Some(existing) = self.memberships(tx, Some(ids))?.first() {
            return Err(LifeError::ConstraintViolation(format!(
                "{} already has `{}` membership {}",
                self.owner()?,
                self.relation.label(),
                existing.get(&keys.related_foreign_key).unwrap_or(&Value::Null)
            )));
        }

        let timestamp = now();
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            let mut row = self.new_row(id)?;
            callback(&mut row);
            if keys.model.is_none() {
                if let Some((created_at, updated_at)) = &keys.timestamps {
                    row.entry(created_at.clone()).or_insert_with(|| timestamp.clone());
                    row.insert(updated_at.clone(), timestamp.clone());
                }
            }
            rows.push(row);
        }

        match &keys.model {
            Some(schema) => {
                for row in rows {
                    let mut pivot = Model::new(schema.clone());
                    for (column, value) in row {
                        pivot.set(column, value);
                    }
                    pivot.save(tx)?;
                }
            }
            None => {
                tx.insert(&InsertStatement::new(&keys.table).rows(rows))?;
            }
        }
        Ok(ids.to_vec())
    }

    /// Whether a membership with `id` exists
    pub(crate) fn contains(&self, executor: &dyn LifeExecutor, id: &Value) -> Result<bool, LifeError> {
        Ok(!self.memberships(executor, Some(std::slice::from_ref(id)))?.is_empty())
    }

    fn record(&self, operation: &str, changes: &SyncChanges) {
        log::info!(
            "{} {operation} for {}: attached {:?}, detached {:?}, updated {:?}",
            self.relation.label(),
            self.owner_key,
            changes.attached,
            changes.detached,
            changes.updated
        );
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_pivot_mutation(operation);
    }

    /// Attach `ids` to the owner
    ///
    /// # Errors
    ///
    /// Returns `LifeError::ConstraintViolation` when an id is listed twice or
    /// is already attached; nothing is inserted in that case.
    pub fn attach<I, V>(&self, executor: &dyn LifeExecutor, ids: I) -> Result<SyncChanges, LifeError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.attach_with(executor, ids, |_| {})
    }

    /// Attach `ids`, letting `callback` fill extra columns of each new pivot row
    ///
    /// # Errors
    ///
    /// Same as [`PivotManager::attach`].
    pub fn attach_with<I, V, F>(&self, executor: &dyn LifeExecutor, ids: I, mut callback: F) -> Result<SyncChanges, LifeError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
        F: FnMut(&mut Row),
    {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::pivot_span(&self.relation.label(), "attach").entered();

        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        let attached = transaction(executor, |tx| self.attach_in(tx, &ids, &mut callback))?;
        let changes = SyncChanges {
            attached,
            ..SyncChanges::default()
        };
        self.record("attach", &changes);
        Ok(changes)
    }

    /// Detach `ids` from the owner and return the number of removed rows
    ///
    /// # Errors
    ///
    /// Returns the executor's error.
    pub fn detach<I, V>(&self, executor: &dyn LifeExecutor, ids: I) -> Result<u64, LifeError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_memberships(executor, Some(ids))
    }

    /// Remove every membership of the owner
    ///
    /// # Errors
    ///
    /// Returns the executor's error.
    pub fn detach_all(&self, executor: &dyn LifeExecutor) -> Result<u64, LifeError> {
        self.delete_memberships(executor, None)
    }

    fn delete_memberships(&self, executor: &dyn LifeExecutor, ids: Option<Vec<Value>>) -> Result<u64, LifeError> {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::pivot_span(&self.relation.label(), "detach").entered();

        let keys = self.keys()?;
        let mut filter = self.owner_scope()?;
        if let Some(ids) = &ids {
            filter = filter.and(Predicate::is_in(keys.related_foreign_key.as_str(), ids.iter().cloned()));
        }
        let removed = transaction(executor, |tx| delete_rows(tx, &keys.table, keys.model.as_ref(), filter))?;
        self.record(
            "detach",
            &SyncChanges {
                detached: ids.unwrap_or_default(),
                ..SyncChanges::default()
            },
        );
        Ok(removed)
    }

    /// Make the owner's membership exactly `ids`
    ///
    /// Computed as a diff: missing ids are attached, others detached, and
    /// retained memberships (with their extra columns) are left alone.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::ConstraintViolation` for a null id, otherwise the
    /// executor's error; the membership is unchanged on failure.
    pub fn sync<I, V>(&self, executor: &dyn LifeExecutor, ids: I) -> Result<SyncChanges, LifeError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let entries = ids.into_iter().map(|id| (id.into(), Row::new())).collect();
        self.sync_with(executor, entries, true)
    }

    /// Sync with extra pivot columns per id
    ///
    /// Retained memberships whose extra columns differ from `entries` are
    /// updated. With `detaching` false, memberships absent from `entries` are
    /// kept and only additions and updates happen.
    ///
    /// # Errors
    ///
    /// Same as [`PivotManager::sync`].
    pub fn sync_with(
        &self,
        executor: &dyn LifeExecutor,
        entries: Vec<(Value, Row)>,
        detaching: bool,
    ) -> Result<SyncChanges, LifeError> {
        #[cfg(feature = "tracing")]
        let _span = crate::metrics::tracing_helpers::pivot_span(&self.relation.label(), "sync").entered();

        let keys = self.keys()?;
        let mut wanted: Vec<(String, Value, Row)> = Vec::with_capacity(entries.len());
        for (id, extra) in entries {
            let key = key_of(&id).ok_or_else(|| {
                LifeError::ConstraintViolation(format!("cannot sync a null id into `{}`", self.relation.label()))
            })?;
            match wanted.iter_mut().find(|(existing, _, _)| *existing == key) {
                Some(entry) => entry.2.extend(extra),
                None => wanted.push((key, id, extra)),
            }
        }

        let changes = transaction(executor, |tx| {
            let current = self.memberships(tx, None)?;
            let mut changes = SyncChanges::default();

            if detaching {
                let removed: Vec<Value> = current
                    .iter()
                    .filter_map(|row| row.get(&keys.related_foreign_key))
                    .filter(|id| {
                        key_of(id).is_some_and(|key| !wanted.iter().any(|(wanted_key, _, _)| *wanted_key == key))
                    })
                    .cloned()
                    .collect();
                if !removed.is_empty() {
                    let filter = self
                        .owner_scope()?
                        .and(Predicate::is_in(keys.related_foreign_key.as_str(), removed.iter().cloned()));
                    delete_rows(tx, &keys.table, keys.model.as_ref(), filter)?;
                }
                changes.detached = removed;
            }

            let mut missing = Vec::new();
            for (key, id, extra) in &wanted {
                let existing = current.iter().find(|row| {
                    row.get(&keys.related_foreign_key).and_then(key_of).as_ref() == Some(key)
                });
                match existing {
                    None => missing.push((id.clone(), extra.clone())),
                    Some(row) => {
                        let differs = extra.iter().any(|(column, value)| row.get(column) != Some(value));
                        if differs {
                            self.update_in(tx, id, extra.clone())?;
                            changes.updated.push(id.clone());
                        }
                    }
                }
            }

            if !missing.is_empty() {
                let ids: Vec<Value> = missing.iter().map(|(id, _)| id.clone()).collect();
                let mut extras = missing.into_iter().map(|(_, extra)| extra);
                changes.attached = self.attach_in(tx, &ids, &mut |row: &mut Row| {
                    if let Some(extra) = extras.next() {
                        row.extend(extra);
                    }
                })?;
            }
            Ok(changes)
        })?;

        self.record("sync", &changes);
        Ok(changes)
    }

    fn update_in(&self, tx: &dyn LifeExecutor, id: &Value, mut values: Row) -> Result<u64, LifeError> {
        let keys = self.keys()?;
        if keys.model.is_none() {
            if let Some((_, updated_at)) = &keys.timestamps {
                values.insert(updated_at.clone(), now());
            }
        }
        let filter = self
            .owner_scope()?
            .and(Predicate::eq(keys.related_foreign_key.as_str(), id.clone()));
        update_rows(tx, &keys.table, keys.model.as_ref(), filter, values)
    }

    /// Update the extra columns of the membership with `id`
    ///
    /// Returns the number of updated rows (0 when `id` is not attached).
    ///
    /// # Errors
    ///
    /// Returns the executor's error.
    pub fn update_pivot(&self, executor: &dyn LifeExecutor, id: impl Into<Value>, values: Row) -> Result<u64, LifeError> {
        let id = id.into();
        let updated = transaction(executor, |tx| self.update_in(tx, &id, values))?;
        self.record(
            "update",
            &SyncChanges {
                updated: vec![id],
                ..SyncChanges::default()
            },
        );
        Ok(updated)
    }

    /// Query over the owner's pivot rows alone
    pub fn pivot_query(&self) -> PivotQuery {
        let scope = self.owner_scope();
        let (table, model) = match self.keys() {
            Ok(keys) => (keys.table.clone(), keys.model.clone()),
            Err(_) => (String::new(), None),
        };
        match scope {
            Ok(scope) => PivotQuery {
                table,
                model,
                filter: scope,
                error: None,
            },
            Err(err) => PivotQuery {
                table,
                model,
                filter: Predicate::All(Vec::new()),
                error: Some(err),
            },
        }
    }
}

/// Query over one owner's pivot rows
///
/// The owner scope is always applied; user filters are conjoined with it.
#[derive(Debug, Clone)]
pub struct PivotQuery {
    table: String,
    model: Option<Arc<EntitySchema>>,
    filter: Predicate,
    error: Option<LifeError>,
}

impl PivotQuery {
    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filter = self.filter.and(Predicate::eq(column, value));
        self
    }

    pub fn where_op(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        match op.parse::<CompareOp>() {
            Ok(op) => self.filter = self.filter.and(Predicate::compare(column, op, value)),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter = self.filter.and(Predicate::is_in(column, values));
        self
    }

    fn checked(&self) -> Result<(), LifeError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Matching pivot rows
    ///
    /// # Errors
    ///
    /// Returns a recorded builder error or the executor's error.
    pub fn all(&self, executor: &dyn LifeExecutor) -> Result<Vec<Row>, LifeError> {
        self.checked()?;
        executor.select(&SelectQuery::new(&self.table).and_where(self.filter.clone()))
    }

    /// Set `values` on the matching pivot rows
    ///
    /// # Errors
    ///
    /// Returns a recorded builder error or the executor's error.
    pub fn update(&self, executor: &dyn LifeExecutor, values: Row) -> Result<u64, LifeError> {
        self.checked()?;
        transaction(executor, |tx| {
            update_rows(tx, &self.table, self.model.as_ref(), self.filter.clone(), values)
        })
    }

    /// Delete the matching pivot rows
    ///
    /// # Errors
    ///
    /// Returns a recorded builder error or the executor's error.
    pub fn delete(&self, executor: &dyn LifeExecutor) -> Result<u64, LifeError> {
        self.checked()?;
        transaction(executor, |tx| delete_rows(tx, &self.table, self.model.as_ref(), self.filter.clone()))
    }
}

/// Set `values` on the pivot rows matching `filter`
///
/// With a pivot model each row is loaded and saved as a model.
fn update_rows(
    tx: &dyn LifeExecutor,
    table: &str,
    model: Option<&Arc<EntitySchema>>,
    filter: Predicate,
    values: Row,
) -> Result<u64, LifeError> {
    let Some(schema) = model else {
        return tx.update(&UpdateStatement::new(table, values).and_where(filter));
    };
    let rows = tx.select(&SelectQuery::new(table).and_where(filter))?;
    let updated = rows.len() as u64;
    for row in rows {
        let mut pivot = Model::from_row(schema.clone(), row);
        for (column, value) in &values {
            pivot.set(column.clone(), value.clone());
        }
        pivot.save(tx)?;
    }
    Ok(updated)
}

/// Delete the pivot rows matching `filter`, one model at a time with a pivot model
fn delete_rows(
    tx: &dyn LifeExecutor,
    table: &str,
    model: Option<&Arc<EntitySchema>>,
    filter: Predicate,
) -> Result<u64, LifeError> {
    let Some(schema) = model else {
        return tx.delete(&DeleteStatement::new(table).and_where(filter));
    };
    let mut removed = 0;
    for row in tx.select(&SelectQuery::new(table).and_where(filter))? {
        removed += Model::from_row(schema.clone(), row).delete(tx)?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StatementKind};
    use crate::relation::def::RelationDef;
    use crate::schema::{EntitySchema, SchemaRegistry};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn fixture() -> (SchemaRegistry, MemoryStore, PivotManager) {
        let registry = SchemaRegistry::builder()
            .schema(
                EntitySchema::new("User", "users").relation(
                    "roles",
                    RelationDef::many_to_many("Role").with_pivot(["level"]).with_timestamps(),
                ),
            )
            .schema(EntitySchema::new("Role", "roles"))
            .build()
            .unwrap();
        let store = MemoryStore::new();
        store.create_table("users", Some("id"));
        store.create_table("roles", Some("id"));
        store.create_table("role_user", None);
        store.unique("role_user", &["user_id", "role_id"]).unwrap();
        store.seed("users", json!({"id": 1})).unwrap();
        let user = Model::from_row(registry.get("User").unwrap(), row(json!({"id": 1})));
        let manager = registry.related(&user, "roles").unwrap().pivot().unwrap();
        (registry, store, manager)
    }

    fn role_ids(store: &MemoryStore) -> Vec<Value> {
        store.rows("role_user").into_iter().map(|r| r["role_id"].clone()).collect()
    }

    #[test]
    fn test_attach_sets_timestamps_and_callback_fields() {
        let (_, store, manager) = fixture();
        manager
            .attach_with(&store, [3], |row| {
                row.insert("level".to_string(), json!("admin"));
            })
            .unwrap();
        let rows = store.rows("role_user");
        assert_eq!(rows[0]["level"], json!("admin"));
        assert!(rows[0]["created_at"].is_string());
        assert!(rows[0]["updated_at"].is_string());
    }

    #[test]
    fn test_duplicate_attach_is_rejected() {
        let (_, store, manager) = fixture();
        manager.attach(&store, [3]).unwrap();
        let err = manager.attach(&store, [4, 3]).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(role_ids(&store), vec![json!(3)]);

        let err = manager.attach(&store, [5, 5]).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (_, store, manager) = fixture();
        manager.sync(&store, [1, 2, 3]).unwrap();
        let first = manager.sync(&store, [2]).unwrap();
        assert_eq!(first.detached, vec![json!(1), json!(3)]);
        let second = manager.sync(&store, [2]).unwrap();
        assert!(second.is_empty());
        assert_eq!(role_ids(&store), vec![json!(2)]);
    }

    #[test]
    fn test_sync_with_updates_changed_extras() {
        let (_, store, manager) = fixture();
        manager
            .sync_with(&store, vec![(json!(1), row(json!({"level": "a"}))), (json!(2), row(json!({"level": "b"})))], true)
            .unwrap();
        let changes = manager
            .sync_with(&store, vec![(json!(1), row(json!({"level": "a"}))), (json!(2), row(json!({"level": "c"})))], true)
            .unwrap();
        assert_eq!(changes.updated, vec![json!(2)]);
        assert!(changes.attached.is_empty());

        let changes = manager.sync_with(&store, vec![(json!(9), Row::new())], false).unwrap();
        assert_eq!(changes.attached, vec![json!(9)]);
        assert_eq!(role_ids(&store).len(), 3);
    }

    #[test]
    fn test_sync_failure_rolls_back() {
        let (_, store, manager) = fixture();
        manager.sync(&store, [1, 2]).unwrap();
        store.fail_next(
            StatementKind::Insert,
            "role_user",
            LifeError::QueryExecution("disk full".to_string()),
        );
        let err = manager.sync(&store, [3]).unwrap_err();
        assert_eq!(err, LifeError::QueryExecution("disk full".to_string()));
        assert_eq!(role_ids(&store), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_detach_counts_and_detach_all() {
        let (_, store, manager) = fixture();
        manager.attach(&store, [1, 2, 3]).unwrap();
        assert_eq!(manager.detach(&store, [2, 8]).unwrap(), 1);
        assert_eq!(manager.detach_all(&store).unwrap(), 2);
        assert!(store.rows("role_user").is_empty());
    }

    #[test]
    fn test_pivot_query_is_owner_scoped() {
        let (_, store, manager) = fixture();
        store
            .seed("role_user", json!({"user_id": 2, "role_id": 1, "level": "x"}))
            .unwrap();
        manager.attach(&store, [1, 2]).unwrap();
        let updated = manager
            .pivot_query()
            .update(&store, row(json!({"level": "bulk"})))
            .unwrap();
        assert_eq!(updated, 2);
        let others = store
            .rows("role_user")
            .into_iter()
            .filter(|r| r["user_id"] == json!(2))
            .collect::<Vec<_>>();
        assert_eq!(others[0]["level"], json!("x"));

        let found = manager.pivot_query().where_eq("role_id", 2).all(&store).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_update_pivot() {
        let (_, store, manager) = fixture();
        manager.attach(&store, [4]).unwrap();
        assert_eq!(manager.update_pivot(&store, 4, row(json!({"level": "owner"}))).unwrap(), 1);
        assert_eq!(store.rows("role_user")[0]["level"], json!("owner"));
        assert_eq!(manager.update_pivot(&store, 5, row(json!({"level": "owner"}))).unwrap(), 0);
    }

    #[test]
    fn test_unpersisted_owner() {
        let (registry, store, _) = fixture();
        let user = Model::new(registry.get("User").unwrap());
        let manager = registry.related(&user, "roles").unwrap().pivot().unwrap();
        assert!(matches!(manager.attach(&store, [1]).unwrap_err(), LifeError::Other(_)));
    }

    fn membership_fixture() -> (MemoryStore, PivotManager) {
        let registry = SchemaRegistry::builder()
            .schema(
                EntitySchema::new("User", "users")
                    .relation("teams", RelationDef::many_to_many("Team").with_pivot(["role"]).pivot_model("Membership")),
            )
            .schema(EntitySchema::new("Team", "teams"))
            .schema(EntitySchema::new("Membership", "memberships").timestamps())
            .build()
            .unwrap();
        let store = MemoryStore::new();
        store.create_table("memberships", Some("id"));
        let user = Model::from_row(registry.get("User").unwrap(), row(json!({"id": 1})));
        let manager = registry.related(&user, "teams").unwrap().pivot().unwrap();
        (store, manager)
    }

    fn statements_of(store: &MemoryStore, kind: StatementKind) -> Vec<String> {
        store
            .statements()
            .into_iter()
            .filter(|record| record.kind == kind)
            .map(|record| record.sql)
            .collect()
    }

    #[test]
    fn test_pivot_model_rows_are_saved_as_models() {
        let (store, manager) = membership_fixture();
        manager.attach(&store, [7, 8]).unwrap();
        let rows = store.rows("memberships");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], json!(2));
        assert!(rows[0]["created_at"].is_string());
    }

    #[test]
    fn test_pivot_model_updates_go_through_save() {
        let (store, manager) = membership_fixture();
        store
            .seed(
                "memberships",
                json!([
                    {"user_id": 1, "team_id": 7, "role": "member"},
                    {"user_id": 1, "team_id": 8, "role": "member"}
                ]),
            )
            .unwrap();
        store.reset_counts();

        assert_eq!(manager.update_pivot(&store, 7, row(json!({"role": "lead"}))).unwrap(), 1);
        let updates = statements_of(&store, StatementKind::Update);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].contains("\"id\" = 1"), "{}", updates[0]);

        let rows = store.rows("memberships");
        assert_eq!(rows[0]["role"], json!("lead"));
        assert!(rows[0]["updated_at"].is_string());
        assert!(rows[1]["updated_at"].is_null());

        let changes = manager
            .sync_with(&store, vec![(json!(8), row(json!({"role": "owner"})))], false)
            .unwrap();
        assert_eq!(changes.updated, vec![json!(8)]);
        assert!(store.rows("memberships")[1]["updated_at"].is_string());

        let updated = manager.pivot_query().where_eq("role", "owner").update(&store, row(json!({"role": "admin"}))).unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.rows("memberships")[1]["role"], json!("admin"));
    }

    #[test]
    fn test_pivot_model_detach_deletes_each_model() {
        let (store, manager) = membership_fixture();
        manager.attach(&store, [7, 8, 9]).unwrap();
        store.reset_counts();

        assert_eq!(manager.detach(&store, [7]).unwrap(), 1);
        manager.sync(&store, [9]).unwrap();
        let deletes = statements_of(&store, StatementKind::Delete);
        assert_eq!(deletes.len(), 2);
        assert!(deletes.iter().all(|sql| sql.contains("\"id\" =")), "{deletes:?}");

        assert_eq!(manager.pivot_query().delete(&store).unwrap(), 1);
        assert!(store.rows("memberships").is_empty());
    }

    #[test]
    fn test_sync_rejects_null_id() {
        let (_, store, manager) = fixture();
        manager.attach(&store, [3]).unwrap();
        let err = manager.sync(&store, vec![json!(4), Value::Null]).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(role_ids(&store), vec![json!(3)]);
    }
}
