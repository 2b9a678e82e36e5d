//! Insert, update and delete persistence for models.

use crate::executor::{LifeError, LifeExecutor};
use crate::model::Model;
use crate::query::{DeleteStatement, InsertStatement, Predicate, UpdateStatement};
use serde_json::Value;

/// Current time in the format timestamp columns are written with
pub(crate) fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

impl Model {
    /// Insert the model if it is new, otherwise update its row by primary key
    ///
    /// Schemas with timestamps get `created_at` (on insert) and `updated_at`
    /// set. After an insert the attributes are replaced with the stored row,
    /// so generated keys become visible.
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the statement fails, or `LifeError::Other` when
    /// updating a persisted model without a primary key value.
    ///
    /// # Example
    ///
    /// ```
    /// use lifeguard_relations::{EntitySchema, LifeError, Model};
    /// use lifeguard_relations::memory::MemoryStore;
    /// use serde_json::json;
    /// use std::sync::Arc;
    ///
    /// # fn main() -> Result<(), LifeError> {
    /// let store = MemoryStore::new();
    /// store.create_table("users", Some("id"));
    ///
    /// let mut user = Model::new(Arc::new(EntitySchema::new("User", "users")));
    /// user.set("name", json!("ada"));
    /// user.save(&store)?;
    ///
    /// assert!(user.is_persisted());
    /// assert_eq!(user.key(), &json!(1));
    /// # Ok(())
    /// # }
    /// ```
    pub fn save(&mut self, executor: &dyn LifeExecutor) -> Result<(), LifeError> {
        let schema = self.schema().clone();
        let timestamp = now();

        if !self.is_persisted() {
            if let Some((created_at, updated_at)) = &schema.timestamps {
                if self.get(created_at).is_null() {
                    self.set(created_at.clone(), timestamp.clone());
                }
                self.set(updated_at.clone(), timestamp);
            }
            let stored = executor.insert(&InsertStatement::new(&schema.table).row(self.attributes().clone()))?;
            let row = stored.into_iter().next().ok_or_else(|| {
                LifeError::QueryExecution(format!("insert into {} returned no row", schema.table))
            })?;
            log::debug!("inserted {} {}", schema.name, row.get(&schema.primary_key).unwrap_or(&Value::Null));
            self.replace_attributes(row);
            return Ok(());
        }

        let key = self.key().clone();
        if key.is_null() {
            return Err(LifeError::Other(format!(
                "cannot update {} without a `{}` value",
                schema.name, schema.primary_key
            )));
        }
        if let Some((_, updated_at)) = &schema.timestamps {
            self.set(updated_at.clone(), timestamp);
        }

        let mut values = self.attributes().clone();
        values.remove(&schema.primary_key);
        executor.update(
            &UpdateStatement::new(&schema.table, values).and_where(Predicate::eq(schema.primary_key.as_str(), key)),
        )?;
        Ok(())
    }

    /// Delete the model's row by primary key and return the number of removed rows
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Other` for a model without a primary key value,
    /// otherwise the executor's error.
    pub fn delete(&self, executor: &dyn LifeExecutor) -> Result<u64, LifeError> {
        let schema = self.schema();
        let key = self.key();
        if key.is_null() {
            return Err(LifeError::Other(format!(
                "cannot delete {} without a `{}` value",
                schema.name, schema.primary_key
            )));
        }
        let removed = executor
            .delete(&DeleteStatement::new(&schema.table).and_where(Predicate::eq(schema.primary_key.as_str(), key.clone())))?;
        log::debug!("deleted {} {key}", schema.name);
        Ok(removed)
    }
}
