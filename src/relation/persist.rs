//! Persisting entities through a relation.
//!
//! `save`/`create` (and their `_many` forms) write related entities with
//! the owner's key filled in: the foreign key of `OneToOne`/`OneToMany`
//! rows, or a new pivot membership for `ManyToMany`. `associate` and
//! `dissociate` set or clear the owner's own foreign key for
//! `InverseOneToOne`. Each call runs in one transaction.

use crate::executor::{LifeError, LifeExecutor};
use crate::model::Model;
use crate::query::{Row, Value};
use crate::relation::query::RelationHandle;
use crate::relation::types::RelationType;
use crate::transaction::transaction;

impl RelationHandle {
    fn expect_kind(&self, operation: &str, kinds: &[RelationType]) -> Result<(), LifeError> {
        let relation = self.relation();
        if kinds.contains(&relation.rel_type) {
            return Ok(());
        }
        Err(LifeError::config(format!(
            "`{operation}` is not supported on {} relation `{}`",
            relation.rel_type,
            relation.label()
        )))
    }

    fn expect_target(&self, model: &Model) -> Result<(), LifeError> {
        let target = self.relation().target();
        if model.schema().name != target.name {
            return Err(LifeError::config(format!(
                "relation `{}` holds {} entities, got {}",
                self.relation().label(),
                target.name,
                model.schema().name
            )));
        }
        Ok(())
    }

    fn owner_value(&self) -> Result<Value, LifeError> {
        if self.owner_key().is_null() {
            return Err(LifeError::Other(format!(
                "cannot persist through `{}`: owner has no `{}` value",
                self.relation().label(),
                self.relation().keys.local_key
            )));
        }
        Ok(self.owner_key().clone())
    }

    fn persist_in(
        &self,
        tx: &dyn LifeExecutor,
        model: &mut Model,
        callback: &mut dyn FnMut(&mut Row),
        is_new: bool,
    ) -> Result<(), LifeError> {
        let relation = self.relation();
        let owner = self.owner_value()?;
        match relation.rel_type {
            RelationType::ManyToMany => {
                model.save(tx)?;
                let pivot = self.pivot()?;
                let related_key = relation
                    .pivot
                    .as_ref()
                    .map_or(relation.related.primary_key.as_str(), |keys| keys.related_key.as_str());
                let id = model.get(related_key).clone();
                if is_new || !pivot.contains(tx, &id)? {
                    pivot.attach_in(tx, std::slice::from_ref(&id), callback)?;
                }
            }
            _ => {
                model.set(relation.keys.foreign_key.clone(), owner);
                model.save(tx)?;
            }
        }
        Ok(())
    }

    /// Save `model` as related to the owner
    ///
    /// `OneToOne`/`OneToMany` set the model's foreign key; `ManyToMany`
    /// saves the model and attaches it unless it is already attached.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` for inverse and indirect relations,
    /// or the executor's error.
    pub fn save(&self, executor: &dyn LifeExecutor, model: &mut Model) -> Result<(), LifeError> {
        self.save_with(executor, model, |_| {})
    }

    /// Save `model`, letting `callback` fill a new pivot row's extra columns
    ///
    /// # Errors
    ///
    /// Same as [`RelationHandle::save`].
    pub fn save_with<F>(&self, executor: &dyn LifeExecutor, model: &mut Model, mut callback: F) -> Result<(), LifeError>
    where
        F: FnMut(&mut Row),
    {
        self.save_many_with(executor, std::slice::from_mut(model), &mut callback)
    }

    /// Save several models in one transaction
    ///
    /// # Errors
    ///
    /// Same as [`RelationHandle::save`]; nothing is persisted on failure.
    pub fn save_many(&self, executor: &dyn LifeExecutor, models: &mut [Model]) -> Result<(), LifeError> {
        self.save_many_with(executor, models, &mut |_| {})
    }

    fn save_many_with(
        &self,
        executor: &dyn LifeExecutor,
        models: &mut [Model],
        callback: &mut dyn FnMut(&mut Row),
    ) -> Result<(), LifeError> {
        self.expect_kind(
            "save",
            &[RelationType::OneToOne, RelationType::OneToMany, RelationType::ManyToMany],
        )?;
        for model in models.iter() {
            self.expect_target(model)?;
        }
        transaction(executor, |tx| {
            for model in models.iter_mut() {
                let is_new = !model.is_persisted();
                self.persist_in(tx, model, callback, is_new)?;
            }
            Ok(())
        })
    }

    /// Create a related entity from `attributes`
    ///
    /// # Errors
    ///
    /// Same as [`RelationHandle::save`].
    pub fn create(&self, executor: &dyn LifeExecutor, attributes: Row) -> Result<Model, LifeError> {
        self.create_with(executor, attributes, |_| {})
    }

    /// Create a related entity, letting `callback` fill the pivot row's extra columns
    ///
    /// # Errors
    ///
    /// Same as [`RelationHandle::save`].
    pub fn create_with<F>(&self, executor: &dyn LifeExecutor, attributes: Row, mut callback: F) -> Result<Model, LifeError>
    where
        F: FnMut(&mut Row),
    {
        let mut created = self.create_many_with(executor, vec![attributes], &mut callback)?;
        created
            .pop()
            .ok_or_else(|| LifeError::Other(format!("`{}` created no entity", self.relation().label())))
    }

    /// Create several related entities in one transaction
    ///
    /// # Errors
    ///
    /// Same as [`RelationHandle::save`]; nothing is persisted on failure.
    pub fn create_many(&self, executor: &dyn LifeExecutor, rows: Vec<Row>) -> Result<Vec<Model>, LifeError> {
        self.create_many_with(executor, rows, &mut |_| {})
    }

    fn create_many_with(
        &self,
        executor: &dyn LifeExecutor,
        rows: Vec<Row>,
        callback: &mut dyn FnMut(&mut Row),
    ) -> Result<Vec<Model>, LifeError> {
        let target = self.relation().target().clone();
        let mut models: Vec<Model> = rows
            .into_iter()
            .map(|attributes| {
                let mut model = Model::new(target.clone());
                for (column, value) in attributes {
                    model.set(column, value);
                }
                model
            })
            .collect();
        self.save_many_with(executor, &mut models, callback)?;
        Ok(models)
    }

    /// Point `owner`'s foreign key at `related` and save `owner`
    ///
    /// `related` itself is not written.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` unless the relation is
    /// `InverseOneToOne`, `LifeError::Other` when `related` has no key value,
    /// or the executor's error.
    pub fn associate(&self, executor: &dyn LifeExecutor, owner: &mut Model, related: &Model) -> Result<(), LifeError> {
        self.expect_kind("associate", &[RelationType::InverseOneToOne])?;
        self.expect_target(related)?;
        let relation = self.relation();
        let key = related.get(&relation.keys.foreign_key).clone();
        if key.is_null() {
            return Err(LifeError::Other(format!(
                "cannot associate `{}` with a {} that has no `{}` value",
                relation.label(),
                related.schema().name,
                relation.keys.foreign_key
            )));
        }
        owner.set(relation.keys.local_key.clone(), key);
        transaction(executor, |tx| owner.save(tx))
    }

    /// Clear `owner`'s foreign key and save `owner`
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Configuration` unless the relation is
    /// `InverseOneToOne`, or the executor's error.
    pub fn dissociate(&self, executor: &dyn LifeExecutor, owner: &mut Model) -> Result<(), LifeError> {
        self.expect_kind("dissociate", &[RelationType::InverseOneToOne])?;
        owner.set(self.relation().keys.local_key.clone(), Value::Null);
        transaction(executor, |tx| owner.save(tx))
    }
}
