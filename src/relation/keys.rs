//! Key resolution for relation declarations.
//!
//! Turns a [`RelationDef`] into a [`ResolvedRelation`] with every key filled
//! in. Omitted keys follow the naming convention
//! `singular(table) + "_" + primary_key`:
//!
//! | Kind | `local_key` | `foreign_key` |
//! |---|---|---|
//! | `OneToOne`, `OneToMany` | owner primary key | `singular(owner.table)_pk` on the related table |
//! | `InverseOneToOne` | `singular(related.table)_pk` on the owner | related primary key |
//! | `ManyToMany` | owner primary key | `singular(owner.table)_pk` on the pivot |
//! | `Indirect` | owner primary key | `singular(owner.table)_pk` on the intermediate table |
//!
//! A `ManyToMany` pivot table defaults to the two singular table names,
//! sorted and joined with `_` (`skill_user`).

use crate::config::RelationsConfig;
use crate::executor::LifeError;
use crate::relation::def::RelationDef;
use crate::relation::types::RelationType;
use crate::schema::EntitySchema;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Singular form of a table name (`users` -> `user`, `categories` -> `category`)
///
/// # Example
///
/// ```
/// use lifeguard_relations::relation::keys::singular;
///
/// assert_eq!(singular("users"), "user");
/// assert_eq!(singular("categories"), "category");
/// ```
pub fn singular(table: &str) -> String {
    pluralizer::pluralize(table, 1, false)
}

fn default_key(schema: &EntitySchema) -> String {
    format!("{}_{}", singular(&schema.table), schema.primary_key)
}

/// Owner/related join keys of a resolved relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeys {
    /// Column on the owner rows
    pub local_key: String,
    /// Column on the related rows (pivot rows for `ManyToMany`, intermediate rows for `Indirect`)
    pub foreign_key: String,
}

/// Pivot table layout of a `ManyToMany` relation
#[derive(Debug, Clone, PartialEq)]
pub struct PivotKeys {
    pub table: String,
    /// Pivot column referencing the owner's local key
    pub foreign_key: String,
    /// Pivot column referencing the related key
    pub related_foreign_key: String,
    /// Related column referenced by `related_foreign_key`
    pub related_key: String,
    /// Extra columns fetched with the related rows
    pub fields: Vec<String>,
    /// `(created_at, updated_at)` column names when timestamps are maintained
    pub timestamps: Option<(String, String)>,
    /// Schema owning the pivot rows
    pub model: Option<Arc<EntitySchema>>,
}

impl PivotKeys {
    /// Every pivot column exposed on fetched models
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = vec![self.foreign_key.as_str(), self.related_foreign_key.as_str()];
        columns.extend(self.fields.iter().map(String::as_str));
        if let Some((created, updated)) = &self.timestamps {
            columns.push(created);
            columns.push(updated);
        }
        columns
    }
}

/// A relation with every key resolved
///
/// Built once per (schema, relation name) when the
/// [`SchemaRegistry`](crate::SchemaRegistry) is built, and shared behind an
/// `Arc` afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRelation {
    pub name: String,
    pub rel_type: RelationType,
    pub owner: Arc<EntitySchema>,
    /// Related schema (for `Indirect`, the intermediate schema)
    pub related: Arc<EntitySchema>,
    pub keys: ResolvedKeys,
    pub pivot: Option<PivotKeys>,
    /// Relation followed from the intermediate schema (`Indirect` only)
    pub through: Option<Arc<ResolvedRelation>>,
}

impl ResolvedRelation {
    /// Schema of the entities a fetch returns
    pub fn target(&self) -> &Arc<EntitySchema> {
        match &self.through {
            Some(through) => through.target(),
            None => &self.related,
        }
    }

    /// Qualified `Owner.name` label used in messages
    pub fn label(&self) -> String {
        format!("{}.{}", self.owner.name, self.name)
    }
}

/// Resolve one declaration
///
/// `direct` holds the already-resolved non-indirect relations of every
/// schema, keyed by `(schema name, relation name)`; indirect relations look
/// their through relation up there.
///
/// # Errors
///
/// Returns `LifeError::Configuration` when the related schema is unknown,
/// pivot options conflict or are set on a non-`ManyToMany` relation, both
/// pivot keys default to the same column, or the through relation is
/// missing or itself indirect.
pub fn resolve(
    name: &str,
    def: &RelationDef,
    owner: &Arc<EntitySchema>,
    schemas: &BTreeMap<String, Arc<EntitySchema>>,
    direct: &BTreeMap<(String, String), Arc<ResolvedRelation>>,
    config: &RelationsConfig,
) -> Result<ResolvedRelation, LifeError> {
    let label = format!("{}.{}", owner.name, name);
    let related = schemas.get(&def.related).cloned().ok_or_else(|| {
        LifeError::config(format!(
            "relation `{label}` references unknown schema `{}`",
            def.related
        ))
    })?;

    let has_pivot_options = def.pivot_table.is_some()
        || def.pivot_model.is_some()
        || def.pivot_timestamps
        || !def.pivot_fields.is_empty()
        || def.related_foreign_key.is_some()
        || def.related_key.is_some();
    if has_pivot_options && def.rel_type != RelationType::ManyToMany {
        return Err(LifeError::config(format!(
            "relation `{label}` is {} but declares pivot options",
            def.rel_type
        )));
    }

    let (keys, pivot, through) = match def.rel_type {
        RelationType::OneToOne | RelationType::OneToMany => (
            ResolvedKeys {
                local_key: def.local_key.clone().unwrap_or_else(|| owner.primary_key.clone()),
                foreign_key: def.foreign_key.clone().unwrap_or_else(|| default_key(owner)),
            },
            None,
            None,
        ),
        RelationType::InverseOneToOne => (
            ResolvedKeys {
                local_key: def.local_key.clone().unwrap_or_else(|| default_key(&related)),
                foreign_key: def.foreign_key.clone().unwrap_or_else(|| related.primary_key.clone()),
            },
            None,
            None,
        ),
        RelationType::ManyToMany => {
            let keys = ResolvedKeys {
                local_key: def.local_key.clone().unwrap_or_else(|| owner.primary_key.clone()),
                foreign_key: def.foreign_key.clone().unwrap_or_else(|| default_key(owner)),
            };
            let pivot = resolve_pivot(&label, def, owner, &related, &keys, schemas, config)?;
            (keys, Some(pivot), None)
        }
        RelationType::Indirect => {
            let through_name = def.through.as_deref().unwrap_or_default();
            let through = match direct.get(&(related.name.clone(), through_name.to_string())) {
                Some(through) => through.clone(),
                None if related.relation_def(through_name).is_some() => {
                    return Err(LifeError::config(format!(
                        "relation `{label}` passes through `{}.{through_name}`, which is itself indirect",
                        related.name
                    )));
                }
                None => {
                    return Err(LifeError::config(format!(
                        "relation `{label}` passes through unknown relation `{}.{through_name}`",
                        related.name
                    )));
                }
            };
            (
                ResolvedKeys {
                    local_key: def.local_key.clone().unwrap_or_else(|| owner.primary_key.clone()),
                    foreign_key: def.foreign_key.clone().unwrap_or_else(|| default_key(owner)),
                },
                None,
                Some(through),
            )
        }
    };

    Ok(ResolvedRelation {
        name: name.to_string(),
        rel_type: def.rel_type,
        owner: owner.clone(),
        related,
        keys,
        pivot,
        through,
    })
}

fn resolve_pivot(
    label: &str,
    def: &RelationDef,
    owner: &EntitySchema,
    related: &EntitySchema,
    keys: &ResolvedKeys,
    schemas: &BTreeMap<String, Arc<EntitySchema>>,
    config: &RelationsConfig,
) -> Result<PivotKeys, LifeError> {
    let (table, timestamps, model) = match &def.pivot_model {
        Some(model_name) => {
            if def.pivot_table.is_some() || def.pivot_timestamps {
                return Err(LifeError::config(format!(
                    "relation `{label}` sets pivot_model `{model_name}` together with pivot_table or with_timestamps"
                )));
            }
            let model = schemas.get(model_name).cloned().ok_or_else(|| {
                LifeError::config(format!(
                    "relation `{label}` references unknown pivot model `{model_name}`"
                ))
            })?;
            (model.table.clone(), model.timestamps.clone(), Some(model))
        }
        None => {
            let table = def.pivot_table.clone().unwrap_or_else(|| {
                let mut names = [singular(&owner.table), singular(&related.table)];
                names.sort();
                names.join("_")
            });
            let timestamps = def.pivot_timestamps.then(|| {
                (
                    config.pivot_created_at_column.clone(),
                    config.pivot_updated_at_column.clone(),
                )
            });
            (table, timestamps, None)
        }
    };

    let related_foreign_key = def
        .related_foreign_key
        .clone()
        .unwrap_or_else(|| default_key(related));
    if related_foreign_key == keys.foreign_key {
        return Err(LifeError::config(format!(
            "relation `{label}` uses `{related_foreign_key}` for both pivot keys; declare them explicitly"
        )));
    }

    Ok(PivotKeys {
        table,
        foreign_key: keys.foreign_key.clone(),
        related_foreign_key,
        related_key: def
            .related_key
            .clone()
            .unwrap_or_else(|| related.primary_key.clone()),
        fields: def.pivot_fields.clone(),
        timestamps,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemas(list: Vec<EntitySchema>) -> BTreeMap<String, Arc<EntitySchema>> {
        list.into_iter().map(|s| (s.name.clone(), Arc::new(s))).collect()
    }

    fn resolve_one(
        all: &BTreeMap<String, Arc<EntitySchema>>,
        owner: &str,
        name: &str,
    ) -> Result<ResolvedRelation, LifeError> {
        let owner = all[owner].clone();
        let def = owner.relation_def(name).unwrap().clone();
        resolve(name, &def, &owner, all, &BTreeMap::new(), &RelationsConfig::default())
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("users"), "user");
        assert_eq!(singular("posts"), "post");
        assert_eq!(singular("countries"), "country");
    }

    #[test]
    fn test_one_to_many_defaults() {
        let all = schemas(vec![
            EntitySchema::new("User", "users").relation("posts", RelationDef::one_to_many("Post")),
            EntitySchema::new("Post", "posts"),
        ]);
        let rel = resolve_one(&all, "User", "posts").unwrap();
        assert_eq!(rel.keys.local_key, "id");
        assert_eq!(rel.keys.foreign_key, "user_id");
        assert!(rel.pivot.is_none());
    }

    #[test]
    fn test_inverse_defaults() {
        let all = schemas(vec![
            EntitySchema::new("Post", "posts")
                .relation("author", RelationDef::inverse_one_to_one("User")),
            EntitySchema::new("User", "users").with_primary_key("uid"),
        ]);
        let rel = resolve_one(&all, "Post", "author").unwrap();
        assert_eq!(rel.keys.local_key, "user_uid");
        assert_eq!(rel.keys.foreign_key, "uid");
    }

    #[test]
    fn test_many_to_many_defaults() {
        let all = schemas(vec![
            EntitySchema::new("User", "users").relation("skills", RelationDef::many_to_many("Skill")),
            EntitySchema::new("Skill", "skills"),
        ]);
        let rel = resolve_one(&all, "User", "skills").unwrap();
        let pivot = rel.pivot.unwrap();
        assert_eq!(pivot.table, "skill_user");
        assert_eq!(pivot.foreign_key, "user_id");
        assert_eq!(pivot.related_foreign_key, "skill_id");
        assert_eq!(pivot.related_key, "id");
        assert_eq!(rel.keys.local_key, "id");
        assert!(pivot.timestamps.is_none());
    }

    #[test]
    fn test_pivot_model_conflict() {
        let all = schemas(vec![
            EntitySchema::new("User", "users").relation(
                "skills",
                RelationDef::many_to_many("Skill")
                    .pivot_model("SkillUser")
                    .pivot_table("user_skills"),
            ),
            EntitySchema::new("Skill", "skills"),
            EntitySchema::new("SkillUser", "skill_user"),
        ]);
        let err = resolve_one(&all, "User", "skills").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_pivot_model_supplies_table_and_timestamps() {
        let all = schemas(vec![
            EntitySchema::new("User", "users")
                .relation("skills", RelationDef::many_to_many("Skill").pivot_model("Membership")),
            EntitySchema::new("Skill", "skills"),
            EntitySchema::new("Membership", "memberships").timestamps(),
        ]);
        let pivot = resolve_one(&all, "User", "skills").unwrap().pivot.unwrap();
        assert_eq!(pivot.table, "memberships");
        assert_eq!(
            pivot.timestamps,
            Some(("created_at".to_string(), "updated_at".to_string()))
        );
        assert!(pivot.model.is_some());
    }

    #[test]
    fn test_self_referential_pivot_needs_explicit_keys() {
        let all = schemas(vec![EntitySchema::new("User", "users")
            .relation("friends", RelationDef::many_to_many("User"))]);
        assert!(resolve_one(&all, "User", "friends").unwrap_err().is_configuration());
    }

    #[test]
    fn test_pivot_options_on_other_kinds() {
        let all = schemas(vec![
            EntitySchema::new("User", "users")
                .relation("posts", RelationDef::one_to_many("Post").with_timestamps()),
            EntitySchema::new("Post", "posts"),
        ]);
        assert!(resolve_one(&all, "User", "posts").unwrap_err().is_configuration());
    }

    #[test]
    fn test_unknown_related_schema() {
        let all = schemas(vec![EntitySchema::new("User", "users")
            .relation("posts", RelationDef::one_to_many("Missing"))]);
        let err = resolve_one(&all, "User", "posts").unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_indirect_requires_through() {
        let all = schemas(vec![
            EntitySchema::new("Country", "countries")
                .relation("posts", RelationDef::indirect("User", "articles")),
            EntitySchema::new("User", "users").relation("posts", RelationDef::one_to_many("Post")),
            EntitySchema::new("Post", "posts"),
        ]);
        let err = resolve_one(&all, "Country", "posts").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("User.articles"));
    }
}
