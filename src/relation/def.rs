//! RelationDef struct for declaring associations
//!
//! A `RelationDef` is the declaration of one association as written on an
//! entity schema: the kind, the related schema and whichever keys the caller
//! chose to spell out. Omitted keys are filled in by
//! [`resolve`](crate::relation::keys::resolve) when the registry is built.

use crate::relation::types::RelationType;

/// Declares a relationship from an owning schema to a related schema
///
/// Constructors mirror the declaration surface (`one_to_one`, `one_to_many`,
/// `inverse_one_to_one`, `many_to_many`, `indirect`); optional keys and pivot
/// settings are chained on by value.
///
/// # Example
///
/// ```
/// use lifeguard_relations::{EntitySchema, RelationDef};
///
/// let user = EntitySchema::new("User", "users")
///     .relation("posts", RelationDef::one_to_many("Post"))
///     .relation("profile", RelationDef::one_to_one("Profile").foreign_key("owner_id"))
///     .relation(
///         "skills",
///         RelationDef::many_to_many("Skill")
///             .with_pivot(["proficiency"])
///             .with_timestamps(),
///     );
///
/// assert_eq!(user.relations().count(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Kind of relationship
    pub rel_type: RelationType,
    /// Name of the related schema (for `Indirect`, the intermediate schema)
    pub related: String,
    /// Key on the owner side
    pub local_key: Option<String>,
    /// Key on the related side (for `ManyToMany`, the pivot column referencing the owner)
    pub foreign_key: Option<String>,
    /// Pivot column referencing the related schema (`ManyToMany` only)
    pub related_foreign_key: Option<String>,
    /// Related schema column referenced by the pivot (`ManyToMany` only)
    pub related_key: Option<String>,
    /// Explicit pivot table name (`ManyToMany` only)
    pub pivot_table: Option<String>,
    /// Extra pivot columns fetched alongside the foreign keys
    pub pivot_fields: Vec<String>,
    /// Populate pivot `created_at`/`updated_at` on attach
    pub pivot_timestamps: bool,
    /// Schema that owns pivot rows (table name and timestamps)
    pub pivot_model: Option<String>,
    /// Relation on the intermediate schema (`Indirect` only)
    pub through: Option<String>,
}

impl RelationDef {
    fn new(rel_type: RelationType, related: impl Into<String>) -> Self {
        Self {
            rel_type,
            related: related.into(),
            local_key: None,
            foreign_key: None,
            related_foreign_key: None,
            related_key: None,
            pivot_table: None,
            pivot_fields: Vec::new(),
            pivot_timestamps: false,
            pivot_model: None,
            through: None,
        }
    }

    /// One-to-one: `related.foreign_key = owner.local_key`
    pub fn one_to_one(related: impl Into<String>) -> Self {
        Self::new(RelationType::OneToOne, related)
    }

    /// One-to-many: `related.foreign_key = owner.local_key`
    pub fn one_to_many(related: impl Into<String>) -> Self {
        Self::new(RelationType::OneToMany, related)
    }

    /// Inverse one-to-one (`belongs_to`): `owner.local_key = related.foreign_key`
    pub fn inverse_one_to_one(related: impl Into<String>) -> Self {
        Self::new(RelationType::InverseOneToOne, related)
    }

    /// Many-to-many through a pivot table
    pub fn many_to_many(related: impl Into<String>) -> Self {
        Self::new(RelationType::ManyToMany, related)
    }

    /// Indirect association through `through` on the intermediate schema
    ///
    /// The owner reaches the intermediate schema the way a one-to-many does
    /// (`intermediate.foreign_key = owner.local_key`), then follows the
    /// intermediate schema's own `through` relation.
    ///
    /// ```
    /// use lifeguard_relations::RelationDef;
    ///
    /// // Country -> users -> posts
    /// let def = RelationDef::indirect("User", "posts");
    /// assert_eq!(def.through.as_deref(), Some("posts"));
    /// ```
    pub fn indirect(intermediate: impl Into<String>, through: impl Into<String>) -> Self {
        let mut def = Self::new(RelationType::Indirect, intermediate);
        def.through = Some(through.into());
        def
    }

    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn related_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.related_foreign_key = Some(key.into());
        self
    }

    pub fn related_key(mut self, key: impl Into<String>) -> Self {
        self.related_key = Some(key.into());
        self
    }

    /// Override the derived pivot table name
    pub fn pivot_table(mut self, table: impl Into<String>) -> Self {
        self.pivot_table = Some(table.into());
        self
    }

    /// Fetch extra pivot columns with the related rows
    pub fn with_pivot<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.pivot_fields.contains(&field) {
                self.pivot_fields.push(field);
            }
        }
        self
    }

    /// Populate pivot timestamps on attach
    pub fn with_timestamps(mut self) -> Self {
        self.pivot_timestamps = true;
        self
    }

    /// Delegate pivot rows to a full entity schema
    ///
    /// Mutually exclusive with [`pivot_table`](Self::pivot_table) and
    /// [`with_timestamps`](Self::with_timestamps); combining them is reported
    /// when the registry is built.
    pub fn pivot_model(mut self, schema: impl Into<String>) -> Self {
        self.pivot_model = Some(schema.into());
        self
    }
}
