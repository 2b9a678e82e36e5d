//! Relation kind definitions.

use std::fmt;

/// Kind of association between two entity schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one; the related row holds the foreign key
    OneToOne,
    /// One-to-many; the related rows hold the foreign key
    OneToMany,
    /// The foreign-key-holding side of a one-to-one/one-to-many (`belongs_to`)
    InverseOneToOne,
    /// Many-to-many through a pivot table
    ManyToMany,
    /// Composed through a relation of an intermediate schema
    Indirect,
}

impl RelationType {
    /// Whether a fetch yields at most one related entity
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationType::OneToOne | RelationType::InverseOneToOne)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationType::OneToOne => "one_to_one",
            RelationType::OneToMany => "one_to_many",
            RelationType::InverseOneToOne => "inverse_one_to_one",
            RelationType::ManyToMany => "many_to_many",
            RelationType::Indirect => "indirect",
        };
        f.write_str(name)
    }
}
