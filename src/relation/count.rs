//! Relation counts.
//!
//! `with_count("comments")` appends a correlated `COUNT(*)` subquery to the
//! select list. The count lands in the model's metadata bucket under
//! `comments_count`, or under a custom alias written as
//! `"comments as approved_count"`.

use crate::relation::query::{Constraint, ModelQuery};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static ALIASED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)^\s*([^\s]+)\s+as\s+([^\s]+)\s*$").ok());

/// Split `"relation as alias"` into its parts; the default alias is `relation_count`
///
/// ```
/// use lifeguard_relations::relation::count::parse_count_name;
///
/// assert_eq!(parse_count_name("comments"), ("comments".to_string(), "comments_count".to_string()));
/// assert_eq!(parse_count_name("comments AS total"), ("comments".to_string(), "total".to_string()));
/// ```
pub fn parse_count_name(name: &str) -> (String, String) {
    let captures = ALIASED.as_ref().and_then(|re| re.captures(name));
    match captures {
        Some(captures) => (captures[1].to_string(), captures[2].to_string()),
        None => {
            let relation = name.trim().to_string();
            let alias = format!("{relation}_count");
            (relation, alias)
        }
    }
}

impl ModelQuery {
    fn count_relation(mut self, name: &str, constraint: Option<Constraint>) -> Self {
        let (relation, alias) = parse_count_name(name);
        match self.related_subquery(&relation, constraint.as_ref()) {
            Ok(subquery) => {
                log::debug!("{}: counting {relation} as {alias}", self.schema().name);
                self.push_count(alias, subquery);
            }
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Attach the number of related rows to every fetched model
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
    ///     .schema(EntitySchema::new("Post", "posts").relation("comments", RelationDef::one_to_many("Comment")))
    ///     .schema(EntitySchema::new("Comment", "comments"))
    ///     .build()?;
    /// let store = MemoryStore::new();
    /// store.create_table("posts", Some("id"));
    /// store.create_table("comments", Some("id"));
    /// store.seed("posts", json!({"id": 1}))?;
    /// store.seed("comments", json!([{"post_id": 1}, {"post_id": 1}]))?;
    ///
    /// let post = registry.query("Post")?.with_count("comments").first_or_fail(&store)?;
    /// assert_eq!(post.count("comments_count"), Some(2));
    /// assert_eq!(post.to_json()["__meta__"], json!({"comments_count": 2}));
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_count(self, name: &str) -> Self {
        self.count_relation(name, None)
    }

    /// Attach the number of related rows matching `constraint`
    pub fn with_count_with<F>(self, name: &str, constraint: F) -> Self
    where
        F: Fn(ModelQuery) -> ModelQuery + Send + Sync + 'static,
    {
        self.count_relation(name, Some(Arc::new(constraint)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::relation::def::RelationDef;
    use crate::schema::{EntitySchema, SchemaRegistry};
    use serde_json::json;

    fn fixture() -> (SchemaRegistry, MemoryStore) {
        let registry = SchemaRegistry::builder()
            .schema(
                EntitySchema::new("Post", "posts")
                    .relation("comments", RelationDef::one_to_many("Comment"))
                    .relation("tags", RelationDef::many_to_many("Tag")),
            )
            .schema(EntitySchema::new("Comment", "comments"))
            .schema(EntitySchema::new("Tag", "tags"))
            .build()
            .unwrap();
        let store = MemoryStore::new();
        for table in ["posts", "comments", "tags"] {
            store.create_table(table, Some("id"));
        }
        store.create_table("post_tag", None);
        store.seed("posts", json!([{"id": 1}, {"id": 2}])).unwrap();
        store
            .seed(
                "comments",
                json!([
                    {"post_id": 1, "approved": true},
                    {"post_id": 1, "approved": false},
                    {"post_id": 1, "approved": true},
                    {"post_id": 1, "approved": true}
                ]),
            )
            .unwrap();
        store.seed("tags", json!([{"id": 7}, {"id": 8}])).unwrap();
        store
            .seed("post_tag", json!([{"post_id": 2, "tag_id": 7}, {"post_id": 2, "tag_id": 8}]))
            .unwrap();
        (registry, store)
    }

    #[test]
    fn test_alias_parsing() {
        assert_eq!(
            parse_count_name("  comments   as   approved_count "),
            ("comments".to_string(), "approved_count".to_string())
        );
        assert_eq!(parse_count_name("tags"), ("tags".to_string(), "tags_count".to_string()));
    }

    #[test]
    fn test_counts_land_in_meta() {
        let (registry, store) = fixture();
        let posts = registry
            .query("Post")
            .unwrap()
            .with_count("comments")
            .with_count("tags as tag_total")
            .all(&store)
            .unwrap();
        assert_eq!(posts[0].count("comments_count"), Some(4));
        assert_eq!(posts[0].count("tag_total"), Some(0));
        assert_eq!(posts[1].count("comments_count"), Some(0));
        assert_eq!(posts[1].count("tag_total"), Some(2));
        assert!(posts[0].get("comments_count").is_null());
    }

    #[test]
    fn test_count_leaves_same_named_column_alone() {
        let (registry, store) = fixture();
        store.seed("posts", json!({"id": 3, "comments_count": 99, "tag_total": "x"})).unwrap();
        store.seed("comments", json!([{"post_id": 3}, {"post_id": 3}])).unwrap();
        let post = registry
            .query("Post")
            .unwrap()
            .where_eq("id", 3)
            .with_count("comments")
            .with_count("tags as tag_total")
            .first_or_fail(&store)
            .unwrap();
        assert_eq!(post.get("comments_count"), &json!(99));
        assert_eq!(post.get("tag_total"), &json!("x"));
        assert_eq!(post.count("comments_count"), Some(2));
        assert_eq!(post.count("tag_total"), Some(0));
    }

    #[test]
    fn test_constrained_count() {
        let (registry, store) = fixture();
        let post = registry
            .query("Post")
            .unwrap()
            .with_count_with("comments as approved", |q| q.where_eq("approved", true))
            .first_or_fail(&store)
            .unwrap();
        assert_eq!(post.count("approved"), Some(3));
    }
}
