use lifeguard_relations::memory::MemoryStore;
use lifeguard_relations::{EntitySchema, RelationDef, RelationsConfig, Row, SchemaRegistry};
use serde_json::{json, Value};

// ============================================================================
// Test Schemas
// ============================================================================
//
// Country has_many User; Country -> User -> Post (indirect)
// User has_many Post, has_one Profile, many_to_many Role (pivot `role_user`)
// Post has_many Comment, belongs_to User (`author`)

pub fn registry() -> SchemaRegistry {
    registry_with(RelationsConfig::default())
}

pub fn registry_with(config: RelationsConfig) -> SchemaRegistry {
    SchemaRegistry::builder()
        .config(config)
        .schema(
            EntitySchema::new("Country", "countries")
                .relation("users", RelationDef::one_to_many("User"))
                .relation("posts", RelationDef::indirect("User", "posts")),
        )
        .schema(
            EntitySchema::new("User", "users")
                .relation("posts", RelationDef::one_to_many("Post"))
                .relation("profile", RelationDef::one_to_one("Profile"))
                .relation("roles", RelationDef::many_to_many("Role").with_pivot(["granted_by"])),
        )
        .schema(
            EntitySchema::new("Post", "posts")
                .relation("comments", RelationDef::one_to_many("Comment"))
                .relation("author", RelationDef::inverse_one_to_one("User")),
        )
        .schema(EntitySchema::new("Comment", "comments"))
        .schema(EntitySchema::new("Profile", "profiles"))
        .schema(EntitySchema::new("Role", "roles"))
        .build()
        .expect("test schemas are valid")
}

pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    for table in ["countries", "users", "posts", "comments", "profiles", "roles"] {
        store.create_table(table, Some("id"));
    }
    store.create_table("role_user", None);
    store
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("fixture row is an object")
}

/// Related ids of `user_id`'s memberships in `role_user`, sorted
pub fn role_ids(store: &MemoryStore, user_id: i64) -> Vec<i64> {
    let mut ids: Vec<i64> = store
        .rows("role_user")
        .iter()
        .filter(|r| r["user_id"] == json!(user_id))
        .filter_map(|r| r["role_id"].as_i64())
        .collect();
    ids.sort_unstable();
    ids
}

pub fn ids(models: &[lifeguard_relations::Model]) -> Vec<i64> {
    models.iter().filter_map(|m| m.key().as_i64()).collect()
}
