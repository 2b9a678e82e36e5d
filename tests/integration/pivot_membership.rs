use crate::common::{registry, role_ids, row, store};
use lifeguard_relations::memory::{MemoryStore, StatementKind};
use lifeguard_relations::{LifeError, Model, SchemaRegistry};
use serde_json::json;

fn user(registry: &SchemaRegistry, store: &MemoryStore) -> Model {
    registry.create(store, "User", row(json!({"name": "ada"}))).unwrap()
}

#[test]
fn test_attach_then_detach() {
    let registry = registry();
    let store = store();
    let user = user(&registry, &store);
    let roles = registry.related(&user, "roles").unwrap().pivot().unwrap();

    let attached = roles.attach(&store, [5, 7]).unwrap();
    assert_eq!(attached.attached, vec![json!(5), json!(7)]);
    assert_eq!(roles.detach(&store, [5]).unwrap(), 1);
    assert_eq!(role_ids(&store, 1), vec![7]);
}

#[test]
fn test_attach_existing_pair_is_constraint_violation() {
    let registry = registry();
    let store = store();
    let user = user(&registry, &store);
    let roles = registry.related(&user, "roles").unwrap().pivot().unwrap();

    roles.attach(&store, [1]).unwrap();
    let err = roles.attach(&store, [2, 1]).unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(role_ids(&store, 1), vec![1]);
}

#[test]
fn test_sync_replaces_membership_idempotently() {
    let registry = registry();
    let store = store();
    let user = user(&registry, &store);
    let roles = registry.related(&user, "roles").unwrap().pivot().unwrap();

    roles.sync(&store, [1, 2, 3]).unwrap();
    assert_eq!(role_ids(&store, 1), vec![1, 2, 3]);

    let changes = roles.sync(&store, [2]).unwrap();
    assert_eq!(changes.detached.len(), 2);
    assert_eq!(role_ids(&store, 1), vec![2]);

    let again = roles.sync(&store, [2]).unwrap();
    assert!(again.is_empty());
    assert_eq!(role_ids(&store, 1), vec![2]);
}

#[test]
fn test_failed_sync_leaves_membership_unchanged() {
    let registry = registry();
    let store = store();
    let user = user(&registry, &store);
    let roles = registry.related(&user, "roles").unwrap().pivot().unwrap();
    roles.attach(&store, [1, 2]).unwrap();

    store.fail_next(
        StatementKind::Insert,
        "role_user",
        LifeError::QueryExecution("connection lost".to_string()),
    );
    let err = roles.sync(&store, [2, 3]).unwrap_err();

    assert_eq!(err, LifeError::QueryExecution("connection lost".to_string()));
    assert_eq!(role_ids(&store, 1), vec![1, 2]);
}

#[test]
fn test_memberships_are_scoped_to_owner() {
    let registry = registry();
    let store = store();
    let ada = user(&registry, &store);
    let bob = user(&registry, &store);
    registry.related(&ada, "roles").unwrap().pivot().unwrap().attach(&store, [1, 2]).unwrap();
    registry.related(&bob, "roles").unwrap().pivot().unwrap().attach(&store, [1]).unwrap();

    registry.related(&ada, "roles").unwrap().pivot().unwrap().detach_all(&store).unwrap();

    assert!(role_ids(&store, 1).is_empty());
    assert_eq!(role_ids(&store, 2), vec![1]);
}

#[test]
fn test_pivot_filters_on_relation_query() {
    let registry = registry();
    let store = store();
    store.seed("roles", json!([{"id": 1, "name": "admin"}, {"id": 2, "name": "editor"}])).unwrap();
    let user = user(&registry, &store);
    let roles = registry.related(&user, "roles").unwrap();
    roles
        .pivot()
        .unwrap()
        .attach_with(&store, [1, 2], |pivot| {
            let granted_by = if pivot["role_id"] == json!(1) { "root" } else { "ada" };
            pivot.insert("granted_by".to_string(), json!(granted_by));
        })
        .unwrap();

    let granted = roles.query().where_pivot("granted_by", "=", "root").all(&store).unwrap();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].get("name"), &json!("admin"));
    assert_eq!(granted[0].pivot().unwrap()["granted_by"], json!("root"));
}
