use crate::common::{ids, registry, registry_with, row, store};
use lifeguard_relations::memory::StatementKind;
use lifeguard_relations::{CancellationToken, LifeError, Related, RelationsConfig};
use serde_json::{json, Value};

#[test]
fn test_query_count_is_independent_of_parent_count() {
    let registry = registry();
    let store = store();
    store
        .seed("users", Value::Array((1..=1000).map(|id| json!({"id": id})).collect()))
        .unwrap();
    store
        .seed("posts", Value::Array((1..=1000).map(|id| json!({"user_id": id})).collect()))
        .unwrap();

    let users = registry.query("User").unwrap().preload("posts").all(&store).unwrap();

    assert_eq!(users.len(), 1000);
    assert_eq!(store.select_count(), 2);
    assert!(users.iter().all(|u| u.related_many("posts").len() == 1));
}

#[test]
fn test_nested_constraint_applies_to_last_segment_only() {
    let registry = registry();
    let store = store();
    store.seed("users", json!({"id": 1})).unwrap();
    store
        .seed(
            "posts",
            json!([
                {"id": 1, "user_id": 1, "title": "busy"},
                {"id": 2, "user_id": 1, "title": "quiet"}
            ]),
        )
        .unwrap();
    store
        .seed(
            "comments",
            json!([
                {"post_id": 1, "approved": true},
                {"post_id": 1, "approved": true},
                {"post_id": 1, "approved": true},
                {"post_id": 1, "approved": false},
                {"post_id": 2, "approved": false}
            ]),
        )
        .unwrap();

    let users = registry
        .query("User")
        .unwrap()
        .preload_with("posts.comments", |q| q.where_eq("approved", true))
        .all(&store)
        .unwrap();

    let posts = users[0].related_many("posts");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].get("title"), &json!("busy"));
    assert_eq!(posts[1].get("title"), &json!("quiet"));
    assert_eq!(posts[0].related_many("comments").len(), 3);
    assert!(posts[1].related_many("comments").is_empty());
    assert!(posts[0]
        .related_many("comments")
        .iter()
        .all(|c| c.get("approved") == &json!(true)));
    assert_eq!(store.select_count(), 3);
}

#[test]
fn test_intermediate_segment_constrained_from_its_own_closure() {
    let registry = registry();
    let store = store();
    store.seed("users", json!({"id": 1})).unwrap();
    store
        .seed("posts", json!([{"id": 1, "user_id": 1, "published": true}, {"id": 2, "user_id": 1, "published": false}]))
        .unwrap();
    store
        .seed("comments", json!([{"post_id": 1, "approved": true}, {"post_id": 1, "approved": false}]))
        .unwrap();

    let users = registry
        .query("User")
        .unwrap()
        .preload_with("posts", |q| {
            q.where_eq("published", true)
                .preload_with("comments", |c| c.where_eq("approved", true))
        })
        .all(&store)
        .unwrap();

    let posts = users[0].related_many("posts");
    assert_eq!(ids(posts), vec![1]);
    assert_eq!(posts[0].related_many("comments").len(), 1);
}

#[test]
fn test_indirect_relation_returns_unique_union() {
    let registry = registry();
    let store = store();
    store.seed("countries", json!([{"id": 1}, {"id": 2}])).unwrap();
    store
        .seed(
            "users",
            json!([{"id": 1, "country_id": 1}, {"id": 2, "country_id": 1}, {"id": 3, "country_id": 2}]),
        )
        .unwrap();
    store
        .seed(
            "posts",
            json!([
                {"id": 1, "user_id": 1},
                {"id": 2, "user_id": 1},
                {"id": 3, "user_id": 2},
                {"id": 4, "user_id": 3}
            ]),
        )
        .unwrap();

    let country = registry.query("Country").unwrap().where_eq("id", 1).first_or_fail(&store).unwrap();
    let posts = registry.related(&country, "posts").unwrap().fetch(&store).unwrap();
    let mut fetched: Vec<i64> = posts.models().iter().filter_map(|p| p.key().as_i64()).collect();
    fetched.sort_unstable();
    assert_eq!(fetched, vec![1, 2, 3]);

    store.reset_counts();
    let countries = registry.query("Country").unwrap().preload("posts").all(&store).unwrap();
    assert_eq!(countries[0].related_many("posts").len(), 3);
    assert_eq!(ids(countries[1].related_many("posts")), vec![4]);
    // base query, intermediate users, posts
    assert_eq!(store.select_count(), 3);
}

#[test]
fn test_unknown_path_fails_before_any_query() {
    let registry = registry();
    let store = store();
    store.seed("users", json!({"id": 1})).unwrap();

    let err = registry
        .query("User")
        .unwrap()
        .preload("posts.reactions")
        .all(&store)
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(err.to_string().contains("reactions"));
    assert_eq!(store.statement_count(), 0);
}

#[test]
fn test_zero_parents_issue_no_relation_queries() {
    let registry = registry();
    let store = store();
    let users = registry
        .query("User")
        .unwrap()
        .preload("posts.comments")
        .preload("roles")
        .all(&store)
        .unwrap();
    assert!(users.is_empty());
    assert_eq!(store.select_count(), 1);
}

#[test]
fn test_concurrent_siblings_load_every_relation() {
    let registry = registry_with(RelationsConfig {
        concurrent_siblings: true,
        ..RelationsConfig::default()
    });
    let store = store();
    store.seed("users", json!([{"id": 1}, {"id": 2}])).unwrap();
    store.seed("posts", json!([{"user_id": 1}, {"user_id": 2}, {"user_id": 2}])).unwrap();
    store.seed("profiles", json!({"user_id": 1})).unwrap();
    store.seed("roles", json!({"id": 1, "name": "admin"})).unwrap();
    store.seed("role_user", json!({"user_id": 2, "role_id": 1, "granted_by": "root"})).unwrap();

    let users = registry
        .query("User")
        .unwrap()
        .preload("posts")
        .preload("profile")
        .preload("roles")
        .all(&store)
        .unwrap();

    assert_eq!(store.select_count(), 4);
    assert_eq!(users[1].related_many("posts").len(), 2);
    assert!(users[0].related_one("profile").is_some());
    assert!(matches!(users[1].related("profile"), Some(Related::One(None))));
    assert_eq!(users[1].related_many("roles")[0].pivot().unwrap()["granted_by"], json!("root"));
}

#[test]
fn test_failed_node_returns_no_partial_result() {
    let registry = registry();
    let store = store();
    store.seed("users", json!({"id": 1})).unwrap();
    store.seed("posts", json!({"id": 1, "user_id": 1})).unwrap();
    store.fail_next(
        StatementKind::Select,
        "comments",
        LifeError::QueryExecution("timeout".to_string()),
    );

    let err = registry
        .query("User")
        .unwrap()
        .preload("posts.comments")
        .all(&store)
        .unwrap_err();

    assert_eq!(err, LifeError::QueryExecution("timeout".to_string()));
}

#[test]
fn test_cancelled_lazy_load_issues_nothing() {
    let registry = registry();
    let store = store();
    store.seed("users", json!({"id": 1})).unwrap();
    let mut users = registry.query("User").unwrap().all(&store).unwrap();
    store.reset_counts();

    let token = CancellationToken::new();
    token.cancel();
    let err = registry
        .lazy(&store)
        .with_cancellation(token)
        .load(&mut users, "posts")
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(store.statement_count(), 0);
    assert!(users[0].related("posts").is_none());
}

#[test]
fn test_lazy_load_matches_preload() {
    let registry = registry();
    let store = store();
    store.seed("users", json!([{"id": 1}, {"id": 2}])).unwrap();
    store.seed("posts", json!([{"id": 1, "user_id": 2}, {"id": 2, "user_id": 2}])).unwrap();
    store.seed("comments", json!({"post_id": 2})).unwrap();

    let preloaded = registry.query("User").unwrap().preload("posts.comments").all(&store).unwrap();
    let mut lazy = registry.query("User").unwrap().all(&store).unwrap();
    registry.lazy(&store).load(&mut lazy, "posts.comments").unwrap();

    assert_eq!(preloaded, lazy);
}

#[test]
fn test_serialization_contract() {
    let registry = registry();
    let store = store();
    let user = registry.create(&store, "User", row(json!({"name": "ada"}))).unwrap();
    registry
        .related(&user, "posts")
        .unwrap()
        .create(&store, row(json!({"title": "hello"})))
        .unwrap();

    let users = registry.query("User").unwrap().preload("posts").all(&store).unwrap();
    let json = users[0].to_json();
    assert_eq!(json["name"], json!("ada"));
    assert_eq!(json["posts"][0]["title"], json!("hello"));
    assert!(json.get("__meta__").is_none());
}
