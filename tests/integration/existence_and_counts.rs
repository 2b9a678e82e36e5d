use crate::common::{ids, registry, store};
use lifeguard_relations::memory::MemoryStore;
use serde_json::{json, Value};

/// Posts 1..=5 with 0, 1, 2, 3 and 5 comments
fn seeded() -> MemoryStore {
    let store = store();
    store
        .seed("posts", json!([{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}, {"id": 5}]))
        .unwrap();
    let mut comments = Vec::new();
    for (post, count) in [(1, 0), (2, 1), (3, 2), (4, 3), (5, 5)] {
        for n in 0..count {
            comments.push(json!({"post_id": post, "approved": n % 2 == 0}));
        }
    }
    store.seed("comments", Value::Array(comments)).unwrap();
    store.reset_counts();
    store
}

#[test]
fn test_has_with_count_comparison() {
    let registry = registry();
    let store = seeded();
    let posts = registry
        .query("Post")
        .unwrap()
        .has_count("comments", ">", 2)
        .all(&store)
        .unwrap();
    assert_eq!(ids(&posts), vec![4, 5]);
    assert_eq!(store.select_count(), 1);
}

#[test]
fn test_has_and_doesnt_have_partition_rows() {
    let registry = registry();
    let store = seeded();
    let with = registry.query("Post").unwrap().has("comments").all(&store).unwrap();
    let without = registry.query("Post").unwrap().doesnt_have("comments").all(&store).unwrap();
    assert_eq!(ids(&with), vec![2, 3, 4, 5]);
    assert_eq!(ids(&without), vec![1]);
}

#[test]
fn test_where_has_count_uses_constraint() {
    let registry = registry();
    let store = seeded();
    // approved comments per post: 0, 1, 1, 2, 3
    let posts = registry
        .query("Post")
        .unwrap()
        .where_has_count("comments", |q| q.where_eq("approved", true), ">=", 2)
        .all(&store)
        .unwrap();
    assert_eq!(ids(&posts), vec![4, 5]);
}

#[test]
fn test_or_has_disjoins_with_prior_filter() {
    let registry = registry();
    let store = seeded();
    let posts = registry
        .query("Post")
        .unwrap()
        .where_eq("id", 1)
        .or_has_count("comments", ">=", 5)
        .all(&store)
        .unwrap();
    assert_eq!(ids(&posts), vec![1, 5]);
}

#[test]
fn test_with_count_lands_in_meta() {
    let registry = registry();
    let store = seeded();
    let post = registry
        .query("Post")
        .unwrap()
        .where_eq("id", 4)
        .with_count("comments")
        .with_count_with("comments as approved_count", |q| q.where_eq("approved", true))
        .first_or_fail(&store)
        .unwrap();

    assert_eq!(post.count("comments_count"), Some(3));
    assert_eq!(post.count("approved_count"), Some(2));
    assert!(post.get("comments_count").is_null());

    let json = post.to_json();
    assert_eq!(json["__meta__"]["comments_count"], json!(3));
    assert_eq!(json["id"], json!(4));
    assert!(json.get("comments_count").is_none());
}

#[test]
fn test_with_count_of_four() {
    let registry = registry();
    let store = store();
    store.seed("posts", json!({"id": 1, "title": "four"})).unwrap();
    store
        .seed("comments", json!([{"post_id": 1}, {"post_id": 1}, {"post_id": 1}, {"post_id": 1}]))
        .unwrap();

    let posts = registry.query("Post").unwrap().with_count("comments").all(&store).unwrap();
    assert_eq!(posts[0].to_json()["__meta__"]["comments_count"], json!(4));
    assert_eq!(posts[0].get("title"), &json!("four"));
}

#[test]
fn test_with_count_keeps_real_column_of_same_name() {
    let registry = registry();
    let store = store();
    store.seed("posts", json!({"id": 1, "comments_count": 99})).unwrap();
    store
        .seed("comments", json!([{"post_id": 1}, {"post_id": 1}, {"post_id": 1}, {"post_id": 1}]))
        .unwrap();

    let post = registry
        .query("Post")
        .unwrap()
        .with_count("comments")
        .first_or_fail(&store)
        .unwrap();
    assert_eq!(post.get("comments_count"), &json!(99));
    assert_eq!(post.count("comments_count"), Some(4));
    assert_eq!(post.to_json()["__meta__"]["comments_count"], json!(4));
}
