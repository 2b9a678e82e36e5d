use crate::common::{registry, role_ids, row, store};
use lifeguard_relations::Related;
use serde_json::json;

#[test]
fn test_created_children_are_preloadable() {
    let registry = registry();
    let store = store();
    let user = registry.create(&store, "User", row(json!({"name": "ada"}))).unwrap();
    let posts = registry.related(&user, "posts").unwrap();

    posts
        .create_many(&store, vec![row(json!({"title": "one"})), row(json!({"title": "two"}))])
        .unwrap();
    registry
        .related(&user, "profile")
        .unwrap()
        .create(&store, row(json!({"bio": "math"})))
        .unwrap();

    let fetched = posts.fetch(&store).unwrap();
    assert_eq!(fetched.len(), 2);

    let users = registry.query("User").unwrap().preload("profile").all(&store).unwrap();
    assert_eq!(users[0].related_one("profile").unwrap().get("bio"), &json!("math"));
}

#[test]
fn test_many_to_many_save_attaches_once() {
    let registry = registry();
    let store = store();
    let user = registry.create(&store, "User", row(json!({"name": "ada"}))).unwrap();
    let roles = registry.related(&user, "roles").unwrap();

    let mut admin = registry.model("Role", row(json!({"name": "admin"}))).unwrap();
    roles
        .save_with(&store, &mut admin, |pivot| {
            pivot.insert("granted_by".to_string(), json!("root"));
        })
        .unwrap();
    roles.save(&store, &mut admin).unwrap();

    assert_eq!(role_ids(&store, 1), vec![1]);
    let fetched = roles.fetch(&store).unwrap();
    assert_eq!(fetched.first().unwrap().pivot().unwrap()["granted_by"], json!("root"));
}

#[test]
fn test_associate_sets_owner_key_only() {
    let registry = registry();
    let store = store();
    let user = registry.create(&store, "User", row(json!({"name": "ada"}))).unwrap();
    let mut post = registry.create(&store, "Post", row(json!({"title": "draft"}))).unwrap();
    let author = registry.related(&post, "author").unwrap();

    author.associate(&store, &mut post, &user).unwrap();
    let fetched = registry.related(&post, "author").unwrap().fetch(&store).unwrap();
    assert_eq!(fetched.first().unwrap().get("name"), &json!("ada"));

    author.dissociate(&store, &mut post).unwrap();
    let fetched = registry.related(&post, "author").unwrap().fetch(&store).unwrap();
    assert!(matches!(fetched, Related::One(None)));
    assert_eq!(store.rows("users").len(), 1);
}

#[test]
fn test_associate_rejected_on_to_many() {
    let registry = registry();
    let store = store();
    let mut user = registry.create(&store, "User", row(json!({"name": "ada"}))).unwrap();
    let post = registry.create(&store, "Post", row(json!({"title": "x"}))).unwrap();
    let err = registry
        .related(&user, "posts")
        .unwrap()
        .associate(&store, &mut user, &post)
        .unwrap_err();
    assert!(err.is_configuration());
}
