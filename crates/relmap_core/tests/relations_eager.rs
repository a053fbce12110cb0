use relmap_core::db::{open_db_in_memory, Backend, SqliteBackend};
use relmap_core::model::{
    Catalog, Collection, FetchParams, Model, ModelError, ModelSpec, RecordStatus, RelatedValue,
    RelationSpec,
};
use relmap_core::schema::{ColumnSpec, ColumnType, TableSpec};
use relmap_core::{CoreConfig, Row, SaveOutcome, Value};
use std::rc::Rc;

struct Fixture {
    backend: Rc<SqliteBackend>,
    catalog: Catalog,
}

impl Fixture {
    fn model(&self, name: &str) -> Rc<Model> {
        self.catalog.model(name).unwrap()
    }

    fn insert(&self, model: &str, row: Row) {
        self.model(model).table().insert(row).unwrap();
    }

    fn count(&self, model: &str) -> u64 {
        self.model(model)
            .count_pages(&FetchParams::new())
            .unwrap()
            .count
    }
}

fn varchar(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnType::Varchar).size(40)
}

fn int(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnType::Int)
}

fn fixture() -> Fixture {
    let backend = Rc::new(open_db_in_memory().unwrap());
    let shared: Rc<dyn Backend> = backend.clone();
    let catalog = Catalog::new(shared, CoreConfig::default());

    catalog
        .register(
            ModelSpec::new("User", TableSpec::new("users").col(varchar("name")))
                .relation(RelationSpec::has_many("posts", "Post"))
                .relation(RelationSpec::has_many("latest_posts", "Post").order("latest_posts.id DESC"))
                .relation(RelationSpec::has_one("profile", "Profile"))
                .relation(RelationSpec::has_one_or_null("maybe_profile", "Profile"))
                .relation(RelationSpec::has_many("ghosts", "Ghost")),
        )
        .unwrap();
    catalog
        .register(ModelSpec::new(
            "Profile",
            TableSpec::new("profiles").col(int("user_id")).col(varchar("bio")),
        ))
        .unwrap();
    catalog
        .register(
            ModelSpec::new(
                "Post",
                TableSpec::new("posts")
                    .col(int("user_id"))
                    .col(varchar("title"))
                    .with_paging(2),
            )
            .relation(RelationSpec::belongs_to("author", "User"))
            .relation(RelationSpec::has_many("comments", "Comment"))
            .relation(RelationSpec::has_many_through("tags", "Tag", "PostTag")),
        )
        .unwrap();
    catalog
        .register(ModelSpec::new(
            "Comment",
            TableSpec::new("comments").col(int("post_id")).col(varchar("body")),
        ))
        .unwrap();
    catalog
        .register(ModelSpec::new("Tag", TableSpec::new("tags").col(varchar("label"))))
        .unwrap();
    catalog
        .register(ModelSpec::new(
            "PostTag",
            TableSpec::new("post_tags").col(int("post_id")).col(int("tag_id")),
        ))
        .unwrap();

    let fixture = Fixture { backend, catalog };
    for name in ["ann", "bob", "cid"] {
        fixture.insert("User", Row::new().with("name", name));
    }
    for (user, title) in [(1, "a1"), (1, "a2"), (2, "b1"), (1, "a3")] {
        fixture.insert("Post", Row::new().with("user_id", user).with("title", title));
    }
    fixture.insert("Post", Row::new().with("title", "orphan"));
    for (post, body) in [(1, "nice"), (1, "meh"), (3, "first")] {
        fixture.insert("Comment", Row::new().with("post_id", post).with("body", body));
    }
    for label in ["rust", "sql"] {
        fixture.insert("Tag", Row::new().with("label", label));
    }
    for (post, tag) in [(1, 1), (1, 2), (3, 2)] {
        fixture.insert("PostTag", Row::new().with("post_id", post).with("tag_id", tag));
    }
    fixture.insert("Profile", Row::new().with("user_id", 1).with("bio", "writes"));
    fixture
}

fn titles(collection: &Collection) -> Vec<String> {
    collection
        .iter()
        .map(|record| record.raw("title").to_text())
        .collect()
}

#[test]
fn lazy_has_many_loads_once_on_first_touch() {
    let fixture = fixture();
    let mut user = fixture.model("User").fetch(1).unwrap().unwrap();
    assert!(user.loaded("posts").is_none());

    fixture.backend.clear_profile();
    let posts = user.related("posts").unwrap().as_collection().unwrap();
    assert_eq!(titles(posts), ["a1", "a2", "a3"]);
    assert_eq!(fixture.backend.profile_len(), 1);

    user.related("posts").unwrap();
    assert_eq!(fixture.backend.profile_len(), 1);
    assert!(user.loaded("posts").is_some());
}

#[test]
fn relation_order_addresses_the_relation_alias() {
    let fixture = fixture();
    let mut user = fixture.model("User").fetch(1).unwrap().unwrap();
    let latest = user.related("latest_posts").unwrap().as_collection().unwrap();
    assert_eq!(titles(latest), ["a3", "a2", "a1"]);
}

#[test]
fn lazy_belongs_to_and_missing_parent() {
    let fixture = fixture();
    let posts = fixture.model("Post");

    let mut post = posts.fetch(3).unwrap().unwrap();
    let author = post.related("author").unwrap().as_record().unwrap();
    assert_eq!(author.raw("name"), Value::from("bob"));
    assert_eq!(author.status(), RecordStatus::Clean);

    let mut orphan = posts.fetch(5).unwrap().unwrap();
    fixture.backend.clear_profile();
    assert!(matches!(orphan.related("author").unwrap(), RelatedValue::One(None)));
    assert_eq!(fixture.backend.profile_len(), 0);
}

#[test]
fn has_one_placeholder_versus_has_one_or_null() {
    let fixture = fixture();
    let users = fixture.model("User");

    let mut ann = users.fetch(1).unwrap().unwrap();
    let profile = ann.related("profile").unwrap().as_record().unwrap();
    assert_eq!(profile.raw("bio"), Value::from("writes"));

    let mut bob = users.fetch(2).unwrap().unwrap();
    let placeholder = bob.related("profile").unwrap().as_record().unwrap();
    assert_eq!(placeholder.status(), RecordStatus::New);
    assert_eq!(placeholder.raw("user_id"), Value::Integer(2));
    assert!(matches!(
        bob.related("maybe_profile").unwrap(),
        RelatedValue::One(None)
    ));
}

#[test]
fn materialized_has_one_placeholder_is_saved_with_parent() {
    let fixture = fixture();
    let mut bob = fixture.model("User").fetch(2).unwrap().unwrap();
    bob.related_mut("profile")
        .unwrap()
        .as_record_mut()
        .unwrap()
        .set("bio", "quiet")
        .unwrap();
    bob.save().unwrap();

    assert_eq!(fixture.count("Profile"), 2);
    let mut again = fixture.model("User").fetch(2).unwrap().unwrap();
    let profile = again.related("profile").unwrap().as_record().unwrap();
    assert_eq!(profile.raw("bio"), Value::from("quiet"));
}

#[test]
fn eager_missing_has_one_stays_clean_until_written() {
    let fixture = fixture();
    let mut users = fixture
        .model("User")
        .fetch_all(&FetchParams::new().eager("profile").order("users.id"))
        .unwrap();

    let placeholder = users.get(1).unwrap().loaded("profile").unwrap();
    assert_eq!(placeholder.as_record().unwrap().status(), RecordStatus::Clean);
    fixture.backend.clear_profile();
    for user in users.iter_mut() {
        assert_eq!(user.save().unwrap(), SaveOutcome::Unchanged);
    }
    assert_eq!(fixture.backend.profile_len(), 0);
    assert_eq!(fixture.count("Profile"), 1);

    let cid = users.get_mut(2).unwrap();
    cid.related_mut("profile")
        .unwrap()
        .as_record_mut()
        .unwrap()
        .set("bio", "late")
        .unwrap();
    cid.save().unwrap();
    assert_eq!(fixture.count("Profile"), 2);
    let stored = fixture
        .model("Profile")
        .fetch_one(&FetchParams::new().cond("profiles.user_id = 3"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.raw("bio"), Value::from("late"));
}

#[test]
fn lazy_has_many_through_reads_pivot() {
    let fixture = fixture();
    let mut post = fixture.model("Post").fetch(1).unwrap().unwrap();
    let tags = post.related("tags").unwrap().as_collection().unwrap();
    let labels = tags
        .iter()
        .map(|tag| tag.raw("label").to_text())
        .collect::<Vec<_>>();
    assert_eq!(labels, ["rust", "sql"]);
    assert!(!tags.get(0).unwrap().data().contains_key("_owner_key"));
}

#[test]
fn eager_has_many_runs_one_query_for_all_parents() {
    let fixture = fixture();
    fixture.backend.clear_profile();

    let users = fixture
        .model("User")
        .fetch_all(&FetchParams::new().order("users.id").eager("posts"))
        .unwrap();
    assert_eq!(fixture.backend.profile_len(), 2);

    let counts = users
        .iter()
        .map(|user| user.loaded("posts").unwrap().as_collection().unwrap().len())
        .collect::<Vec<_>>();
    assert_eq!(counts, [3, 1, 0]);
    assert_eq!(fixture.backend.profile_len(), 2);
}

#[test]
fn eager_has_many_through_groups_by_owner() {
    let fixture = fixture();
    fixture.backend.clear_profile();

    let posts = fixture
        .model("Post")
        .fetch_all(
            &FetchParams::new()
                .order("posts.id")
                .eager("tags")
                .eager("comments"),
        )
        .unwrap();
    assert_eq!(fixture.backend.profile_len(), 3);

    let tag_counts = posts
        .iter()
        .map(|post| post.loaded("tags").unwrap().as_collection().unwrap().len())
        .collect::<Vec<_>>();
    assert_eq!(tag_counts, [2, 0, 1, 0, 0]);

    let first_comments = posts.get(0).unwrap().loaded("comments").unwrap();
    assert_eq!(first_comments.as_collection().unwrap().len(), 2);
}

#[test]
fn eager_to_one_uses_a_join() {
    let fixture = fixture();
    fixture.backend.clear_profile();

    let posts = fixture
        .model("Post")
        .fetch_all(&FetchParams::new().order("posts.id").eager("author"))
        .unwrap();
    assert_eq!(fixture.backend.profile_len(), 1);
    assert!(fixture.backend.profile()[0].contains("LEFT JOIN users AS author"));

    let authors = posts
        .iter()
        .map(|post| {
            post.loaded("author")
                .unwrap()
                .as_record()
                .map(|author| author.raw("name").to_text())
        })
        .collect::<Vec<_>>();
    assert_eq!(
        authors,
        [
            Some("ann".to_string()),
            Some("ann".to_string()),
            Some("bob".to_string()),
            Some("ann".to_string()),
            None,
        ]
    );
    let first = posts.get(0).unwrap();
    assert_eq!(first.raw("id"), Value::Integer(1));
    assert_eq!(first.status(), RecordStatus::Clean);
}

#[test]
fn eager_conditions_can_target_the_joined_relation() {
    let fixture = fixture();
    let posts = fixture
        .model("Post")
        .fetch_all(
            &FetchParams::new()
                .eager("author")
                .cond("author.name = 'bob'"),
        )
        .unwrap();
    assert_eq!(titles(&posts), ["b1"]);
}

#[test]
fn to_array_never_loads_relations() {
    let fixture = fixture();
    let user = fixture.model("User").fetch(1).unwrap().unwrap();
    fixture.backend.clear_profile();

    let array = user.to_array();
    assert_eq!(fixture.backend.profile_len(), 0);
    assert_eq!(array["name"], "ann");
    assert_eq!(array["posts"], serde_json::json!([]));
    assert!(array["profile"].is_null());
}

#[test]
fn to_array_nests_loaded_relations() {
    let fixture = fixture();
    let users = fixture
        .model("User")
        .fetch_all(&FetchParams::new().order("users.id").eager("posts").key("name"))
        .unwrap();
    let array = users.to_array();
    assert_eq!(array["ann"]["posts"][0]["title"], "a1");
    assert_eq!(array["cid"]["posts"], serde_json::json!([]));
}

#[test]
fn related_children_get_the_parent_key_on_save() {
    let fixture = fixture();
    let users = fixture.model("User");
    let posts = fixture.model("Post");

    let mut user = users.fetch_new().unwrap();
    user.set("name", "dee").unwrap();
    let mut children = Collection::new(Rc::clone(&posts));
    for title in ["d1", "d2"] {
        let mut post = posts.fetch_new().unwrap();
        post.set("title", title).unwrap();
        children.push(post);
    }
    user.set_related("posts", RelatedValue::Many(children)).unwrap();
    user.save().unwrap();

    let id = user.primary_val();
    assert_eq!(id, Value::Integer(4));
    let saved = posts
        .fetch_all(&FetchParams::new().cond(format!("posts.user_id = {}", id.to_text())))
        .unwrap();
    assert_eq!(titles(&saved), ["d1", "d2"]);

    let loaded = user.loaded("posts").unwrap().as_collection().unwrap();
    assert!(loaded
        .iter()
        .all(|post| post.status() == RecordStatus::Inserted));
}

#[test]
fn related_page_slices_and_reports_pager() {
    let fixture = fixture();
    let mut user = fixture.model("User").fetch(1).unwrap().unwrap();
    user.related("posts").unwrap();
    assert_eq!(user.related_page("posts").unwrap(), 0);

    user.set_related_page("posts", 2).unwrap();
    assert!(user.loaded("posts").is_none());
    let page = user.related("posts").unwrap().as_collection().unwrap();
    assert_eq!(titles(page), ["a3"]);
    let pager = page.pager().unwrap();
    assert_eq!((pager.page, pager.count, pager.pages), (2, 3, 2));
}

#[test]
fn unknown_relations_and_models_are_errors() {
    let fixture = fixture();
    let mut user = fixture.model("User").fetch(1).unwrap().unwrap();
    assert!(matches!(
        user.related("nope"),
        Err(ModelError::UnknownRelation { .. })
    ));
    assert!(matches!(
        user.related("ghosts"),
        Err(ModelError::UnknownModel(_))
    ));
    assert!(matches!(
        fixture
            .model("User")
            .fetch_all(&FetchParams::new().eager("nope")),
        Err(ModelError::UnknownRelation { .. })
    ));
}
