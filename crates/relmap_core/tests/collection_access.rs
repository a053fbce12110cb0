use relmap_core::db::{open_db_in_memory, Backend};
use relmap_core::model::{Catalog, Collection, FetchParams, Model, ModelError, ModelSpec, Pager};
use relmap_core::schema::{ColumnSpec, ColumnType, TableSpec};
use relmap_core::{CoreConfig, Row, Value};
use std::rc::Rc;

fn books(count: usize) -> (Catalog, Rc<Model>) {
    let backend: Rc<dyn Backend> = Rc::new(open_db_in_memory().unwrap());
    let catalog = Catalog::new(backend, CoreConfig::default());
    let model = catalog
        .register(ModelSpec::new(
            "Book",
            TableSpec::new("books")
                .col(ColumnSpec::new("title", ColumnType::Varchar).size(10).required())
                .col(ColumnSpec::new("isbn", ColumnType::Varchar).size(13))
                .with_paging(3),
        ))
        .unwrap();
    for index in 1..=count {
        model
            .table()
            .insert(
                Row::new()
                    .with("title", format!("book{index}"))
                    .with("isbn", format!("isbn-{index}")),
            )
            .unwrap();
    }
    (catalog, model)
}

fn ids(collection: &Collection) -> Vec<Value> {
    collection.iter().map(|record| record.primary_val()).collect()
}

#[test]
fn keyed_fetch_indexes_records_by_column() {
    let (_catalog, model) = books(3);
    let collection = model
        .fetch_assoc(&FetchParams::new().key("isbn").order("books.id"))
        .unwrap();

    assert_eq!(collection.keys().collect::<Vec<_>>(), ["isbn-1", "isbn-2", "isbn-3"]);
    let second = collection.get_by_key("isbn-2").unwrap();
    assert_eq!(second.raw("title"), Value::from("book2"));
    assert_eq!(collection.key_at(2), Some("isbn-3"));
    assert!(!collection.contains_key("isbn-9"));
}

#[test]
fn fetch_assoc_defaults_to_first_selected_column() {
    let (_catalog, model) = books(2);

    let by_title = model.fetch_assoc(&FetchParams::new()).unwrap();
    assert!(by_title.contains_key("book1"));

    let by_col = model
        .fetch_assoc(&FetchParams::new().cols(vec!["isbn", "title"]))
        .unwrap();
    assert!(by_col.contains_key("isbn-2"));
    assert!(by_col.get_by_key("isbn-2").unwrap().primary_val().is_null());
}

#[test]
fn removal_keeps_positions_and_keys_consistent() {
    let (_catalog, model) = books(4);
    let mut collection = model
        .fetch_all(&FetchParams::new().key("isbn").order("books.id"))
        .unwrap();

    let removed = collection.remove_by_key("isbn-2").unwrap();
    assert_eq!(removed.raw("title"), Value::from("book2"));
    assert_eq!(collection.len(), 3);
    assert_eq!(collection.key_at(1), Some("isbn-3"));
    assert_eq!(
        collection.get_by_key("isbn-4").unwrap().raw("title"),
        Value::from("book4")
    );

    collection.remove(0);
    assert!(!collection.contains_key("isbn-1"));
    assert_eq!(collection.get_by_key("isbn-3").unwrap().raw("id"), Value::Integer(3));
    assert!(collection.remove(10).is_none());
}

#[test]
fn set_by_key_replaces_in_place() {
    let (_catalog, model) = books(2);
    let mut collection = model
        .fetch_all(&FetchParams::new().key("isbn").order("books.id"))
        .unwrap();

    let mut replacement = model.fetch_new().unwrap();
    replacement.set("title", "fresh").unwrap();
    let previous = collection.set_by_key("isbn-1", replacement).unwrap();
    assert_eq!(previous.raw("title"), Value::from("book1"));
    assert_eq!(collection.len(), 2);
    assert_eq!(collection.get(0).unwrap().raw("title"), Value::from("fresh"));
    assert_eq!(collection.key_at(0), Some("isbn-1"));
}

#[test]
fn positional_set_appends_past_the_end() {
    let (_catalog, model) = books(1);
    let mut collection = model.fetch_all(&FetchParams::new()).unwrap();

    let mut extra = model.fetch_new().unwrap();
    extra.set("title", "extra").unwrap();
    assert!(collection.set(7, extra).is_none());
    assert_eq!(collection.len(), 2);
    assert_eq!(collection.get(1).unwrap().raw("title"), Value::from("extra"));

    let mut again = model.fetch_new().unwrap();
    again.set("title", "again").unwrap();
    let replaced = collection.set(1, again).unwrap();
    assert_eq!(replaced.raw("title"), Value::from("extra"));
    assert_eq!(collection.len(), 2);
}

#[test]
fn to_array_shape_follows_keying() {
    let (_catalog, model) = books(2);

    let keyed = model
        .fetch_all(&FetchParams::new().key("isbn"))
        .unwrap()
        .to_array();
    assert_eq!(keyed["isbn-1"]["title"], "book1");

    let mut mixed = model.fetch_all(&FetchParams::new().key("isbn")).unwrap();
    mixed.push(model.fetch_new().unwrap());
    assert!(mixed.to_array().is_array());

    let plain = model.fetch_all(&FetchParams::new().order("books.id")).unwrap();
    assert_eq!(plain.to_array()[1]["isbn"], "isbn-2");

    let empty = Collection::new(Rc::clone(&model));
    assert_eq!(empty.to_array(), serde_json::json!([]));
}

#[test]
fn save_reports_every_failed_member() {
    let (_catalog, model) = books(0);
    let mut collection = Collection::new(Rc::clone(&model));
    for title in ["short", "far too long title", "fine"] {
        let mut record = model.fetch_new().unwrap();
        record.set("title", title).unwrap();
        collection.push(record);
    }

    let err = collection.save().unwrap_err();
    match err {
        ModelError::Collection { saved, failures } => {
            assert_eq!(saved, 2);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 1);
            assert!(matches!(failures[0].1, ModelError::Validation(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(model.count_pages(&FetchParams::new()).unwrap().count, 2);
    assert!(!collection.get(1).unwrap().get_invalid("title").is_empty());
}

#[test]
fn save_counts_unchanged_members() {
    let (_catalog, model) = books(2);
    let mut collection = model.fetch_all(&FetchParams::new()).unwrap();
    collection.get_mut(0).unwrap().set("title", "renamed").unwrap();
    assert_eq!(collection.save().unwrap(), 2);

    let renamed = model.fetch(1).unwrap().unwrap();
    assert_eq!(renamed.raw("title"), Value::from("renamed"));
}

#[test]
fn fetch_page_attaches_pager() {
    let (_catalog, model) = books(7);

    let page = model
        .fetch_page(&FetchParams::new().order("books.id"), 3)
        .unwrap();
    assert_eq!(ids(&page), [Value::Integer(7)]);
    assert_eq!(
        page.pager(),
        Some(&Pager {
            page: 3,
            paging: 3,
            count: 7,
            pages: 3
        })
    );

    let wide = model
        .fetch_page(&FetchParams::new().order("books.id").paging(5), 1)
        .unwrap();
    assert_eq!(wide.len(), 5);
    assert_eq!(wide.pager().unwrap().pages, 2);
}

#[test]
fn fetch_page_counts_only_matching_rows() {
    let (_catalog, model) = books(7);
    let page = model
        .fetch_page(&FetchParams::new().cond("books.id > 5"), 1)
        .unwrap();
    let pager = page.pager().unwrap();
    assert_eq!((pager.count, pager.pages), (2, 1));
    assert_eq!(page.len(), 2);
}

#[test]
fn plain_fetch_has_no_pager_and_iterates_by_reference() {
    let (_catalog, model) = books(3);
    let collection = model.fetch_all(&FetchParams::new().order("books.id DESC")).unwrap();
    assert!(collection.pager().is_none());

    let mut titles = Vec::new();
    for record in &collection {
        titles.push(record.raw("title").to_text());
    }
    assert_eq!(titles, ["book3", "book2", "book1"]);
    assert!(model
        .fetch_one(&FetchParams::new().cond("books.id = 42"))
        .unwrap()
        .is_none());
}
