use relmap_core::db::{open_db_in_memory, Backend, FetchMode, SqliteBackend};
use relmap_core::query::{Cond, Conj, JoinKind, PageInfo, Part, Select};
use relmap_core::schema::{ColumnSpec, ColumnType, Table, TableSpec};
use relmap_core::{CoreConfig, Row, Value};
use std::rc::Rc;

fn setup() -> (Rc<SqliteBackend>, Table) {
    let backend = Rc::new(open_db_in_memory().unwrap());
    let shared: Rc<dyn Backend> = backend.clone();
    let spec = TableSpec::new("items")
        .col(ColumnSpec::new("name", ColumnType::Varchar).size(20))
        .col(ColumnSpec::new("qty", ColumnType::Int));
    let table = Table::new(spec, shared, &CoreConfig::default()).unwrap();
    (backend, table)
}

fn seed(table: &Table, count: i64) {
    for index in 1..=count {
        table
            .insert(Row::new().with("name", format!("item{index}")).with("qty", index % 3))
            .unwrap();
    }
}

#[test]
fn count_pages_reports_count_and_page_total() {
    let (_, table) = setup();
    seed(&table, 25);

    let select = table.new_select();
    assert_eq!(
        select.count_pages("id").unwrap(),
        PageInfo { count: 25, pages: 3 }
    );
}

#[test]
fn count_pages_on_empty_table_has_zero_pages() {
    let (_, table) = setup();
    let info = table.new_select().count_pages("id").unwrap();
    assert_eq!(info, PageInfo { count: 0, pages: 0 });
}

#[test]
fn count_pages_leaves_builder_untouched() {
    let (_, table) = setup();
    seed(&table, 12);

    let mut select = table.new_select();
    select.order("name").limit_page(2);
    let before = select.to_sql();
    let info = select.count_pages("id").unwrap();
    assert_eq!(info.pages, 2);
    assert_eq!(select.to_sql(), before);
    assert_eq!(select.fetch_all().unwrap().len(), 2);
}

#[test]
fn limit_page_slices_rows_in_order() {
    let (_, table) = setup();
    seed(&table, 25);

    let mut select = table.new_select();
    select.order("id").limit_page(3);
    let rows = select.fetch_all().unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].value("name"), Value::from("item21"));
}

#[test]
fn named_binds_and_quoted_lists() {
    let (_, table) = setup();
    seed(&table, 5);

    let mut select = table.new_select();
    select.and_where("name = :name").bind("name", "item3");
    let row = select.fetch_row().unwrap().unwrap();
    assert_eq!(row.value("id"), Value::Integer(3));

    let mut select = table.new_select();
    select
        .and_where(Cond::bind_list("id IN (?)", [1, 2, 4]))
        .order("id");
    let ids = select
        .fetch_all()
        .unwrap()
        .into_iter()
        .map(|row| row.value("id"))
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![Value::Integer(1), Value::Integer(2), Value::Integer(4)]);
}

#[test]
fn unreferenced_named_binds_are_ignored() {
    let (_, table) = setup();
    seed(&table, 2);

    let mut select = table.new_select();
    select.bind_row(Row::new().with("unused", 1).with("other", "x"));
    assert_eq!(select.fetch_all().unwrap().len(), 2);
}

#[test]
fn or_where_and_multi_where_combine_in_order() {
    let (_, table) = setup();
    seed(&table, 6);

    let mut select = table.new_select();
    select
        .and_where(Cond::bind("name = ?", "item1"))
        .or_where(Cond::bind("name = ?", "item2"));
    assert_eq!(select.fetch_all().unwrap().len(), 2);

    let mut select = table.new_select();
    select.multi_where(
        [Cond::literal("id > 2"), Cond::bind("qty = ?", 0)],
        Conj::And,
    );
    let sql = select.to_sql();
    assert!(sql.ends_with("WHERE id > 2 AND qty = 0"), "{sql}");
    assert_eq!(select.fetch_all().unwrap().len(), 2);
}

#[test]
fn fetch_modes_shape_results() {
    let (_, table) = setup();
    seed(&table, 4);

    let mut select = Select::new(Rc::clone(table.backend()));
    select.from("items", "name, qty").order("id");

    let names = select.fetch_col().unwrap();
    assert_eq!(names.len(), 4);
    assert_eq!(names[0], Value::from("item1"));

    assert_eq!(select.fetch_one().unwrap(), Some(Value::from("item1")));

    let assoc = select.fetch_assoc().unwrap();
    assert_eq!(assoc[1].0, "item2");
    assert_eq!(assoc[1].1.value("qty"), Value::Integer(2));

    let cursor = select.fetch_cursor().unwrap();
    assert_eq!(cursor.columns(), ["name".to_string(), "qty".to_string()]);
    assert_eq!(cursor.count(), 4);

    let shaped = table.select(FetchMode::Col, &[], "id", 0).unwrap();
    assert_eq!(shaped.into_col().unwrap().len(), 4);
}

#[test]
fn group_and_having_aggregate() {
    let (_, table) = setup();
    seed(&table, 9);

    let mut select = Select::new(Rc::clone(table.backend()));
    select
        .from("items", "qty")
        .cols("COUNT(*) AS total")
        .group("qty")
        .having("COUNT(*) >= 3")
        .order("qty");
    let rows = select.fetch_all().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].value("total"), Value::Integer(3));
}

#[test]
fn joined_table_columns_are_prefixed() {
    let (backend, table) = setup();
    let shared: Rc<dyn Backend> = backend.clone();
    let tags = Table::new(
        TableSpec::new("tags")
            .col(ColumnSpec::new("item_id", ColumnType::Int))
            .col(ColumnSpec::new("label", ColumnType::Varchar)),
        shared,
        &CoreConfig::default(),
    )
    .unwrap();
    seed(&table, 2);
    tags.insert(Row::new().with("item_id", 2).with("label", "red"))
        .unwrap();

    let mut select = table.new_select();
    select.join_table(JoinKind::Inner, &tags, Some("t"), "t.item_id = items.id", "label");
    let rows = select.fetch_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("items__name"), Value::from("item2"));
    assert_eq!(rows[0].value("t__label"), Value::from("red"));

    select.clear(Part::Cols).cols("items.name AS name");
    let row = select.fetch_row().unwrap().unwrap();
    assert_eq!(row.len(), 1);
    assert_eq!(row.value("name"), Value::from("item2"));
}

#[test]
fn failed_statement_carries_backend_diagnostic() {
    let (_, table) = setup();
    let mut select = table.new_select();
    select.and_where("missing_col = 1");
    let err = select.fetch_all().unwrap_err();
    assert!(err.diagnostic().contains("missing_col"), "{err}");
}
