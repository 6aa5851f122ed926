//! Query builder end to end against in-memory SQLite.

use sqlkit::{Connection, FromRow, Row, SqlResult, Value};

#[derive(Debug, PartialEq)]
struct Post {
    id: i64,
    title: String,
    views: i64,
}

impl FromRow for Post {
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            views: row.try_get("views")?,
        })
    }
}

fn seeded(n: i64) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.schema()
        .create("posts", |t| {
            t.increments("id");
            t.string("title", 100);
            t.integer("views").default(0);
            t.integer("author_id").nullable();
            t.timestamp("created_at").nullable();
        })
        .unwrap();
    for i in 1..=n {
        conn.table("posts")
            .insert(&[
                ("title", format!("post {i}").into()),
                ("views", (i * 10).into()),
                ("author_id", if i % 2 == 0 { Value::Int(1) } else { Value::Int(2) }),
            ])
            .unwrap();
    }
    conn
}

#[test]
fn paginate_second_page() {
    let conn = seeded(25);
    let page = conn.table("posts").order_by("id", "asc").paginate(10, 2).unwrap();

    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total, 25);
    assert_eq!(page.per_page, 10);
    assert_eq!(page.current_page, 2);
    assert_eq!(page.last_page, 3);
    assert_eq!(page.items[0].get("id"), Some(&Value::Int(11)));

    let last = conn.table("posts").order_by("id", "asc").paginate_as::<Post>(10, 3).unwrap();
    assert_eq!(last.items.len(), 5);
    assert_eq!(last.items[4].title, "post 25");
}

#[test]
fn get_first_find_and_mapping() {
    let conn = seeded(5);
    let posts: Vec<Post> = conn
        .table("posts")
        .where_("views", ">=", 30)
        .order_by_desc("views")
        .get_as()
        .unwrap();
    assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![5, 4, 3]);

    let first = conn.table("posts").order_by("id", "asc").first_as::<Post>().unwrap().unwrap();
    assert_eq!(first, Post { id: 1, title: "post 1".to_string(), views: 10 });

    assert!(conn.table("posts").find(3).unwrap().is_some());
    assert!(conn.table("posts").find(99).unwrap().is_none());
    assert_eq!(
        conn.table("posts").where_("id", "=", 2).value("title").unwrap(),
        Some(Value::from("post 2"))
    );
    assert!(conn.table("posts").where_("title", "like", "post 1%").exists().unwrap());
    assert!(!conn.table("posts").where_("title", "=", "nope").exists().unwrap());
}

#[test]
fn aggregates() {
    let conn = seeded(4);
    let q = conn.table("posts");
    assert_eq!(q.count().unwrap(), 4);
    assert_eq!(q.sum("views").unwrap(), 100.0);
    assert_eq!(q.avg("views").unwrap(), Some(25.0));
    assert_eq!(q.min("views").unwrap(), Some(Value::Int(10)));
    assert_eq!(q.max("views").unwrap(), Some(Value::Int(40)));

    let none = conn.table("posts").where_("views", ">", 1000);
    assert_eq!(none.count().unwrap(), 0);
    assert_eq!(none.sum("views").unwrap(), 0.0);
    assert_eq!(none.avg("views").unwrap(), None);
    assert_eq!(none.max("views").unwrap(), None);

    let grouped = conn.table("posts").select(&["author_id"]).group_by(&["author_id"]);
    assert_eq!(grouped.count().unwrap(), 2);
}

#[test]
fn terminal_calls_leave_the_builder_untouched() {
    let conn = seeded(12);
    let base = conn.table("posts").where_("views", ">", 0).order_by("id", "asc");
    let before = base.to_sql().unwrap();

    base.first().unwrap();
    base.count().unwrap();
    base.paginate(5, 2).unwrap();
    base.sum("views").unwrap();

    assert_eq!(base.to_sql().unwrap(), before);
    assert_eq!(base.get().unwrap().len(), 12);
}

#[test]
fn branches_diverge_from_a_shared_base() {
    let conn = seeded(6);
    let base = conn.table("posts").where_("author_id", "=", 1);
    let popular = base.branch().where_("views", ">", 30);

    assert_eq!(base.count().unwrap(), 3);
    assert_eq!(popular.count().unwrap(), 2);
    assert!(!base.to_sql().unwrap().sql.contains("views"));
}

#[test]
fn updates_increments_and_deletes() {
    let conn = seeded(3);

    let changed = conn
        .table("posts")
        .where_in("id", [1, 2])
        .update(&[("title", "edited".into())])
        .unwrap();
    assert_eq!(changed, 2);

    conn.table("posts").where_("id", "=", 3).increment("views", 5).unwrap();
    conn.table("posts").where_("id", "=", 1).decrement("views", 10).unwrap();
    assert_eq!(
        conn.table("posts").order_by("id", "asc").pluck("views").unwrap(),
        vec![Value::Int(0), Value::Int(20), Value::Int(35)]
    );

    assert!(conn.table("posts").delete().is_err());
    assert_eq!(conn.table("posts").where_("title", "=", "edited").delete().unwrap(), 2);
    assert_eq!(conn.table("posts").delete_all().unwrap(), 1);
    assert_eq!(conn.table("posts").count().unwrap(), 0);
}

#[test]
fn insert_get_id_returns_rowid() {
    let conn = seeded(2);
    let id = conn.table("posts").insert_get_id(&[("title", "third".into())]).unwrap();
    assert_eq!(id, 3);
    let id = conn.insert_get_id("posts", &[("title", "fourth".into())]).unwrap();
    assert_eq!(id, 4);
}

#[test]
fn joins_against_real_tables() {
    let conn = seeded(4);
    conn.unprepared(
        "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO authors (id, name) VALUES (1, 'ann'), (2, 'bob');",
    )
    .unwrap();

    let rows = conn
        .table("posts AS p")
        .join("authors AS a", "a.id", "=", "p.author_id")
        .select(&["a.name AS author", "COUNT(p.id) AS total"])
        .group_by(&["a.name"])
        .order_by("a.name", "asc")
        .get()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("author"), Some(&Value::from("ann")));
    assert_eq!(rows[0].get("total"), Some(&Value::Int(2)));
}

#[test]
fn hostile_input_never_reaches_the_database() {
    let conn = seeded(1);
    conn.enable_query_log();

    for column in ["id; DROP TABLE posts", "id -- ", "\"id\"", "id'", "SLEEP(5)"] {
        let err = conn.table("posts").where_(column, "=", 1).get().unwrap_err();
        assert!(err.is_invalid_identifier(), "{column} should be rejected");
    }
    let err = conn.table("posts").where_("id", "= 1 OR 1 =", 1).get().unwrap_err();
    assert!(err.is_invalid_operator());

    assert!(conn.query_log().is_empty());
    assert_eq!(conn.table("posts").count().unwrap(), 1);
}

#[test]
fn values_with_quotes_are_bound_not_inlined() {
    let conn = seeded(0);
    let title = "it's \"quoted\"; DROP TABLE posts; --";
    conn.table("posts").insert(&[("title", title.into())]).unwrap();
    assert_eq!(conn.table("posts").where_("title", "=", title).count().unwrap(), 1);
}
