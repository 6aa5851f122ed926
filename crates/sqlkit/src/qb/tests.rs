use super::*;
use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::driver::Driver;
use crate::error::SqlResult;
use crate::row::Row;
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<(String, Vec<Value>)>>>;

/// Records statements instead of running them.
struct RecordingDriver {
    dialect: Dialect,
    log: Log,
}

impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> SqlResult<Vec<Row>> {
        self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
        Ok(Vec::new())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> SqlResult<u64> {
        self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    fn execute_batch(&mut self, sql: &str) -> SqlResult<()> {
        self.log.borrow_mut().push((sql.to_string(), Vec::new()));
        Ok(())
    }

    fn last_insert_id(&mut self) -> SqlResult<Option<i64>> {
        Ok(Some(7))
    }
}

fn recording(dialect: Dialect) -> (Connection, Log) {
    let log = Log::default();
    let driver = RecordingDriver {
        dialect,
        log: log.clone(),
    };
    (Connection::with_driver(Box::new(driver), ConnectionConfig::default()), log)
}

fn conn(dialect: Dialect) -> Connection {
    recording(dialect).0
}

#[test]
fn compiles_full_select_for_mysql() {
    let conn = conn(Dialect::MySql);
    let q = conn
        .table("users")
        .where_("age", ">", 18)
        .or_where("role", "=", "admin")
        .order_by("name", "asc")
        .limit(10)
        .offset(20)
        .to_sql()
        .unwrap();

    assert_eq!(
        q.sql,
        "SELECT * FROM `users` WHERE `age` > ? OR `role` = ? ORDER BY `name` ASC LIMIT ? OFFSET ?"
    );
    assert_eq!(
        q.bindings,
        vec![Value::Int(18), Value::from("admin"), Value::Int(10), Value::Int(20)]
    );
}

#[test]
fn compiles_joins_projection_and_grouping() {
    let conn = conn(Dialect::Postgres);
    let q = conn
        .table("posts AS p")
        .join("users AS u", "u.id", "=", "p.user_id")
        .select(&["u.name AS author", "COUNT(p.id) AS posts"])
        .group_by(&["u.name"])
        .distinct()
        .to_sql()
        .unwrap();

    assert_eq!(
        q.sql,
        "SELECT DISTINCT \"u\".\"name\" AS \"author\", COUNT(\"p\".\"id\") AS \"posts\" \
         FROM \"posts\" AS \"p\" INNER JOIN \"users\" AS \"u\" ON \"u\".\"id\" = \"p\".\"user_id\" \
         GROUP BY \"u\".\"name\""
    );
    assert!(q.bindings.is_empty());
}

#[test]
fn where_order_and_connectives_are_preserved() {
    let conn = conn(Dialect::Sqlite);
    let q = conn
        .table("t")
        .or_where("a", "=", 1)
        .where_in("b", [2, 3])
        .or_where_null("c")
        .where_not_between("d", 4, 5)
        .to_sql()
        .unwrap();

    assert_eq!(
        q.sql,
        "SELECT * FROM \"t\" WHERE \"a\" = ? AND \"b\" IN (?, ?) OR \"c\" IS NULL AND \"d\" NOT BETWEEN ? AND ?"
    );
    assert_eq!(q.bindings.len(), q.placeholder_count());
    assert_eq!(
        q.bindings,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]
    );
}

#[test]
fn placeholder_count_matches_bindings() {
    let conn = conn(Dialect::Postgres);
    let q = conn
        .table("orders")
        .where_("status", "!=", "it's ? quoted")
        .where_not_in("id", [1, 2, 3])
        .or_where_between("total", 10.5, 99.0)
        .where_("note", "ilike", "%?%")
        .for_page(3, 25)
        .to_sql()
        .unwrap();

    assert_eq!(q.bindings.len(), 9);
    assert_eq!(q.placeholder_count(), q.bindings.len());
    assert_eq!(&q.bindings[7..], &[Value::Int(25), Value::Int(50)]);
}

#[test]
fn empty_in_lists_compile_without_bindings() {
    let conn = conn(Dialect::Sqlite);
    let q = conn
        .table("t")
        .where_in("id", Vec::<i64>::new())
        .or_where_not_in("id", Vec::<i64>::new())
        .to_sql()
        .unwrap();
    assert_eq!(q.sql, "SELECT * FROM \"t\" WHERE 1 = 0 OR 1 = 1");
    assert!(q.bindings.is_empty());
}

#[test]
fn null_values_become_is_null() {
    let conn = conn(Dialect::Sqlite);
    let q = conn
        .table("t")
        .where_("deleted_at", "=", Value::Null)
        .where_("parent_id", "<>", None::<i64>)
        .to_sql()
        .unwrap();
    assert_eq!(
        q.sql,
        "SELECT * FROM \"t\" WHERE \"deleted_at\" IS NULL AND \"parent_id\" IS NOT NULL"
    );
    assert!(q.bindings.is_empty());
}

#[test]
fn ilike_depends_on_dialect() {
    let pg = conn(Dialect::Postgres);
    let lite = conn(Dialect::Sqlite);
    let pg_sql = pg.table("t").where_("name", "ILIKE", "a%").to_sql().unwrap().sql;
    let lite_sql = lite.table("t").where_("name", "ILIKE", "a%").to_sql().unwrap().sql;
    assert!(pg_sql.ends_with("\"name\" ILIKE ?"));
    assert!(lite_sql.ends_with("\"name\" LIKE ?"));
}

#[test]
fn offset_without_limit() {
    let pg = conn(Dialect::Postgres).table("t").skip(5).to_sql().unwrap();
    assert_eq!(pg.sql, "SELECT * FROM \"t\" OFFSET ?");
    assert_eq!(pg.bindings, vec![Value::Int(5)]);

    let mysql = conn(Dialect::MySql).table("t").skip(5).to_sql().unwrap();
    assert_eq!(mysql.sql, "SELECT * FROM `t` LIMIT ? OFFSET ?");
    assert_eq!(mysql.bindings, vec![Value::Int(i64::MAX), Value::Int(5)]);
}

#[test]
fn branch_does_not_share_state() {
    let conn = conn(Dialect::Sqlite);
    let a = conn.table("t").where_("x", "=", 1);
    let b = a.branch().where_("y", "=", 2);

    let a_sql = a.to_sql().unwrap();
    let b_sql = b.to_sql().unwrap();
    assert!(!a_sql.sql.contains("\"y\""));
    assert_eq!(a_sql.bindings, vec![Value::Int(1)]);
    assert!(b_sql.sql.contains("\"y\" = ?"));
    assert_eq!(b_sql.bindings.len(), 2);
}

#[test]
fn validation_failure_is_deferred_to_terminal() {
    let (conn, log) = recording(Dialect::Sqlite);
    let q = conn
        .table("users")
        .where_("1=1; DROP TABLE x", "=", 1)
        .where_("name", "=", "ok");

    assert!(matches!(
        q.error(),
        Some(ValidationError::InvalidIdentifier { .. })
    ));
    assert!(q.to_sql().unwrap_err().is_invalid_identifier());
    assert!(q.get().unwrap_err().is_invalid_identifier());
    assert!(log.borrow().is_empty());
}

#[test]
fn first_error_wins() {
    let conn = conn(Dialect::Sqlite);
    let q = conn
        .table("t")
        .where_("a", "==", 1)
        .where_("b;", "=", 1);
    assert!(q.to_sql().unwrap_err().is_invalid_operator());
}

#[test]
fn rejects_bad_table_order_and_limits() {
    let conn = conn(Dialect::Sqlite);
    assert!(conn.table("users; --").to_sql().unwrap_err().is_invalid_identifier());
    assert!(matches!(
        conn.table("t").order_by("a", "sideways").error(),
        Some(ValidationError::InvalidArgument(_))
    ));
    assert!(matches!(
        conn.table("t").limit(-1).error(),
        Some(ValidationError::InvalidArgument(_))
    ));
    assert!(matches!(
        conn.table("t").offset(-5).error(),
        Some(ValidationError::InvalidArgument(_))
    ));
    assert!(conn.table("t").for_page(0, 10).error().is_some());
}

#[test]
fn count_sql_drops_paging_and_wraps_groups() {
    let conn = conn(Dialect::Sqlite);
    let plain = conn
        .table("t")
        .where_("a", "=", 1)
        .order_by_desc("id")
        .limit(5)
        .to_count_sql()
        .unwrap();
    assert_eq!(
        plain.sql,
        "SELECT COUNT(*) AS \"aggregate\" FROM \"t\" WHERE \"a\" = ?"
    );
    assert_eq!(plain.bindings, vec![Value::Int(1)]);

    let grouped = conn.table("t").group_by(&["a"]).to_count_sql().unwrap();
    assert_eq!(
        grouped.sql,
        "SELECT COUNT(*) AS \"aggregate\" FROM (SELECT * FROM \"t\" GROUP BY \"a\") AS \"aggregate_table\""
    );
}

#[test]
fn first_runs_on_a_copy() {
    let (conn, log) = recording(Dialect::Sqlite);
    let q = conn.table("t").where_("a", "=", 1);
    assert!(q.first().unwrap().is_none());
    assert!(q.first().unwrap().is_none());

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, "SELECT * FROM \"t\" WHERE \"a\" = ? LIMIT ?");
    assert_eq!(log[0].1, vec![Value::Int(1), Value::Int(1)]);
    assert_eq!(log[0], log[1]);
    assert_eq!(q.descriptor().limit, None);
}

#[test]
fn update_binds_sets_before_wheres() {
    let (conn, log) = recording(Dialect::Postgres);
    conn.table("users")
        .where_("id", "=", 5)
        .update(&[("name", "Ann".into()), ("age", 30.into())])
        .unwrap();
    conn.table("users").where_("id", "=", 5).increment("visits", 2).unwrap();

    let log = log.borrow();
    assert_eq!(log[0].0, "UPDATE \"users\" SET \"name\" = ?, \"age\" = ? WHERE \"id\" = ?");
    assert_eq!(log[0].1, vec![Value::from("Ann"), Value::Int(30), Value::Int(5)]);
    assert_eq!(log[1].0, "UPDATE \"users\" SET \"visits\" = \"visits\" + ? WHERE \"id\" = ?");
}

#[test]
fn mutations_reject_joins_and_limits() {
    let conn = conn(Dialect::MySql);
    let joined = conn.table("a").join("b", "b.a_id", "=", "a.id").where_("a.x", "=", 1);
    assert!(joined.delete().is_err());
    assert!(conn.table("a").where_("x", "=", 1).limit(1).update(&[("x", 2.into())]).is_err());
}

#[test]
fn delete_requires_conditions() {
    let (conn, log) = recording(Dialect::MySql);
    let err = conn.table("users").delete().unwrap_err();
    assert!(matches!(
        err,
        crate::SqlError::Validation(ValidationError::InvalidArgument(_))
    ));
    assert!(log.borrow().is_empty());

    conn.table("users").delete_all().unwrap();
    assert_eq!(log.borrow()[0].0, "DELETE FROM `users`");
}

#[test]
fn insert_get_id_by_dialect() {
    let (mysql, log) = recording(Dialect::MySql);
    let id = mysql.table("users").insert_get_id(&[("email", "a@b.c".into())]).unwrap();
    assert_eq!(id, 7);
    assert_eq!(log.borrow()[0].0, "INSERT INTO `users` (`email`) VALUES (?)");

    let (pg, log) = recording(Dialect::Postgres);
    // The recording driver returns no rows for RETURNING.
    assert!(pg.table("users").insert_get_id(&[("email", "a@b.c".into())]).unwrap_err().is_not_found());
    assert_eq!(
        log.borrow()[0].0,
        "INSERT INTO \"users\" (\"email\") VALUES (?) RETURNING \"id\""
    );
}

#[test]
fn when_applies_conditionally() {
    let conn = conn(Dialect::Sqlite);
    let q = conn
        .table("t")
        .when(true, |q| q.where_("a", "=", 1))
        .when(false, |q| q.where_("b", "=", 2))
        .to_sql()
        .unwrap();
    assert_eq!(q.sql, "SELECT * FROM \"t\" WHERE \"a\" = ?");
}
