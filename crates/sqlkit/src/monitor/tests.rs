use super::*;
use crate::value::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn enabled() -> QueryWatcher {
    QueryWatcher::new(WatcherConfig::new().enable())
}

#[test]
fn test_query_type_detection() {
    assert_eq!(QueryType::from_sql("SELECT * FROM users"), QueryType::Select);
    assert_eq!(QueryType::from_sql("  select * FROM users"), QueryType::Select);
    assert_eq!(
        QueryType::from_sql("WITH cte AS (SELECT 1) SELECT * FROM cte"),
        QueryType::Select
    );
    assert_eq!(
        QueryType::from_sql("WITH x AS (SELECT 1) DELETE FROM t WHERE id IN (SELECT * FROM x)"),
        QueryType::Delete
    );
    assert_eq!(
        QueryType::from_sql(
            "WITH a AS (SELECT 1), b AS (SELECT 2) UPDATE t SET x = (SELECT 1 FROM a) WHERE y IN (SELECT * FROM b)"
        ),
        QueryType::Update
    );
    assert_eq!(
        QueryType::from_sql("WITH RECURSIVE n(v) AS (SELECT 1) INSERT INTO t (v) SELECT v FROM n"),
        QueryType::Insert
    );
    assert_eq!(
        QueryType::from_sql("WITH \"delete\" AS (SELECT ')') SELECT * FROM \"delete\""),
        QueryType::Select
    );
    assert_eq!(
        QueryType::from_sql("/* tag */ INSERT INTO users (name) VALUES (?)"),
        QueryType::Insert
    );
    assert_eq!(QueryType::from_sql("UPDATE users SET name = ?"), QueryType::Update);
    assert_eq!(QueryType::from_sql("-- c\nDELETE FROM users"), QueryType::Delete);
    assert_eq!(QueryType::from_sql("SELECTED"), QueryType::Other);
    assert_eq!(QueryType::from_sql("CREATE TABLE users (id INT)"), QueryType::Other);
}

#[test]
fn test_normalize_literals() {
    assert_eq!(
        normalize_sql("SELECT * FROM posts WHERE id = 42"),
        "SELECT * FROM posts WHERE id = ?"
    );
    assert_eq!(
        normalize_sql("SELECT * FROM users WHERE name = 'o''brien' AND score > 1.5"),
        "SELECT * FROM users WHERE name = ? AND score > ?"
    );
    assert_eq!(
        normalize_sql("SELECT * FROM t WHERE id IN (1, 2, 3)"),
        "SELECT * FROM t WHERE id IN (?)"
    );
    assert_eq!(
        normalize_sql("SELECT * FROM t WHERE id in ($1,$2)"),
        "SELECT * FROM t WHERE id IN (?)"
    );
    assert_eq!(
        normalize_sql("SELECT  *\n FROM t2   WHERE  x=1"),
        "SELECT * FROM t2 WHERE x=?"
    );
}

#[test]
fn test_normalize_truncates_long_sql() {
    let long = format!("SELECT '{}'", "é".repeat(MAX_NORMALIZE_BYTES));
    let out = normalize_sql(&long);
    assert!(out.len() <= MAX_NORMALIZE_BYTES);
}

#[test]
fn test_n_plus_one_flagged_at_threshold() {
    let w = enabled();
    for id in 1..=2 {
        w.record_query(&format!("SELECT * FROM posts WHERE id = {id}"), &[], Duration::ZERO);
    }
    assert!(!w.report().has_n_plus_one());

    w.record_query("SELECT * FROM posts WHERE id = 3", &[], Duration::ZERO);
    let report = w.report();
    let flagged = &report.n_plus_one["SELECT * FROM posts WHERE id = ?"];
    assert_eq!(flagged.count, 3);
    assert_eq!(flagged.example_sql, "SELECT * FROM posts WHERE id = 3");
    let site = flagged.call_site.expect("call site captured");
    assert!(site.file.ends_with("tests.rs"), "{site}");

    w.record_query("SELECT * FROM posts WHERE id = 4", &[], Duration::ZERO);
    assert_eq!(w.report().n_plus_one["SELECT * FROM posts WHERE id = ?"].count, 4);
}

#[test]
fn test_custom_threshold() {
    let w = QueryWatcher::new(WatcherConfig::new().enable().with_n_plus_one_threshold(5));
    for _ in 0..4 {
        w.record_query("SELECT 1 FROM t WHERE a = ?", &[Value::Int(1)], Duration::ZERO);
    }
    assert!(!w.report().has_n_plus_one());
    w.record_query("SELECT 1 FROM t WHERE a = ?", &[Value::Int(1)], Duration::ZERO);
    assert!(w.report().has_n_plus_one());
}

#[test]
fn test_slow_queries() {
    let w = enabled();
    w.record_query("SELECT slow", &[], Duration::from_millis(150));
    w.record_query("SELECT fast", &[], Duration::from_millis(5));
    w.record_query("SELECT edge", &[], Duration::from_millis(100));

    let report = w.report();
    let slow: Vec<_> = report.slow_queries.iter().map(|q| q.sql.as_str()).collect();
    assert_eq!(slow, ["SELECT slow", "SELECT edge"]);
    assert_eq!(report.total_queries, 3);
    assert_eq!(report.total_time, Duration::from_millis(255));
    assert_eq!(report.by_type.select, 3);
}

#[test]
fn test_slow_query_cap() {
    let w = QueryWatcher::new(WatcherConfig::new().enable().with_max_slow_queries(2));
    for i in 0..5 {
        w.record_query(&format!("SELECT {i}"), &[], Duration::from_secs(1));
    }
    let report = w.report();
    assert_eq!(report.slow_queries.len(), 2);
    assert_eq!(report.dropped_slow_queries, 3);
}

#[test]
fn test_disabled_watcher_records_nothing() {
    let w = QueryWatcher::default();
    w.record_query("SELECT 1", &[], Duration::from_secs(1));
    assert_eq!(w.report().total_queries, 0);

    w.enable();
    w.record_query("SELECT 1", &[], Duration::from_secs(1));
    assert_eq!(w.report().total_queries, 1);

    w.disable();
    w.record_query("SELECT 1", &[], Duration::from_secs(1));
    assert_eq!(w.report().total_queries, 1);
}

#[test]
fn test_reset_is_explicit() {
    let w = enabled();
    for _ in 0..3 {
        w.record_query("SELECT * FROM t WHERE id = 1", &[], Duration::from_secs(1));
    }
    let before = w.report();
    assert!(before.has_n_plus_one());
    assert_eq!(before.slow_queries.len(), 3);

    // Reading the report does not close the window.
    assert_eq!(w.report().total_queries, 3);

    QueryObserver::reset(&w);
    let after = w.report();
    assert_eq!(after.total_queries, 0);
    assert!(!after.has_n_plus_one());
    assert!(after.slow_queries.is_empty());
}

#[test]
fn test_report_json() {
    let w = enabled();
    w.record_query("DELETE FROM t WHERE id = ?", &[Value::Int(9)], Duration::from_millis(120));
    let json: serde_json::Value = serde_json::from_str(&w.report().to_json().unwrap()).unwrap();
    assert_eq!(json["total_queries"], 1);
    assert_eq!(json["by_type"]["delete"], 1);
    assert_eq!(json["slow_queries"][0]["bindings"][0], 9);
    assert_eq!(json["slow_queries"][0]["elapsed_ms"], 120.0);
}

#[test]
fn test_logging_observer_truncation() {
    let observer = LoggingObserver::new().max_sql_length(10);
    assert_eq!(observer.truncate_sql("SELECT * FROM users"), "SELECT * F...");
    assert_eq!(observer.truncate_sql("SELECT 1"), "SELECT 1");
}

struct Counting {
    seen: AtomicUsize,
    resets: AtomicUsize,
}

impl QueryObserver for Counting {
    fn on_query(&self, _: &QueryObservation) {
        self.seen.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_composite_observer_fans_out() {
    let counting = Arc::new(Counting {
        seen: AtomicUsize::new(0),
        resets: AtomicUsize::new(0),
    });
    let watcher = Arc::new(enabled());
    let composite = CompositeObserver::new()
        .add_arc(counting.clone())
        .add_arc(watcher.clone())
        .add(LoggingObserver::new());
    assert_eq!(composite.len(), 3);

    composite.on_query(&QueryObservation::new("SELECT 1", vec![], Duration::ZERO));
    assert_eq!(counting.seen.load(Ordering::Relaxed), 1);
    assert_eq!(watcher.report().total_queries, 1);

    composite.reset();
    assert_eq!(counting.resets.load(Ordering::Relaxed), 1);
    assert_eq!(watcher.report().total_queries, 0);
}
