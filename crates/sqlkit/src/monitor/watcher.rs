use super::config::WatcherConfig;
use super::normalize::{normalize_sql, truncate_sql_bytes};
use super::types::{CallSite, QueryObservation, QueryObserver, QueryType, serialize_ms};
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Slow statements longer than this are stored truncated.
const MAX_STORED_SQL: usize = 2_000;

/// Records statement shapes and timings for one observation window.
///
/// Flags a normalized pattern as N+1 fan-out once it has executed
/// `n_plus_one_threshold` times, and keeps every statement at or above
/// `slow_query_threshold` verbatim. The window is closed only by
/// [`reset`](Self::reset).
///
/// ```ignore
/// let watcher = Arc::new(QueryWatcher::new(WatcherConfig::new().enable()));
/// let conn = Connection::open(&config)?.with_observer(watcher.clone());
///
/// for id in [1, 2, 3] {
///     conn.select(&format!("SELECT * FROM posts WHERE id = {id}"), &[])?;
/// }
/// assert_eq!(watcher.report().n_plus_one["SELECT * FROM posts WHERE id = ?"].count, 3);
/// ```
#[derive(Debug)]
pub struct QueryWatcher {
    enabled: AtomicBool,
    config: WatcherConfig,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    total_queries: u64,
    total_time: Duration,
    counts: TypeCounts,
    patterns: HashMap<String, u32>,
    n_plus_one: BTreeMap<String, NPlusOnePattern>,
    slow_queries: Vec<SlowQuery>,
    dropped_slow_queries: u64,
}

/// Per statement-type counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub select: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub other: u64,
}

impl TypeCounts {
    fn bump(&mut self, ty: QueryType) {
        match ty {
            QueryType::Select => self.select += 1,
            QueryType::Insert => self.insert += 1,
            QueryType::Update => self.update += 1,
            QueryType::Delete => self.delete += 1,
            QueryType::Other => self.other += 1,
        }
    }
}

/// A statement at or above the slow-query threshold.
#[derive(Debug, Clone, Serialize)]
pub struct SlowQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
    pub call_site: Option<CallSite>,
}

/// A pattern that crossed the N+1 threshold.
#[derive(Debug, Clone, Serialize)]
pub struct NPlusOnePattern {
    pub pattern: String,
    /// Executions in the current window, including those before the flag.
    pub count: u32,
    /// Statement that pushed the pattern over the threshold.
    pub example_sql: String,
    pub call_site: Option<CallSite>,
}

/// Snapshot of one observation window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatcherReport {
    pub total_queries: u64,
    #[serde(rename = "total_time_ms", serialize_with = "serialize_ms")]
    pub total_time: Duration,
    pub by_type: TypeCounts,
    pub slow_queries: Vec<SlowQuery>,
    pub dropped_slow_queries: u64,
    /// Flagged patterns keyed by normalized SQL.
    pub n_plus_one: BTreeMap<String, NPlusOnePattern>,
}

impl WatcherReport {
    pub fn has_n_plus_one(&self) -> bool {
        !self.n_plus_one.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for QueryWatcher {
    fn default() -> Self {
        Self::new(WatcherConfig::default())
    }
}

impl QueryWatcher {
    /// Create a watcher; it starts enabled only if `config.enabled` is set.
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn state(&self) -> MutexGuard<'_, WindowState> {
        // Observer state is advisory; recover from a poisoned lock rather than panic.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one statement. No-op while disabled.
    #[track_caller]
    pub fn record_query(&self, sql: &str, bindings: &[Value], elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        let obs = QueryObservation::new(sql, bindings.to_vec(), elapsed)
            .with_call_site(CallSite::capture());
        self.record(&obs);
    }

    /// Record an observation produced by a connection.
    pub fn record(&self, obs: &QueryObservation) {
        if !self.is_enabled() {
            return;
        }
        let pattern = normalize_sql(&obs.sql);
        let threshold = self.config.n_plus_one_threshold.max(2);
        let mut state = self.state();

        state.total_queries += 1;
        state.total_time = state.total_time.saturating_add(obs.elapsed);
        state.counts.bump(obs.query_type);

        let count = {
            let c = state.patterns.entry(pattern.clone()).or_insert(0);
            *c = c.saturating_add(1);
            *c
        };
        if count >= threshold {
            match state.n_plus_one.get_mut(&pattern) {
                Some(flagged) => flagged.count = count,
                None => {
                    tracing::warn!(
                        target: "sqlkit.watcher",
                        pattern = %pattern,
                        count,
                        call_site = ?obs.call_site.map(|c| c.to_string()),
                        "possible N+1 query pattern"
                    );
                    state.n_plus_one.insert(
                        pattern.clone(),
                        NPlusOnePattern {
                            pattern,
                            count,
                            example_sql: truncate_sql_bytes(&obs.sql, MAX_STORED_SQL).to_string(),
                            call_site: obs.call_site,
                        },
                    );
                }
            }
        }

        if obs.elapsed >= self.config.slow_query_threshold {
            tracing::warn!(
                target: "sqlkit.watcher",
                elapsed_ms = obs.elapsed_ms(),
                sql = %truncate_sql_bytes(&obs.sql, 200),
                "slow query"
            );
            if state.slow_queries.len() < self.config.max_slow_queries {
                state.slow_queries.push(SlowQuery {
                    sql: truncate_sql_bytes(&obs.sql, MAX_STORED_SQL).to_string(),
                    bindings: obs.bindings.clone(),
                    elapsed: obs.elapsed,
                    call_site: obs.call_site,
                });
            } else {
                state.dropped_slow_queries += 1;
            }
        }
    }

    /// Snapshot of the current window.
    pub fn report(&self) -> WatcherReport {
        let state = self.state();
        WatcherReport {
            total_queries: state.total_queries,
            total_time: state.total_time,
            by_type: state.counts.clone(),
            slow_queries: state.slow_queries.clone(),
            dropped_slow_queries: state.dropped_slow_queries,
            n_plus_one: state.n_plus_one.clone(),
        }
    }

    /// Close the current window and start a new one.
    pub fn reset(&self) {
        *self.state() = WindowState::default();
    }
}

impl QueryObserver for QueryWatcher {
    fn on_query(&self, observation: &QueryObservation) {
        self.record(observation);
    }

    fn reset(&self) {
        QueryWatcher::reset(self);
    }
}
