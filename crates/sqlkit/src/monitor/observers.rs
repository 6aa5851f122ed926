use super::normalize::truncate_sql_bytes;
use super::types::{QueryObservation, QueryObserver};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Emits one `tracing` event per statement under target `sqlkit.sql`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Minimum duration to log (filters out fast queries).
    pub min_duration: Option<Duration>,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Include bound values in the event.
    pub log_bindings: bool,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            min_duration: None,
            max_sql_length: Some(200),
            log_bindings: false,
        }
    }
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Only log queries slower than this duration.
    pub fn min_duration(mut self, duration: Duration) -> Self {
        self.min_duration = Some(duration);
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Log bound values too. Off by default since bindings may hold secrets.
    pub fn log_bindings(mut self, yes: bool) -> Self {
        self.log_bindings = yes;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryObserver for LoggingObserver {
    fn on_query(&self, obs: &QueryObservation) {
        if self.min_duration.is_some_and(|min| obs.elapsed < min) {
            return;
        }

        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(&obs.sql);
        let call_site = obs.call_site.map(|c| c.to_string()).unwrap_or_default();
        let error = obs.error.as_deref().unwrap_or("");
        if self.log_bindings {
            let bindings = tracing::field::debug(&obs.bindings);
            emit_at_level!(
                self.level,
                target: "sqlkit.sql",
                query_type = ?obs.query_type,
                elapsed_ms = obs.elapsed_ms(),
                call_site = %call_site,
                error,
                bindings,
                sql = %sql,
            );
        } else {
            emit_at_level!(
                self.level,
                target: "sqlkit.sql",
                query_type = ?obs.query_type,
                elapsed_ms = obs.elapsed_ms(),
                call_site = %call_site,
                error,
                param_count = obs.bindings.len(),
                sql = %sql,
            );
        }
    }
}

/// Fans one observation out to several observers.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn QueryObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    #[allow(clippy::should_implement_trait)]
    pub fn add<O: QueryObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Add an Arc-wrapped observer (e.g. a watcher you also want to query).
    pub fn add_arc(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl QueryObserver for CompositeObserver {
    fn on_query(&self, observation: &QueryObservation) {
        for o in &self.observers {
            o.on_query(observation);
        }
    }

    fn reset(&self) {
        for o in &self.observers {
            o.reset();
        }
    }
}
