//! Query observation: N+1 and slow-query detection, logging.
//!
//! A [`Connection`](crate::Connection) hands every executed statement to the
//! [`QueryObserver`]s attached to it. Observers are injected explicitly; there
//! is no process-global watcher, so each test or tenant can own its own.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlkit::monitor::{LoggingObserver, QueryWatcher, WatcherConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let watcher = Arc::new(QueryWatcher::new(
//!     WatcherConfig::new()
//!         .enable()
//!         .with_slow_query_threshold(Duration::from_millis(50)),
//! ));
//!
//! let conn = Connection::open(&config)?
//!     .with_observer(watcher.clone())
//!     .with_observer(Arc::new(LoggingObserver::new()));
//!
//! // ... handle one request ...
//!
//! let report = watcher.report();
//! if report.has_n_plus_one() {
//!     eprintln!("{}", report.to_json()?);
//! }
//! conn.reset_request_state()?;
//! ```

mod config;
mod normalize;
mod observers;
mod types;
mod watcher;

#[cfg(test)]
mod tests;

pub use config::WatcherConfig;
pub use normalize::{MAX_NORMALIZE_BYTES, normalize_sql};
pub use observers::{CompositeObserver, LoggingObserver};
pub use types::{CallSite, QueryObservation, QueryObserver, QueryType};
pub use watcher::{NPlusOnePattern, QueryWatcher, SlowQuery, TypeCounts, WatcherReport};

pub(crate) use types::serialize_ms;
