//! Nested transactions over one connection.
//!
//! The outermost scope issues a real `BEGIN` (`START TRANSACTION` on MySQL),
//! `COMMIT` and `ROLLBACK`. Every nested scope maps to a savepoint:
//! `SAVEPOINT`, `RELEASE SAVEPOINT` and `ROLLBACK TO SAVEPOINT`.
//!
//! Savepoint names are `sp_<connection id>_<depth>`, built only from the
//! connection's random id and the nesting depth.
//!
//! # Example
//!
//! ```ignore
//! conn.begin_transaction()?;          // BEGIN
//! conn.insert("orders", &order)?;
//!
//! conn.begin_transaction()?;          // SAVEPOINT sp_..._2
//! if conn.insert("notifications", &note).is_err() {
//!     conn.roll_back()?;              // ROLLBACK TO SAVEPOINT sp_..._2
//! } else {
//!     conn.commit()?;                 // RELEASE SAVEPOINT sp_..._2
//! }
//!
//! conn.commit()?;                     // COMMIT
//! ```

use crate::connection::Connection;
use crate::error::{SqlError, SqlResult};
use std::panic::{self, AssertUnwindSafe};

impl Connection {
    /// Current nesting depth; `0` means no open transaction.
    pub fn transaction_level(&self) -> u32 {
        self.transaction_level.get()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_level() > 0
    }

    /// Savepoint name for the scope at `depth` (2 and deeper).
    pub fn savepoint_name(&self, depth: u32) -> String {
        format!("sp_{}_{}", self.connection_id(), depth)
    }

    /// Open a transaction scope: `BEGIN` at depth 0, a savepoint otherwise.
    pub fn begin_transaction(&self) -> SqlResult<()> {
        let level = self.transaction_level.get();
        if level == 0 {
            self.control(self.dialect().begin_sql())?;
        } else {
            self.control(&format!("SAVEPOINT {}", self.savepoint_name(level + 1)))?;
        }
        self.transaction_level.set(level + 1);
        tracing::trace!(target: "sqlkit.sql", level = level + 1, "transaction scope opened");
        Ok(())
    }

    /// Close the innermost scope, keeping its changes.
    ///
    /// Fails with [`SqlError::TransactionState`] when no transaction is
    /// open. The depth only drops if the statement succeeds.
    pub fn commit(&self) -> SqlResult<()> {
        let level = self.transaction_level.get();
        match level {
            0 => {
                return Err(SqlError::transaction_state(
                    "commit called with no open transaction",
                ));
            }
            1 => self.control("COMMIT")?,
            n => self.control(&format!("RELEASE SAVEPOINT {}", self.savepoint_name(n)))?,
        }
        self.transaction_level.set(level - 1);
        tracing::trace!(target: "sqlkit.sql", level = level - 1, "transaction scope committed");
        Ok(())
    }

    /// Discard the innermost scope.
    ///
    /// Fails with [`SqlError::TransactionState`] when no transaction is
    /// open. The depth drops even if the rollback statement fails: the
    /// scope is unusable either way.
    pub fn roll_back(&self) -> SqlResult<()> {
        let level = self.transaction_level.get();
        let result = match level {
            0 => {
                return Err(SqlError::transaction_state(
                    "rollback called with no open transaction",
                ));
            }
            1 => self.control("ROLLBACK"),
            n => self.control(&format!("ROLLBACK TO SAVEPOINT {}", self.savepoint_name(n))),
        };
        self.transaction_level.set(level - 1);
        tracing::debug!(target: "sqlkit.sql", level = level - 1, ok = result.is_ok(), "transaction scope rolled back");
        result
    }

    /// Run `f` inside a transaction scope.
    ///
    /// Commits when `f` returns `Ok`. When `f` returns `Err` the scope is
    /// rolled back and that same error is returned; when `f` panics the scope
    /// is rolled back and the panic resumes. A failing rollback is logged,
    /// never substituted for the original error.
    pub fn transaction<T, F>(&self, f: F) -> SqlResult<T>
    where
        F: FnOnce(&Connection) -> SqlResult<T>,
    {
        self.begin_transaction()?;
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(Ok(value)) => match self.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.roll_back_quietly("commit failed");
                    Err(err)
                }
            },
            Ok(Err(err)) => {
                self.roll_back_quietly("closure returned an error");
                Err(err)
            }
            Err(payload) => {
                self.roll_back_quietly("closure panicked");
                panic::resume_unwind(payload)
            }
        }
    }

    fn roll_back_quietly(&self, reason: &str) {
        if let Err(e) = self.roll_back() {
            tracing::error!(target: "sqlkit.sql", reason, error = %e, "rollback failed");
        }
    }
}
