//! Transaction Module
//!
//! Scoped transactions over an [`Executor`]:
//! - [`TransactionGuard`] begins a transaction, or joins the one already open
//!   on the connection, and rolls back on drop unless committed
//! - [`run_in_transaction`] wraps a unit of work with begin/commit/rollback
//!
//! Only the outermost scope owns the transaction. Inner scopes that find a
//! transaction already open neither commit nor roll back; their errors
//! propagate to the owner, which rolls everything back.

use crate::error::{KeelError, TransactionError};
use crate::executor::{ExecError, Executor};

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// A transaction scope
///
/// # Examples
///
/// ```no_run
/// use keel::{Executor, SqliteExecutor};
/// use keel::transaction::TransactionGuard;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = SqliteExecutor::open_in_memory()?;
/// let guard = TransactionGuard::begin(&executor)?;
/// executor.execute("CREATE TABLE t (x INTEGER)", &[])?;
/// guard.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct TransactionGuard<'a> {
    executor: &'a dyn Executor,
    owner: bool,
    finished: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a transaction, or join the one already open on the connection
    pub fn begin(executor: &'a dyn Executor) -> Result<Self, TransactionError> {
        if executor.in_transaction() {
            log::debug!("joining ambient transaction");
            return Ok(Self {
                executor,
                owner: false,
                finished: false,
            });
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        executor.begin_transaction().map_err(TransactionError::Begin)?;
        Ok(Self {
            executor,
            owner: true,
            finished: false,
        })
    }

    /// Whether this scope started the transaction
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Commit if this scope owns the transaction; a no-op for joined scopes
    pub fn commit(mut self) -> Result<(), TransactionError> {
        self.finished = true;
        if !self.owner {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        if let Err(e) = self.executor.commit() {
            // A failed COMMIT can leave the transaction open
            if self.executor.in_transaction() {
                if let Err(rollback) = self.executor.roll_back() {
                    log::error!("rollback after failed commit failed: {}", rollback);
                }
            }
            return Err(TransactionError::Commit(e));
        }
        Ok(())
    }

    /// Roll back if this scope owns the transaction; a no-op for joined scopes
    pub fn rollback(mut self) -> Result<(), ExecError> {
        self.finished = true;
        if !self.owner {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.executor.roll_back()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.owner && !self.finished {
            log::warn!("transaction scope dropped without commit; rolling back");
            if let Err(e) = self.executor.roll_back() {
                log::error!("rollback on drop failed: {}", e);
            }
        }
    }
}

/// Run `work` inside a transaction.
///
/// Commits on success. On failure rolls back and returns the original error;
/// if the rollback fails too, both are reported in
/// [`TransactionError::RollbackFailed`]. Inside an already-open transaction the
/// work simply runs in it.
pub fn run_in_transaction<T, F>(executor: &dyn Executor, work: F) -> Result<T, KeelError>
where
    F: FnOnce() -> Result<T, KeelError>,
{
    let guard = TransactionGuard::begin(executor)?;
    match work() {
        Ok(value) => {
            guard.commit()?;
            Ok(value)
        }
        Err(cause) => match guard.rollback() {
            Ok(()) => Err(cause),
            Err(rollback) => Err(TransactionError::RollbackFailed {
                cause: Box::new(cause),
                rollback,
            }
            .into()),
        },
    }
}
