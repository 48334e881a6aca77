//! Types for working with errors produced by the transaction engine.

use std::error::Error as StdError;

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents all the ways a transactional operation can fail.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A propagation behavior was requested that is incompatible with the
    /// presence (or absence) of an existing transaction, or an operation was
    /// attempted on an already-completed status.
    #[error("illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// `timeoutSeconds` was less than the `DEFAULT` sentinel (-1).
    #[error("invalid transaction timeout: {0}")]
    InvalidTimeout(i32),

    /// `NESTED` propagation was requested but nesting is disallowed by
    /// policy, or the resource adapter cannot provide savepoints.
    #[error("nested transactions are not supported: {0}")]
    NestedTransactionNotSupported(String),

    /// The resource adapter refused `doSuspend`/`doResume`.
    #[error("transaction suspension is not supported by this resource adapter")]
    TransactionSuspensionNotSupported,

    /// A second resource holder was bound under an already-bound factory
    /// key in the ambient context.
    #[error("a resource is already bound for this key")]
    DuplicateResourceBinding,

    /// Commit was requested on a transaction that was, or became, marked
    /// rollback-only; the engine rolled it back instead and surfaces this
    /// so the caller can distinguish it from an ordinary successful commit.
    #[error("transaction was rolled back because it was marked rollback-only")]
    UnexpectedRollback,

    /// Failure reported by the resource adapter (begin/commit/rollback/
    /// suspend/resume/set-rollback-only/cleanup). The engine does not
    /// interpret this error, only forwards it.
    #[error("resource adapter operation failed: {0}")]
    Adapter(#[source] Box<dyn StdError + Send + Sync>),

    /// A synchronization callback raised an error during `beforeCommit` or
    /// `beforeCompletion`, aborting the commit.
    #[error("synchronization callback failed: {0}")]
    Synchronization(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wrap an adapter-reported failure.
    pub fn adapter<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Adapter(Box::new(err))
    }

    /// Wrap a synchronization callback failure.
    pub fn synchronization<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Synchronization(Box::new(err))
    }

    /// `true` for the subset of variants that mean "the scope was rolled
    /// back, possibly not at the caller's request".
    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(self, Error::UnexpectedRollback)
    }
}
