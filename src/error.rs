use thiserror::Error;

/// Why a runtime-checked borrow was refused.
///
/// Returned synchronously by `borrow_shared` and `borrow_exclusive` on
/// `BorrowTrackedCell`; the caller decides whether to retry, fall back, or
/// give up. A refused request leaves the cell's state untouched and is never
/// downgraded to a weaker grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BorrowConflict {
    /// An exclusive guard is live, so no access at all can be granted.
    #[error("payload is already borrowed for exclusive access")]
    HeldExclusive,
    /// One or more shared guards are live, blocking exclusive access.
    #[error("payload is already borrowed for shared access")]
    HeldShared,
}

/// Why a non-blocking or deadline-bounded lock acquisition did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock is held by another owner; returned by `try_acquire`.
    #[error("lock is held by another owner")]
    Busy,
    /// The deadline passed before the lock was released. Ownership of the
    /// lock is unchanged.
    #[error("lock was not released before the deadline")]
    TimedOut,
}
