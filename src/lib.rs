//! Smart-pointer containers that decide, per value, who owns a heap payload
//! and when it may be mutated.
//!
//! Every container enforces the same rule: at most one mutable access path
//! to a payload may be live at any instant, across all owners.
//!
//! # Picking a container
//!
//! - [`ExclusiveBox`] — a single owner. Cleanup happens the moment the owner
//!   goes away, and access needs no runtime check because the handle cannot
//!   be duplicated, only moved.
//! - [`SharedCounted`] — several owners on one thread. A plain reference
//!   count keeps the payload alive until the last handle drops.
//! - [`AtomicSharedCounted`] — several owners across threads. The same
//!   contract with an atomic count.
//! - [`BorrowTrackedCell`] — mutation behind a shared handle, checked at
//!   runtime: any number of readers or a single writer, with conflicts
//!   reported as [`BorrowConflict`] instead of waiting.
//! - [`ExclusiveLock`] — mutation across threads: one holder at a time,
//!   waiters sleep until the current holder releases.
//! - [`ReadWriteLock`] — many readers or one writer, across threads.
//! - [`AsyncExclusiveLock`] — one task at a time; waiters yield to the
//!   async runtime instead of blocking the thread.
//!
//! Shared and mutable combine by nesting: `SharedCounted<BorrowTrackedCell<T>>`
//! on one thread, `AtomicSharedCounted<ExclusiveLock<T>>` across threads.
//!
//! ```
//! use custody::{BorrowTrackedCell, SharedCounted};
//!
//! let notes = SharedCounted::new(BorrowTrackedCell::new(vec!["first"]));
//! let editor = notes.clone();
//! editor.borrow_exclusive().unwrap().push("second");
//! assert_eq!(notes.borrow_shared().unwrap().len(), 2);
//! ```

mod async_lock;
mod atomic;
mod borrow;
mod boxed;
mod error;
mod lock;
mod rwlock;
mod shared;
mod state;

pub use async_lock::{AsyncExclusiveLock, AsyncLockGuard};
pub use atomic::AtomicSharedCounted;
pub use borrow::{BorrowTrackedCell, ExclusiveRef, SharedRef};
pub use boxed::ExclusiveBox;
pub use error::{BorrowConflict, LockError};
pub use lock::{ExclusiveLock, LockGuard};
pub use rwlock::{ExclusiveLockGuard, ReadWriteLock, SharedLockGuard};
pub use shared::SharedCounted;
