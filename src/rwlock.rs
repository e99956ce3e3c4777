use crate::error::LockError;
use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicIsize, Ordering};

const FREE: isize = 0;
const WRITER: isize = -1;

/// Cross-thread shared or exclusive access to one payload.
///
/// The multi-threaded counterpart of `BorrowTrackedCell`: any number of
/// reader guards may be live at once, or a single writer guard, never both.
/// The blocking variants wait by spinning; when the payload is held for
/// longer stretches, prefer `ExclusiveLock`, which sleeps.
pub struct ReadWriteLock<T> {
    payload: UnsafeCell<T>,
    // FREE, WRITER, or the number of live readers.
    state: AtomicIsize,
}

unsafe impl<T: Send> Send for ReadWriteLock<T> {}
unsafe impl<T: Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload: UnsafeCell::new(payload),
            state: AtomicIsize::new(FREE),
        }
    }

    /// Spins until no writer is live, then returns a reader guard.
    pub fn acquire_shared(&self) -> SharedLockGuard<'_, T> {
        loop {
            match self.try_acquire_shared() {
                Ok(guard) => return guard,
                Err(_) => spin_loop(),
            }
        }
    }

    /// Returns a reader guard, or [`LockError::Busy`] while a writer is live.
    pub fn try_acquire_shared(&self) -> Result<SharedLockGuard<'_, T>, LockError> {
        self.state
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |s| {
                if s == WRITER { None } else { Some(s + 1) }
            })
            .map(|_| SharedLockGuard { lock: self })
            .map_err(|_| LockError::Busy)
    }

    /// Spins until no guard of any kind is live, then returns the writer
    /// guard.
    pub fn acquire_exclusive(&self) -> ExclusiveLockGuard<'_, T> {
        loop {
            match self.try_acquire_exclusive() {
                Ok(guard) => return guard,
                Err(_) => spin_loop(),
            }
        }
    }

    /// Returns the writer guard, or [`LockError::Busy`] while any reader or
    /// writer is live.
    pub fn try_acquire_exclusive(&self) -> Result<ExclusiveLockGuard<'_, T>, LockError> {
        self.state
            .compare_exchange(FREE, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| ExclusiveLockGuard { lock: self })
            .map_err(|_| LockError::Busy)
    }
}

impl<T> Drop for ReadWriteLock<T> {
    fn drop(&mut self) {
        if self.state.load(Ordering::Relaxed) != FREE {
            log::error!("read-write lock destroyed while guards are live");
            if !std::thread::panicking() {
                panic!("read-write lock destroyed while guards are live");
            }
        }
    }
}

/// Shared access to the payload; drops the reader count on release.
pub struct SharedLockGuard<'lock, T> {
    lock: &'lock ReadWriteLock<T>,
}

impl<T> Deref for SharedLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: no writer guard is live while readers hold the lock.
        unsafe { &*self.lock.payload.get() }
    }
}

impl<T> Drop for SharedLockGuard<'_, T> {
    fn drop(&mut self) {
        let readers = self.lock.state.fetch_sub(1, Ordering::Release);
        debug_assert!(readers >= 1);
    }
}

/// Exclusive access to the payload; frees the lock on release.
pub struct ExclusiveLockGuard<'lock, T> {
    lock: &'lock ReadWriteLock<T>,
}

impl<T> Deref for ExclusiveLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: this guard is the only live access path.
        unsafe { &*self.lock.payload.get() }
    }
}

impl<T> DerefMut for ExclusiveLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard is the only live access path.
        unsafe { &mut *self.lock.payload.get() }
    }
}

impl<T> Drop for ExclusiveLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(FREE, Ordering::Release);
    }
}
