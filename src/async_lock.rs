use crate::error::LockError;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

/// Task-suspending mutual exclusion for async code.
///
/// Behaves like `ExclusiveLock` but parks the task instead of the thread:
/// `acquire().await` resolves once the single permit is free. Waiters queue
/// in FIFO order, so no task starves.
pub struct AsyncExclusiveLock<T> {
    payload: UnsafeCell<T>,
    permits: Semaphore,
}

unsafe impl<T: Send> Send for AsyncExclusiveLock<T> {}
unsafe impl<T: Send> Sync for AsyncExclusiveLock<T> {}

impl<T> AsyncExclusiveLock<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload: UnsafeCell::new(payload),
            permits: Semaphore::new(1),
        }
    }

    /// Suspends the task until the lock is free, then returns the guard.
    pub async fn acquire(&self) -> AsyncLockGuard<'_, T> {
        match self.permits.acquire().await {
            Ok(permit) => AsyncLockGuard {
                lock: self,
                _permit: permit,
            },
            Err(_) => unreachable!("the lock never closes its semaphore"),
        }
    }

    /// Returns [`LockError::Busy`] instead of suspending.
    pub fn try_acquire(&self) -> Result<AsyncLockGuard<'_, T>, LockError> {
        match self.permits.try_acquire() {
            Ok(permit) => Ok(AsyncLockGuard {
                lock: self,
                _permit: permit,
            }),
            Err(TryAcquireError::NoPermits) => Err(LockError::Busy),
            Err(TryAcquireError::Closed) => unreachable!("the lock never closes its semaphore"),
        }
    }

    /// Waits at most `limit`; on expiry the lock's ownership is unchanged
    /// and [`LockError::TimedOut`] is returned.
    pub async fn acquire_timeout(
        &self,
        limit: Duration,
    ) -> Result<AsyncLockGuard<'_, T>, LockError> {
        tokio::time::timeout(limit, self.acquire())
            .await
            .map_err(|_| LockError::TimedOut)
    }
}

/// Exclusive access to the payload; releases the permit on drop.
pub struct AsyncLockGuard<'lock, T> {
    lock: &'lock AsyncExclusiveLock<T>,
    _permit: SemaphorePermit<'lock>,
}

impl<T> Deref for AsyncLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock's only permit.
        unsafe { &*self.lock.payload.get() }
    }
}

impl<T> DerefMut for AsyncLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock's only permit.
        unsafe { &mut *self.lock.payload.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::AsyncExclusiveLock;
    use crate::atomic::AtomicSharedCounted;
    use crate::error::LockError;
    use std::time::Duration;

    #[tokio::test]
    async fn cross_task_write_is_visible() {
        let lock = AtomicSharedCounted::new(AsyncExclusiveLock::new(0));
        let writer = lock.clone();
        tokio::spawn(async move {
            *writer.acquire().await = 10;
        })
        .await
        .unwrap();
        assert_eq!(*lock.acquire().await, 10);
    }

    #[tokio::test]
    async fn contended_increments_all_land() {
        let lock = AtomicSharedCounted::new(AsyncExclusiveLock::new(0usize));
        let mut tasks = vec![];
        for _ in 0..16 {
            let l = lock.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    *l.acquire().await += 1;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(*lock.acquire().await, 16_000);
    }

    #[tokio::test]
    async fn try_acquire_reports_busy() {
        let lock = AsyncExclusiveLock::new(());
        let guard = lock.try_acquire().unwrap();
        assert_eq!(lock.try_acquire().err(), Some(LockError::Busy));
        drop(guard);
        assert!(lock.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn timeout_leaves_lock_held() {
        let lock = AtomicSharedCounted::new(AsyncExclusiveLock::new(0));
        let holder = lock.clone();
        tokio::spawn(async move {
            let _guard = holder.acquire().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        tokio::task::yield_now().await;
        assert_eq!(
            lock.acquire_timeout(Duration::from_millis(20)).await.err(),
            Some(LockError::TimedOut)
        );
    }
}
