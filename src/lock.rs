use crate::error::LockError;
use crate::state::thread_token;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[cfg(target_os = "linux")]
use linux_futex::{Futex, Private};

const UNLOCKED: u32 = 0;
const HELD: u32 = 1;
// Held, with at least one waiter asleep on the word.
const HELD_CONTENDED: u32 = 2;

const NO_HOLDER: usize = 0;

/// A mutual exclusion lock granting one thread at a time scoped access to
/// the payload.
///
/// `acquire` puts the calling thread to sleep (a futex wait on Linux; a
/// yield loop elsewhere) until the holder releases, and releasing wakes
/// exactly one sleeping waiter. `try_acquire` and `acquire_timeout` report
/// [`LockError`] instead of waiting indefinitely.
///
/// Two misuses are detected rather than tolerated: a thread calling
/// `acquire` on a lock it already holds panics instead of deadlocking, and
/// destroying a lock that is still held (reachable only by leaking a guard)
/// panics from the destructor.
pub struct ExclusiveLock<T> {
    payload: UnsafeCell<T>,
    #[cfg(target_os = "linux")]
    word: Futex<Private>,
    #[cfg(not(target_os = "linux"))]
    word: AtomicU32,
    // thread_token of the current holder, NO_HOLDER when free.
    holder: AtomicUsize,
}

unsafe impl<T: Send> Send for ExclusiveLock<T> {}
unsafe impl<T: Send> Sync for ExclusiveLock<T> {}

impl<T> ExclusiveLock<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload: UnsafeCell::new(payload),
            #[cfg(target_os = "linux")]
            word: Futex::new(UNLOCKED),
            #[cfg(not(target_os = "linux"))]
            word: AtomicU32::new(UNLOCKED),
            holder: AtomicUsize::new(NO_HOLDER),
        }
    }

    /// Blocks until the lock is free, then returns the guard.
    pub fn acquire(&self) -> LockGuard<'_, T> {
        self.refuse_reacquire();
        if self
            .atom()
            .compare_exchange(UNLOCKED, HELD, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.atom().swap(HELD_CONTENDED, Ordering::Acquire) != UNLOCKED {
                self.sleep();
            }
        }
        self.mark_held()
    }

    /// Returns [`LockError::Busy`] instead of waiting. Unlike `acquire`,
    /// calling this on a lock the thread already holds simply reports Busy.
    pub fn try_acquire(&self) -> Result<LockGuard<'_, T>, LockError> {
        match self
            .atom()
            .compare_exchange(UNLOCKED, HELD, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Ok(self.mark_held()),
            Err(_) => Err(LockError::Busy),
        }
    }

    /// Waits at most `limit` for the lock. On timeout the lock's ownership
    /// is unchanged and [`LockError::TimedOut`] is returned.
    pub fn acquire_timeout(&self, limit: Duration) -> Result<LockGuard<'_, T>, LockError> {
        self.refuse_reacquire();
        let deadline = Instant::now() + limit;
        while self.atom().swap(HELD_CONTENDED, Ordering::Acquire) != UNLOCKED {
            if Instant::now() >= deadline {
                return Err(LockError::TimedOut);
            }
            self.sleep_until(deadline);
        }
        Ok(self.mark_held())
    }

    fn refuse_reacquire(&self) {
        if self.holder.load(Ordering::Relaxed) == thread_token() {
            log::error!("thread re-acquired an exclusive lock it already holds");
            panic!("thread re-acquired an exclusive lock it already holds");
        }
    }

    fn mark_held(&self) -> LockGuard<'_, T> {
        self.holder.store(thread_token(), Ordering::Relaxed);
        LockGuard { lock: self }
    }

    #[cfg(target_os = "linux")]
    fn atom(&self) -> &AtomicU32 {
        &self.word.value
    }

    #[cfg(not(target_os = "linux"))]
    fn atom(&self) -> &AtomicU32 {
        &self.word
    }

    #[cfg(target_os = "linux")]
    fn sleep(&self) {
        // Returns immediately if the word is no longer HELD_CONTENDED.
        let _ = self.word.wait(HELD_CONTENDED);
    }

    #[cfg(not(target_os = "linux"))]
    fn sleep(&self) {
        std::thread::yield_now();
    }

    #[cfg(target_os = "linux")]
    fn sleep_until(&self, deadline: Instant) {
        if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let _ = self.word.wait_for(HELD_CONTENDED, remaining);
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn sleep_until(&self, _deadline: Instant) {
        std::thread::yield_now();
    }

    #[cfg(target_os = "linux")]
    fn wake_next(&self) {
        self.word.wake(1);
    }

    #[cfg(not(target_os = "linux"))]
    fn wake_next(&self) {}
}

impl<T> Drop for ExclusiveLock<T> {
    fn drop(&mut self) {
        if self.atom().load(Ordering::Relaxed) != UNLOCKED {
            log::error!("exclusive lock destroyed while still held");
            if !std::thread::panicking() {
                panic!("exclusive lock destroyed while still held");
            }
        }
    }
}

/// Exclusive access to the payload; unlocks on drop, waking one waiter.
pub struct LockGuard<'lock, T> {
    lock: &'lock ExclusiveLock<T>,
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard is the proof of exclusive access.
        unsafe { &*self.lock.payload.get() }
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard is the proof of exclusive access.
        unsafe { &mut *self.lock.payload.get() }
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.holder.store(NO_HOLDER, Ordering::Relaxed);
        if self.lock.atom().swap(UNLOCKED, Ordering::Release) == HELD_CONTENDED {
            self.lock.wake_next();
        }
    }
}
