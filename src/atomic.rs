use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering, fence};

struct AtomicSharedRecord<T> {
    payload: T,
    handles: AtomicUsize,
}

/// Atomically reference-counted shared ownership, safe across threads.
///
/// The same contract as `SharedCounted` — clone to share, payload destroyed
/// exactly once when the last handle drops — with the count maintained by
/// atomic read-modify-write operations, so handles may be cloned, used, and
/// dropped from any thread. Read access goes through `Deref`; for shared
/// mutable state across threads wrap the payload in a lock:
/// `AtomicSharedCounted<ExclusiveLock<T>>`.
pub struct AtomicSharedCounted<T> {
    record: NonNull<AtomicSharedRecord<T>>,
    _marker: PhantomData<AtomicSharedRecord<T>>,
}

unsafe impl<T: Send + Sync> Send for AtomicSharedCounted<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicSharedCounted<T> {}

impl<T> AtomicSharedCounted<T> {
    pub fn new(payload: T) -> Self {
        let record = Box::new(AtomicSharedRecord {
            payload,
            handles: AtomicUsize::new(1),
        });
        Self {
            // SAFETY: Box::into_raw never returns null.
            record: unsafe { NonNull::new_unchecked(Box::into_raw(record)) },
            _marker: PhantomData,
        }
    }

    /// Number of live handles at the moment of the call. Racing clones and
    /// drops can change it immediately; treat it as a snapshot.
    pub fn handle_count(&self) -> usize {
        self.record().handles.load(Ordering::Relaxed)
    }

    fn record(&self) -> &AtomicSharedRecord<T> {
        // SAFETY: the record is freed only by the handle that takes the
        // count to zero, and `self` still holds a count here.
        unsafe { self.record.as_ref() }
    }
}

impl<T> Clone for AtomicSharedCounted<T> {
    fn clone(&self) -> Self {
        // The new handle exists only after this increment; no payload
        // access is ordered by it, so relaxed is enough.
        self.record().handles.fetch_add(1, Ordering::Relaxed);
        Self {
            record: self.record,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for AtomicSharedCounted<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.record().payload
    }
}

impl<T> Drop for AtomicSharedCounted<T> {
    fn drop(&mut self) {
        if self.record().handles.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // Pairs with the release decrements above: the destroying thread
        // observes every write made through any other handle before that
        // handle's own decrement.
        fence(Ordering::Acquire);
        // SAFETY: the count reached zero and this is the only handle left.
        unsafe { drop(Box::from_raw(self.record.as_ptr())) };
    }
}

#[cfg(test)]
mod tests {
    use super::AtomicSharedCounted;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn destroys_exactly_once() {
        struct Probe<'a>(&'a AtomicUsize);
        impl Drop for Probe<'_> {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = AtomicUsize::new(0);
        {
            let a = AtomicSharedCounted::new(Probe(&drops));
            let b = a.clone();
            let c = b.clone();
            assert_eq!(a.handle_count(), 3);
            drop(a);
            drop(b);
            assert_eq!(drops.load(Ordering::SeqCst), 0);
            drop(c);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_read_across_threads() {
        let payload = AtomicSharedCounted::new(99);
        let mut workers = vec![];
        for _ in 0..16 {
            let handle = payload.clone();
            workers.push(thread::spawn(move || {
                assert_eq!(*handle, 99);
            }));
        }
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(payload.handle_count(), 1);
    }

    #[test]
    fn concurrent_clone_drop_destroys_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Probe;
        impl Drop for Probe {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let original = AtomicSharedCounted::new(Probe);
        let mut workers = vec![];
        for _ in 0..8 {
            let handle = original.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let extra = handle.clone();
                    drop(extra);
                }
            }));
        }
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);
        assert_eq!(original.handle_count(), 1);
        drop(original);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }
}
