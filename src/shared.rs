use crate::state::StateCell;
#[cfg(debug_assertions)]
use crate::state::thread_token;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

struct SharedRecord<T> {
    payload: T,
    handles: StateCell<usize>,
    #[cfg(debug_assertions)]
    home: usize,
}

/// Non-atomic reference-counted shared ownership, for a single thread.
///
/// Cloning a `SharedCounted<T>` hands out another handle to the same heap
/// payload and bumps a plain count; dropping a handle decrements it, and the
/// payload is destroyed exactly once, when the last handle goes away. Access
/// is read-only through `Deref` — to mutate a shared payload, wrap it in a
/// borrow-tracked cell: `SharedCounted<BorrowTrackedCell<T>>`.
///
/// The count is deliberately not thread-safe, which makes clone and drop as
/// cheap as an integer add. The type is `!Send` and `!Sync`, so safe code
/// cannot move a handle across threads. Debug builds additionally verify
/// every operation runs on the thread that created the allocation, so misuse
/// smuggled in through unsafe code panics instead of corrupting the count.
pub struct SharedCounted<T> {
    record: NonNull<SharedRecord<T>>,
    _marker: PhantomData<SharedRecord<T>>,
}

impl<T> SharedCounted<T> {
    pub fn new(payload: T) -> Self {
        let record = Box::new(SharedRecord {
            payload,
            handles: StateCell::new(1),
            #[cfg(debug_assertions)]
            home: thread_token(),
        });
        Self {
            // SAFETY: Box::into_raw never returns null.
            record: unsafe { NonNull::new_unchecked(Box::into_raw(record)) },
            _marker: PhantomData,
        }
    }

    /// Number of live handles sharing the payload.
    pub fn handle_count(&self) -> usize {
        self.record().handles.get()
    }

    fn record(&self) -> &SharedRecord<T> {
        #[cfg(debug_assertions)]
        if self.on_foreign_thread() {
            log::error!("non-atomic shared handle used from a foreign thread");
            panic!("non-atomic shared handle used from a foreign thread");
        }
        // SAFETY: the record is freed only by the drop of the last handle,
        // and `self` is still a live handle here.
        unsafe { self.record.as_ref() }
    }

    #[cfg(debug_assertions)]
    fn on_foreign_thread(&self) -> bool {
        // SAFETY: only reads `home`, which is written once in `new`.
        unsafe { self.record.as_ref() }.home != thread_token()
    }
}

impl<T> Clone for SharedCounted<T> {
    fn clone(&self) -> Self {
        self.record().handles.update(|n| n + 1);
        Self {
            record: self.record,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for SharedCounted<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.record().payload
    }
}

impl<T> Drop for SharedCounted<T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        if self.on_foreign_thread() {
            log::error!("non-atomic shared handle dropped on a foreign thread; leaking the handle");
            if std::thread::panicking() {
                return;
            }
            panic!("non-atomic shared handle dropped on a foreign thread");
        }
        // SAFETY: the record outlives this handle; single-threaded by
        // construction, so nothing else touches the count during this call.
        let remaining = unsafe { self.record.as_ref() }.handles.update(|n| n - 1);
        if remaining == 0 {
            // SAFETY: this was the last handle, so nothing can reach the
            // record after this point. Reclaiming the box drops payload and
            // record together.
            unsafe { drop(Box::from_raw(self.record.as_ptr())) };
        }
    }
}
