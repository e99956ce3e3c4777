use crate::error::BorrowConflict;
use crate::state::StateCell;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Copy, Clone)]
enum BorrowState {
    Unborrowed,
    SharedBorrowed(usize),
    ExclusiveBorrowed,
}

/// Interior mutability with borrow rules enforced at runtime.
///
/// A `BorrowTrackedCell<T>` looks immutable from the outside but grants
/// scoped access to its payload through guards: any number of concurrent
/// readers, or a single writer, never both. Each request is a synchronous
/// check against the cell's current state — nothing waits, and a conflicting
/// request fails with [`BorrowConflict`] at the point of conflict, the
/// runtime analogue of a compile-time borrow check.
///
/// The cell is single-threaded (`!Sync`); for the same discipline across
/// threads use `ReadWriteLock`.
pub struct BorrowTrackedCell<T> {
    payload: UnsafeCell<T>,
    state: StateCell<BorrowState>,
}

impl<T> BorrowTrackedCell<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload: UnsafeCell::new(payload),
            state: StateCell::new(BorrowState::Unborrowed),
        }
    }

    /// Grants read-only access unless an exclusive guard is live.
    pub fn borrow_shared(&self) -> Result<SharedRef<'_, T>, BorrowConflict> {
        match self.state.get() {
            BorrowState::ExclusiveBorrowed => Err(BorrowConflict::HeldExclusive),
            BorrowState::SharedBorrowed(readers) => {
                // SAFETY: no exclusive guard is live.
                self.state.set(BorrowState::SharedBorrowed(readers + 1));
                Ok(SharedRef { cell: self })
            }
            BorrowState::Unborrowed => {
                // SAFETY: no guard of any kind is live.
                self.state.set(BorrowState::SharedBorrowed(1));
                Ok(SharedRef { cell: self })
            }
        }
    }

    /// Grants read-write access only while no other guard is live.
    ///
    /// The state is checked and transitioned in one step; a request made
    /// while any shared guard is still outstanding fails, even if releases
    /// are about to bring the reader count to zero.
    pub fn borrow_exclusive(&self) -> Result<ExclusiveRef<'_, T>, BorrowConflict> {
        match self.state.get() {
            BorrowState::ExclusiveBorrowed => Err(BorrowConflict::HeldExclusive),
            BorrowState::SharedBorrowed(_) => Err(BorrowConflict::HeldShared),
            BorrowState::Unborrowed => {
                // SAFETY: no guard is live, so handing out the sole access
                // path is sound.
                self.state.set(BorrowState::ExclusiveBorrowed);
                Ok(ExclusiveRef { cell: self })
            }
        }
    }
}

/// Read-only access to the payload; releases the shared borrow on drop.
pub struct SharedRef<'cell, T> {
    cell: &'cell BorrowTrackedCell<T>,
}

impl<T> Deref for SharedRef<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the cell granted shared access, so no exclusive guard is
        // live while `self` exists.
        unsafe { &*self.cell.payload.get() }
    }
}

impl<T> Drop for SharedRef<'_, T> {
    fn drop(&mut self) {
        match self.cell.state.get() {
            BorrowState::SharedBorrowed(1) => self.cell.state.set(BorrowState::Unborrowed),
            BorrowState::SharedBorrowed(readers) => {
                self.cell.state.set(BorrowState::SharedBorrowed(readers - 1))
            }
            BorrowState::Unborrowed | BorrowState::ExclusiveBorrowed => {
                unreachable!("live shared guard outside a shared borrow")
            }
        }
    }
}

/// Read-write access to the payload; releases the exclusive borrow on drop.
pub struct ExclusiveRef<'cell, T> {
    cell: &'cell BorrowTrackedCell<T>,
}

impl<T> Deref for ExclusiveRef<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the cell granted exclusive access to this guard alone.
        unsafe { &*self.cell.payload.get() }
    }
}

impl<T> DerefMut for ExclusiveRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the cell granted exclusive access to this guard alone.
        unsafe { &mut *self.cell.payload.get() }
    }
}

impl<T> Drop for ExclusiveRef<'_, T> {
    fn drop(&mut self) {
        self.cell.state.set(BorrowState::Unborrowed);
    }
}

#[cfg(test)]
mod tests {
    use super::BorrowTrackedCell;
    use crate::error::BorrowConflict;
    use crate::shared::SharedCounted;

    #[test]
    fn readers_stack() {
        let cell = BorrowTrackedCell::new(5);
        let first = cell.borrow_shared().unwrap();
        let second = cell.borrow_shared().unwrap();
        assert_eq!(*first, 5);
        assert_eq!(*second, 5);
    }

    #[test]
    fn writer_excludes_everyone() {
        let cell = BorrowTrackedCell::new(0);
        let writer = cell.borrow_exclusive().unwrap();
        assert_eq!(cell.borrow_exclusive().err(), Some(BorrowConflict::HeldExclusive));
        assert_eq!(cell.borrow_shared().err(), Some(BorrowConflict::HeldExclusive));
        drop(writer);
        assert!(cell.borrow_shared().is_ok());
    }

    #[test]
    fn readers_block_writer() {
        let cell = BorrowTrackedCell::new(0);
        let reader = cell.borrow_shared().unwrap();
        assert_eq!(cell.borrow_exclusive().err(), Some(BorrowConflict::HeldShared));
        drop(reader);
        assert!(cell.borrow_exclusive().is_ok());
    }

    #[test]
    fn exclusive_refused_until_every_reader_is_gone() {
        let cell = BorrowTrackedCell::new(0);
        let first = cell.borrow_shared().unwrap();
        let second = cell.borrow_shared().unwrap();
        drop(first);
        assert_eq!(cell.borrow_exclusive().err(), Some(BorrowConflict::HeldShared));
        drop(second);
        assert!(cell.borrow_exclusive().is_ok());
    }

    #[test]
    fn write_then_read_back() {
        let cell = BorrowTrackedCell::new(0);
        let mut writer = cell.borrow_exclusive().unwrap();
        *writer = 5;
        assert_eq!(cell.borrow_exclusive().err(), Some(BorrowConflict::HeldExclusive));
        drop(writer);
        assert_eq!(*cell.borrow_shared().unwrap(), 5);
    }

    #[test]
    fn shared_handles_mutate_through_cell() {
        let notes = SharedCounted::new(BorrowTrackedCell::new(vec![1]));
        let editor = notes.clone();
        editor.borrow_exclusive().unwrap().push(2);
        assert_eq!(*notes.borrow_shared().unwrap(), vec![1, 2]);
    }
}
