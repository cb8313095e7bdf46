//! Reader/Writer Exclusion
//!
//! [`Guarded`] owns a storage backend and only hands it out through lock
//! guards. Any number of read guards may be held at once; a write guard is
//! exclusive with every other guard. Guards release on drop, so early
//! returns, `?` and panics all leave the lock free.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value that can only be reached through a reader/writer lock.
#[derive(Debug, Default)]
pub struct Guarded<S> {
    inner: RwLock<S>,
}

impl<S> Guarded<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Acquires shared access, blocking while a writer holds the lock.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, S> {
        self.inner.read()
    }

    /// Acquires exclusive access, blocking until all other guards are gone.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.inner.write()
    }
}
