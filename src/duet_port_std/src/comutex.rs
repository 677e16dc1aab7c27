//! Cooperative mutexes
use duet_kernel::comutex::RawComutex;
use std::fmt;

use crate::sched;

/// A mutual exclusion primitive for cothreads of one core. Waiting is done by
/// yielding, so a cothread blocked on a `Comutex` doesn't hold up the others.
///
/// The lock word isn't tied to an owner; releasing a `Comutex` that some
/// other cothread acquired is allowed (and is how the raw API has always
/// worked).
///
/// Each core has one `Comutex` per channel, available through
/// [`Fifo::channel_mutex`](crate::Fifo::channel_mutex), for serializing
/// multi-message exchanges on a channel.
#[derive(Default)]
pub struct Comutex {
    raw: RawComutex,
}

impl Comutex {
    pub const fn new() -> Self {
        Self {
            raw: RawComutex::new(),
        }
    }

    /// Acquire the mutex if it's free. Returns `true` on success.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.raw.try_acquire()
    }

    /// Acquire the mutex, yielding until it becomes free.
    ///
    /// Outside a cothread, yielding does nothing and this spins until a
    /// cothread releases the mutex.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is held and the caller is a FIFO handler. A
    /// handler can't yield, so the holder would never get to release it. Use
    /// [`Self::try_acquire`] there.
    pub fn acquire(&self) {
        if self.raw.try_acquire() {
            return;
        }
        assert!(
            !sched::in_handler(),
            "a FIFO handler tried to wait for a held Comutex"
        );
        self.raw.acquire_with(sched::yield_now);
    }

    #[inline]
    pub fn release(&self) {
        self.raw.release();
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.raw.is_held()
    }

    /// Acquire the mutex and return a guard that releases it when dropped.
    pub fn lock(&self) -> ComutexGuard<'_> {
        self.acquire();
        ComutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<ComutexGuard<'_>> {
        self.try_acquire().then(|| ComutexGuard { mutex: self })
    }
}

impl fmt::Debug for Comutex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Comutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Releases a [`Comutex`] when dropped.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct ComutexGuard<'a> {
    mutex: &'a Comutex,
}

impl Drop for ComutexGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.release();
    }
}

impl fmt::Debug for ComutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ComutexGuard")
    }
}
