//! Cooperative mutex
use core::sync::atomic::{AtomicBool, Ordering};

/// A yield-based lock word: free or held, nothing else.
///
/// There's no owner tracking. Exclusion only holds among cothreads of one
/// core, and only because a cothread runs uninterrupted (by other cothreads)
/// between two yield points. It says nothing about the other core.
#[derive(Debug, Default)]
pub struct RawComutex {
    held: AtomicBool,
}

impl RawComutex {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Test-and-set the word. Returns `true` iff it was free.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    /// Call `yield_now` between attempts until the word is acquired.
    pub fn acquire_with(&self, mut yield_now: impl FnMut()) {
        while !self.try_acquire() {
            yield_now();
        }
    }

    /// Clear the word, whoever holds it.
    #[inline]
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_is_exclusive() {
        let m = RawComutex::new();
        assert!(m.try_acquire());
        assert!(!m.try_acquire());
        assert!(m.is_held());
        m.release();
        assert!(!m.is_held());
        assert!(m.try_acquire());
    }

    #[test]
    fn acquire_yields_until_free() {
        let m = RawComutex::new();
        assert!(m.try_acquire());
        let mut yields = 0;
        m.acquire_with(|| {
            yields += 1;
            if yields == 3 {
                // Another cothread releases the lock while we are suspended
                m.release();
            }
        });
        assert_eq!(yields, 3);
        assert!(m.is_held());
    }
}
