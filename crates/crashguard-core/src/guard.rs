//! Serialization guard for fault handling
//!
//! At most one fault is processed at a time. The guard is made of atomics
//! only, so it can live in a `static` and be taken from a signal handler
//! without allocating. A second thread that faults while the first is being
//! handled spins (then yields) until the first reaches `Done`.
//!
//! The guard records its owner. A fault raised on the thread that already
//! holds the guard (the handler itself crashed) gets `Acquire::Reentrant`
//! instead of deadlocking against itself.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Owner value meaning "nobody"
const NO_OWNER: u64 = 0;

/// Spins before the waiter starts yielding its time slice
const SPINS_BEFORE_YIELD: u32 = 128;

/// Process-wide mutual exclusion for crash handling
pub struct FaultGuard {
    locked: AtomicBool,
    owner: AtomicU64,
}

/// Result of `FaultGuard::acquire`
#[must_use]
pub enum Acquire<'a> {
    /// Exclusive access; released when the token drops
    Acquired(FaultGuardToken<'a>),
    /// The calling thread already holds the guard
    Reentrant,
}

impl FaultGuard {
    #[inline]
    pub const fn new() -> Self {
        FaultGuard {
            locked: AtomicBool::new(false),
            owner: AtomicU64::new(NO_OWNER),
        }
    }

    /// Block until the guard is ours.
    ///
    /// `owner` identifies the calling thread and must be non-zero.
    pub fn acquire(&self, owner: u64) -> Acquire<'_> {
        debug_assert_ne!(owner, NO_OWNER);
        if self.owner.load(Ordering::Acquire) == owner {
            return Acquire::Reentrant;
        }

        let mut spin_count = 0u32;
        loop {
            if let Some(token) = self.try_acquire(owner) {
                return Acquire::Acquired(token);
            }

            while self.locked.load(Ordering::Relaxed) {
                spin_count = spin_count.saturating_add(1);
                if spin_count < SPINS_BEFORE_YIELD {
                    for _ in 0..spin_count.min(64) {
                        core::hint::spin_loop();
                    }
                } else {
                    // Holder may be sitting in a prompt for a long time
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Take the guard only if it is free right now
    #[inline]
    pub fn try_acquire(&self, owner: u64) -> Option<FaultGuardToken<'_>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(owner, Ordering::Release);
            Some(FaultGuardToken { guard: self })
        } else {
            None
        }
    }

    /// A fault is currently being handled
    #[inline]
    pub fn is_held(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn owner(&self) -> Option<u64> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            id => Some(id),
        }
    }
}

impl Default for FaultGuard {
    fn default() -> Self {
        FaultGuard::new()
    }
}

/// Proof of exclusive access; releases the guard on drop
pub struct FaultGuardToken<'a> {
    guard: &'a FaultGuard,
}

impl Drop for FaultGuardToken<'_> {
    #[inline]
    fn drop(&mut self) {
        self.guard.owner.store(NO_OWNER, Ordering::Release);
        self.guard.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_basic() {
        let guard = FaultGuard::new();
        {
            let token = guard.try_acquire(1);
            assert!(token.is_some());
            assert!(guard.is_held());
            assert_eq!(guard.owner(), Some(1));
            assert!(guard.try_acquire(2).is_none());
        }
        assert!(!guard.is_held());
        assert_eq!(guard.owner(), None);
    }

    #[test]
    fn test_same_owner_is_reentrant() {
        let guard = FaultGuard::new();
        let _outer = match guard.acquire(7) {
            Acquire::Acquired(token) => token,
            Acquire::Reentrant => panic!("first acquire must succeed"),
        };
        assert!(matches!(guard.acquire(7), Acquire::Reentrant));
    }

    #[test]
    fn test_second_holder_waits_for_first() {
        static GUARD: FaultGuard = FaultGuard::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for t in 1..=4u64 {
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let _token = match GUARD.acquire(t) {
                        Acquire::Acquired(token) => token,
                        Acquire::Reentrant => panic!("distinct threads are never reentrant"),
                    };
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(!GUARD.is_held());
    }
}
