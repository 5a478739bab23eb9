//! OS thread identity
//!
//! The fault guard records its owner by OS thread id so a fault raised
//! while the same thread is already reporting can be recognized. Ids are
//! never zero.

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// Kernel thread id of the calling thread
        #[inline]
        pub fn current_thread_id() -> u64 {
            unsafe { libc::syscall(libc::SYS_gettid) as u64 }
        }
    } else if #[cfg(target_os = "macos")] {
        /// Kernel thread id of the calling thread
        #[inline]
        pub fn current_thread_id() -> u64 {
            let mut tid: u64 = 0;
            unsafe { libc::pthread_threadid_np(0, &mut tid) };
            tid
        }
    } else if #[cfg(unix)] {
        #[inline]
        pub fn current_thread_id() -> u64 {
            unsafe { libc::pthread_self() as u64 }
        }
    } else {
        use std::cell::Cell;
        use std::sync::atomic::{AtomicU64, Ordering};

        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        thread_local! {
            static THREAD_ID: Cell<u64> = const { Cell::new(0) };
        }

        /// Process-unique id handed out on first use
        pub fn current_thread_id() -> u64 {
            THREAD_ID.with(|id| {
                if id.get() == 0 {
                    id.set(NEXT_ID.fetch_add(1, Ordering::Relaxed));
                }
                id.get()
            })
        }
    }
}

/// Process id
#[inline]
pub fn current_process_id() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_nonzero_and_stable() {
        let id = current_thread_id();
        assert_ne!(id, 0);
        assert_eq!(id, current_thread_id());
    }

    #[test]
    fn test_thread_ids_differ_across_threads() {
        let main = current_thread_id();
        let other = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(main, other);
    }
}
