//! Alternate signal stack
//!
//! A stack overflow faults on the guard page of the thread's own stack; the
//! handler can only run if the kernel has somewhere else to put its frame.
//! Each thread that wants overflow reports needs its own alternate stack.
//!
//! An existing stack is kept only when it is at least `ALT_STACK_SIZE`.
//! Smaller ones (the Rust runtime installs a few KiB per thread) are swapped
//! for ours and put back on release.
//!
//! Layout of one mapping (low to high):
//!
//! ```text
//! [ guard page (PROT_NONE) | stack (PROT_READ|PROT_WRITE) ]
//! ```

use crashguard_core::error::{CrashError, CrashResult};
use crashguard_core::kdebug;
use std::cell::Cell;

/// Usable size of each alternate stack
pub const ALT_STACK_SIZE: usize = 64 * 1024;

/// A stack this module mapped, plus what it replaced
#[derive(Clone, Copy)]
struct OwnedStack {
    base: *mut libc::c_void,
    previous: libc::stack_t,
}

thread_local! {
    static ALT_STACK: Cell<Option<OwnedStack>> = const { Cell::new(None) };
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn is_enabled(stack: &libc::stack_t) -> bool {
    stack.ss_flags & libc::SS_DISABLE == 0
}

/// Give the calling thread an alternate signal stack of at least
/// `ALT_STACK_SIZE` bytes.
///
/// Returns `Ok(false)` if the thread already has one that large.
pub fn ensure_current_thread() -> CrashResult<bool> {
    if ALT_STACK.with(|slot| slot.get()).is_some() {
        return Ok(false);
    }
    let mut current: libc::stack_t = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaltstack(std::ptr::null(), &mut current) } != 0 {
        return Err(CrashError::Platform(errno()));
    }
    if is_enabled(&current) && current.ss_size >= ALT_STACK_SIZE {
        return Ok(false);
    }

    let guard = page_size();
    let total = guard + ALT_STACK_SIZE;
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            total,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(CrashError::Platform(errno()));
    }

    // Overflowing the alternate stack must fault, not scribble
    if unsafe { libc::mprotect(base, guard, libc::PROT_NONE) } != 0 {
        let err = errno();
        unsafe { libc::munmap(base, total) };
        return Err(CrashError::Platform(err));
    }

    let stack = libc::stack_t {
        ss_sp: unsafe { base.cast::<u8>().add(guard) }.cast(),
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    if unsafe { libc::sigaltstack(&stack, std::ptr::null_mut()) } != 0 {
        let err = errno();
        unsafe { libc::munmap(base, total) };
        return Err(CrashError::Platform(err));
    }

    ALT_STACK.with(|slot| slot.set(Some(OwnedStack { base, previous: current })));
    if is_enabled(&current) {
        kdebug!(
            "alternate signal stack of {} bytes replaced one of {} bytes",
            ALT_STACK_SIZE,
            current.ss_size
        );
    } else {
        kdebug!("alternate signal stack of {} bytes installed", ALT_STACK_SIZE);
    }
    Ok(true)
}

/// Remove the calling thread's alternate stack if this module created it,
/// putting back the one it replaced
pub fn release_current_thread() {
    let owned = match ALT_STACK.with(|slot| slot.take()) {
        Some(owned) => owned,
        None => return,
    };
    let restore = if is_enabled(&owned.previous) {
        libc::stack_t {
            ss_sp: owned.previous.ss_sp,
            ss_flags: 0,
            ss_size: owned.previous.ss_size,
        }
    } else {
        libc::stack_t {
            ss_sp: std::ptr::null_mut(),
            ss_flags: libc::SS_DISABLE,
            ss_size: 0,
        }
    };
    unsafe {
        if libc::sigaltstack(&restore, std::ptr::null_mut()) == 0 {
            libc::munmap(owned.base, page_size() + ALT_STACK_SIZE);
        }
    }
}
