//! Fault context handed to the pipeline
//!
//! The platform layer fills this in from whatever the OS delivered
//! (`siginfo_t`/`ucontext_t` on Unix). The core never dereferences the raw
//! pointers; it only forwards them to the snapshot writer.

use core::ffi::c_void;
use core::fmt;

/// Kind of fault that was intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Invalid memory access (SIGSEGV)
    Segmentation,
    /// Misaligned or unmapped bus access (SIGBUS)
    Bus,
    /// Arithmetic fault (SIGFPE)
    FloatingPoint,
    /// Illegal instruction (SIGILL)
    IllegalInstruction,
    /// Abnormal termination (SIGABRT)
    Abort,
    /// Breakpoint or trace trap (SIGTRAP)
    Trap,
    /// No fault; a snapshot was requested by the application
    Requested,
    /// Anything else, keeping the raw number
    Other(i32),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Segmentation => write!(f, "segmentation fault"),
            FaultKind::Bus => write!(f, "bus error"),
            FaultKind::FloatingPoint => write!(f, "arithmetic fault"),
            FaultKind::IllegalInstruction => write!(f, "illegal instruction"),
            FaultKind::Abort => write!(f, "abort"),
            FaultKind::Trap => write!(f, "trace trap"),
            FaultKind::Requested => write!(f, "requested snapshot"),
            FaultKind::Other(n) => write!(f, "signal {}", n),
        }
    }
}

/// Ephemeral description of one fault, valid only while it is handled
#[derive(Clone, Copy)]
pub struct FaultContext {
    pub kind: FaultKind,
    /// Raw signal number (0 for requested snapshots)
    pub signal: i32,
    /// Signal-specific code (`si_code`)
    pub code: i32,
    /// Faulting address, when the OS reports one
    pub address: usize,
    /// OS thread id of the faulting thread
    pub thread_id: u64,
    /// Opaque `siginfo_t` pointer, may be null
    pub info: *const c_void,
    /// Opaque machine context (`ucontext_t`) pointer, may be null
    pub machine_context: *const c_void,
}

// Only ever read on the faulting thread; the raw pointers are never
// dereferenced by the core.
unsafe impl Send for FaultContext {}
unsafe impl Sync for FaultContext {}

impl FaultContext {
    /// Context for an application-requested snapshot (no real fault)
    pub fn requested(thread_id: u64) -> Self {
        FaultContext {
            kind: FaultKind::Requested,
            signal: 0,
            code: 0,
            address: 0,
            thread_id,
            info: core::ptr::null(),
            machine_context: core::ptr::null(),
        }
    }

    #[inline]
    pub fn has_machine_context(&self) -> bool {
        !self.machine_context.is_null()
    }
}

impl fmt::Debug for FaultContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultContext")
            .field("kind", &self.kind)
            .field("signal", &self.signal)
            .field("code", &self.code)
            .field("address", &format_args!("{:#x}", self.address))
            .field("thread_id", &self.thread_id)
            .finish()
    }
}
