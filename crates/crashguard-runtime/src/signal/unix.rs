//! Unix fault interception via `sigaction`
//!
//! One handler is registered for the synchronous fault signals plus SIGABRT.
//! It builds a `FaultContext` from the delivered `siginfo_t`/`ucontext_t`,
//! calls the registered dispatch function and then acts on its
//! `Disposition`:
//!
//! - `Terminate`: reset the signal to its default action and re-raise it, so
//!   the process dies the way it would have without us (core file, exit
//!   status).
//! - `ContinueSearch`: put the previous action back and hand the signal to
//!   it. A previous default/ignore disposition becomes default + re-raise.
//!
//! Registration happens once; later calls to `install` are no-ops.

use crashguard_core::engine::Disposition;
use crashguard_core::error::{CrashError, CrashResult};
use crashguard_core::fault::{FaultContext, FaultKind};
use crashguard_core::{kdebug, kerror};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::OnceLock;

use crate::thread::current_thread_id;

/// Called on every intercepted fault
pub type Dispatch = fn(&FaultContext) -> Disposition;

/// Signals the crash handler takes over
pub const FAULT_SIGNALS: [Signal; 6] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGABRT,
    Signal::SIGTRAP,
];

/// Actions that were in place before `install`
struct PreviousActions {
    actions: [(Signal, SigAction); FAULT_SIGNALS.len()],
}

impl PreviousActions {
    fn find(&self, sig: Signal) -> Option<&SigAction> {
        self.actions
            .iter()
            .find(|(s, _)| *s == sig)
            .map(|(_, action)| action)
    }
}

static DISPATCH: OnceLock<Dispatch> = OnceLock::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);
// Leaked on uninstall: a handler may still be reading it
static PREVIOUS: AtomicPtr<PreviousActions> = AtomicPtr::new(std::ptr::null_mut());

/// Register the fault handler for every signal in `FAULT_SIGNALS`.
///
/// `dispatch` is fixed by the first call. Returns `Ok(false)` when the
/// handler was already registered.
pub fn install(dispatch: Dispatch) -> CrashResult<bool> {
    let _ = DISPATCH.set(dispatch);

    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    let action = SigAction::new(
        SigHandler::SigAction(on_fault),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );

    let mut actions = [(Signal::SIGSEGV, action); FAULT_SIGNALS.len()];
    for (i, sig) in FAULT_SIGNALS.into_iter().enumerate() {
        match unsafe { sigaction(sig, &action) } {
            Ok(prev) => actions[i] = (sig, prev),
            Err(errno) => {
                kerror!("sigaction({}) failed: {}", sig, errno);
                for (sig, prev) in &actions[..i] {
                    let _ = unsafe { sigaction(*sig, prev) };
                }
                INSTALLED.store(false, Ordering::SeqCst);
                return Err(CrashError::Platform(errno as i32));
            }
        }
    }

    let boxed = Box::into_raw(Box::new(PreviousActions { actions }));
    PREVIOUS.store(boxed, Ordering::Release);

    kdebug!("fault handler registered for {} signals", FAULT_SIGNALS.len());
    Ok(true)
}

/// Restore the actions that were in place before `install`.
///
/// The caller must hold the serialization guard.
pub fn uninstall() -> CrashResult<()> {
    if !INSTALLED.load(Ordering::SeqCst) {
        return Err(CrashError::NotInstalled);
    }
    let previous = PREVIOUS.swap(std::ptr::null_mut(), Ordering::AcqRel);
    if !previous.is_null() {
        let previous = unsafe { &*previous };
        for (sig, action) in &previous.actions {
            unsafe { sigaction(*sig, action) }.map_err(|e| CrashError::Platform(e as i32))?;
        }
    }
    INSTALLED.store(false, Ordering::SeqCst);
    kdebug!("fault handler unregistered");
    Ok(())
}

/// Handler is currently registered
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Map a signal number onto a fault kind
pub fn fault_kind(sig: libc::c_int) -> FaultKind {
    match sig {
        libc::SIGSEGV => FaultKind::Segmentation,
        libc::SIGBUS => FaultKind::Bus,
        libc::SIGFPE => FaultKind::FloatingPoint,
        libc::SIGILL => FaultKind::IllegalInstruction,
        libc::SIGABRT => FaultKind::Abort,
        libc::SIGTRAP => FaultKind::Trap,
        other => FaultKind::Other(other),
    }
}

/// Build a `FaultContext` from what the kernel delivered
///
/// # Safety
///
/// `info` must be null or point at a valid `siginfo_t`.
pub unsafe fn fault_context(
    sig: libc::c_int,
    info: *const libc::siginfo_t,
    uctx: *const libc::c_void,
) -> FaultContext {
    let (code, address) = if info.is_null() {
        (0, 0)
    } else {
        ((*info).si_code, fault_address(&*info))
    };
    FaultContext {
        kind: fault_kind(sig),
        signal: sig,
        code,
        address,
        thread_id: current_thread_id(),
        info: info.cast(),
        machine_context: uctx,
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        unsafe fn fault_address(info: &libc::siginfo_t) -> usize {
            info.si_addr() as usize
        }
    } else {
        unsafe fn fault_address(info: &libc::siginfo_t) -> usize {
            info.si_addr as usize
        }
    }
}

extern "C" fn on_fault(sig: libc::c_int, info: *mut libc::siginfo_t, uctx: *mut libc::c_void) {
    let disposition = match DISPATCH.get() {
        Some(dispatch) => {
            let fault = unsafe { fault_context(sig, info, uctx) };
            dispatch(&fault)
        }
        None => Disposition::ContinueSearch,
    };

    match disposition {
        Disposition::Terminate => terminate_with_default(sig),
        Disposition::ContinueSearch => continue_search(sig, info, uctx),
    }
}

/// Default action, re-raised; delivered once the handler returns
fn terminate_with_default(sig: libc::c_int) {
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

fn continue_search(sig: libc::c_int, info: *mut libc::siginfo_t, uctx: *mut libc::c_void) {
    let previous = PREVIOUS.load(Ordering::Acquire);
    let signal = match Signal::try_from(sig) {
        Ok(signal) => signal,
        Err(_) => return terminate_with_default(sig),
    };
    let action = match unsafe { previous.as_ref() }.and_then(|p| p.find(signal)) {
        Some(action) => *action,
        None => return terminate_with_default(sig),
    };

    // Put it back first so a re-executed faulting instruction lands there
    let _ = unsafe { sigaction(signal, &action) };
    match action.handler() {
        SigHandler::SigAction(prev) => prev(sig, info, uctx),
        SigHandler::Handler(prev) => prev(sig),
        SigHandler::SigDfl | SigHandler::SigIgn => terminate_with_default(sig),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kind_mapping() {
        assert_eq!(fault_kind(libc::SIGSEGV), FaultKind::Segmentation);
        assert_eq!(fault_kind(libc::SIGBUS), FaultKind::Bus);
        assert_eq!(fault_kind(libc::SIGABRT), FaultKind::Abort);
        assert_eq!(fault_kind(libc::SIGUSR1), FaultKind::Other(libc::SIGUSR1));
    }

    #[test]
    fn test_fault_context_without_siginfo() {
        let ctx = unsafe { fault_context(libc::SIGFPE, std::ptr::null(), std::ptr::null()) };
        assert_eq!(ctx.kind, FaultKind::FloatingPoint);
        assert_eq!(ctx.signal, libc::SIGFPE);
        assert_eq!(ctx.address, 0);
        assert_ne!(ctx.thread_id, 0);
        assert!(!ctx.has_machine_context());
    }

    #[test]
    fn test_uninstall_without_install() {
        if !is_installed() {
            assert_eq!(uninstall(), Err(CrashError::NotInstalled));
        }
    }
}
