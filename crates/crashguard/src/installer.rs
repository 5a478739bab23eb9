//! Process-wide installation of the reporter
//!
//! One reporter is installed at a time. It lives behind a raw pointer in a
//! static so the signal handler can reach it without locking anything but
//! the fault guard. Every read of the pointer from the fault path, and
//! every swap of it from `configure`/`uninstall`, happens while the guard
//! is held.

use crashguard_core::engine::{trace_state, Disposition, HandlingState, Outcome, Reporter};
use crashguard_core::error::{CrashError, CrashResult};
use crashguard_core::fault::FaultContext;
use crashguard_core::guard::{Acquire, FaultGuard};
use crashguard_core::policy::PolicyConfiguration;
use crashguard_core::traits::{FaultHandler, FileSystem, Prompt, SnapshotWriter, Transport};
use crashguard_core::{kdebug, kerror, kinfo, kprint, kwarn};
use crashguard_runtime::{
    current_thread_id, signal, ContextRecordWriter, DisabledTransport, OsFileSystem, TtyPrompt,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicPtr, Ordering};

/// Reporter built by `configure`
pub type DefaultReporter = Reporter<ContextRecordWriter, OsFileSystem, DisabledTransport, TtyPrompt>;

struct Installed {
    handler: Box<dyn FaultHandler>,
}

static GUARD: FaultGuard = FaultGuard::new();
static INSTALLED: AtomicPtr<Installed> = AtomicPtr::new(std::ptr::null_mut());

/// Install crash handling with the default collaborators.
///
/// Safe to call again: the new policy replaces the old one.
pub fn configure(policy: PolicyConfiguration) -> CrashResult<()> {
    configure_with(
        policy,
        ContextRecordWriter::new(),
        OsFileSystem::new(),
        DisabledTransport,
        TtyPrompt::new(),
    )
}

/// Install crash handling with injected collaborators
pub fn configure_with<S, F, T, P>(
    policy: PolicyConfiguration,
    writer: S,
    fs: F,
    transport: T,
    prompt: P,
) -> CrashResult<()>
where
    S: SnapshotWriter + 'static,
    F: FileSystem + 'static,
    T: Transport + 'static,
    P: Prompt + 'static,
{
    kprint::init();
    let reporter = Reporter::new(policy, writer, fs, transport, prompt)?;
    kinfo!(
        "crash reporting for {} {} ({})",
        reporter.policy().app_name,
        reporter.policy().app_version,
        reporter.policy().actions
    );
    install_handler(Box::new(reporter))
}

fn install_handler(handler: Box<dyn FaultHandler>) -> CrashResult<()> {
    let fresh = Box::into_raw(Box::new(Installed { handler }));
    let previous = match swap_installed(fresh) {
        Ok(previous) => previous,
        Err(e) => {
            drop(unsafe { Box::from_raw(fresh) });
            return Err(e);
        }
    };
    if !previous.is_null() {
        kdebug!("replacing installed reporter");
        drop(unsafe { Box::from_raw(previous) });
    }

    if let Err(e) = signal::install(dispatch) {
        kerror!("cannot register fault handler: {}", e);
        if let Ok(ours) = swap_installed(std::ptr::null_mut()) {
            if !ours.is_null() {
                drop(unsafe { Box::from_raw(ours) });
            }
        }
        return Err(e);
    }

    if let Err(e) = prepare_thread() {
        kwarn!("no alternate signal stack, stack overflows will not be reported: {}", e);
    }
    Ok(())
}

/// Give the calling thread an alternate signal stack the pipeline fits on.
///
/// `configure` does this for its own thread. Returns `Ok(false)` when the
/// thread already had a large enough one.
#[cfg(unix)]
pub fn prepare_thread() -> CrashResult<bool> {
    crashguard_runtime::altstack::ensure_current_thread()
}

#[cfg(not(unix))]
pub fn prepare_thread() -> CrashResult<bool> {
    Ok(false)
}

/// Undo `prepare_thread`, putting back the stack it replaced
pub fn release_thread() {
    #[cfg(unix)]
    crashguard_runtime::altstack::release_current_thread();
}

/// Publish `next` under the guard, returning what it replaced
fn swap_installed(next: *mut Installed) -> CrashResult<*mut Installed> {
    let _token = match GUARD.acquire(current_thread_id()) {
        Acquire::Acquired(token) => token,
        Acquire::Reentrant => return Err(CrashError::Busy),
    };
    Ok(INSTALLED.swap(next, Ordering::AcqRel))
}

/// Restore the previous fault handlers and drop the reporter.
///
/// Fails with `Busy` instead of waiting if a fault is being handled.
pub fn uninstall() -> CrashResult<()> {
    let token = GUARD
        .try_acquire(current_thread_id())
        .ok_or(CrashError::Busy)?;
    signal::uninstall()?;
    let previous = INSTALLED.swap(std::ptr::null_mut(), Ordering::AcqRel);
    drop(token);

    if !previous.is_null() {
        drop(unsafe { Box::from_raw(previous) });
    }
    release_thread();
    kinfo!("crash reporting uninstalled");
    Ok(())
}

/// Crash handling is active
pub fn is_installed() -> bool {
    signal::is_installed() && !INSTALLED.load(Ordering::Acquire).is_null()
}

/// Run the installed pipeline for the calling thread without a fault.
///
/// The snapshot records `FaultKind::Requested`. Returns `Busy` when called
/// from inside the pipeline itself.
pub fn report_now() -> CrashResult<Outcome> {
    let fault = FaultContext::requested(current_thread_id());
    match run_guarded(&fault) {
        Guarded::Done(outcome) => Ok(outcome),
        Guarded::NoReporter => Err(CrashError::NotInstalled),
        Guarded::Reentrant => Err(CrashError::Busy),
    }
}

enum Guarded {
    Done(Outcome),
    NoReporter,
    Reentrant,
}

fn run_guarded(fault: &FaultContext) -> Guarded {
    let _token = match GUARD.acquire(fault.thread_id) {
        Acquire::Acquired(token) => token,
        Acquire::Reentrant => return Guarded::Reentrant,
    };
    trace_state(HandlingState::Entered);

    let installed = unsafe { INSTALLED.load(Ordering::Acquire).as_ref() };
    let result = match installed {
        Some(installed) => {
            let outcome = catch_unwind(AssertUnwindSafe(|| installed.handler.handle(fault)))
                .unwrap_or_else(|_| {
                    kerror!("crash pipeline panicked");
                    Outcome::CaptureFailed
                });
            Guarded::Done(outcome)
        }
        None => Guarded::NoReporter,
    };

    trace_state(HandlingState::Done);
    result
}

/// Entry point registered with the platform layer
fn dispatch(fault: &FaultContext) -> Disposition {
    match run_guarded(fault) {
        Guarded::Done(outcome) => {
            kinfo!("{} on thread {}: {}", fault.kind, fault.thread_id, outcome);
            outcome.disposition()
        }
        Guarded::NoReporter => Disposition::ContinueSearch,
        Guarded::Reentrant => {
            kerror!("{} while reporting a crash on thread {}", fault.kind, fault.thread_id);
            Outcome::PassThrough.disposition()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashguard_core::actions::ActionMask;
    use crashguard_core::error::SnapshotError;
    use crashguard_core::fault::FaultKind;
    use crashguard_core::policy::DumpVerbosity;
    use crashguard_core::traits::PromptAnswer;
    use crashguard_runtime::RecordHeader;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex, MutexGuard};

    /// The installed reporter is process-global
    static SERIAL: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crashguard-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn dumps_in(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().map_or(false, |ext| ext == "dmp"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn silent_policy(dir: &Path) -> PolicyConfiguration {
        PolicyConfiguration::new()
            .actions(ActionMask::RUN_SILENTLY | ActionMask::PERSIST_TO_DISK)
            .app_name("crashguard-test")
            .app_version("1.0")
            .build_timestamp("Jan 1 2024 00:00:00")
            .verbosity(DumpVerbosity::Minimal)
            .dump_dir(dir)
    }

    /// Tracks how many snapshots are in flight at once
    #[derive(Clone, Default)]
    struct CountingWriter {
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl SnapshotWriter for CountingWriter {
        fn write_snapshot(
            &self,
            fault: &FaultContext,
            verbosity: DumpVerbosity,
            out: &mut dyn Write,
        ) -> Result<(), SnapshotError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            let result = ContextRecordWriter.write_snapshot(fault, verbosity, out);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[test]
    fn test_report_now_writes_requested_dump() {
        let _serial = serial();
        let dir = scratch_dir("report-now");
        configure(silent_policy(&dir)).unwrap();
        assert!(is_installed());

        assert_eq!(report_now().unwrap(), Outcome::Handled);
        let dumps = dumps_in(&dir);
        assert_eq!(dumps.len(), 1);
        let name = dumps[0].file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, "crashguard-test 1.0 - Jan 1 2024 00.00.00.dmp");

        let record = std::fs::read(&dumps[0]).unwrap();
        let header = RecordHeader::decode(&record).unwrap();
        assert_eq!(header.signal, 0);
        assert_eq!(header.tid, current_thread_id());

        uninstall().unwrap();
        assert!(!is_installed());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_not_installed() {
        let _serial = serial();
        assert_eq!(report_now(), Err(CrashError::NotInstalled));
        assert_eq!(uninstall(), Err(CrashError::NotInstalled));
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let _serial = serial();
        let policy = PolicyConfiguration::new().app_name("x".repeat(4096));
        assert!(matches!(configure(policy), Err(CrashError::Config(_))));
        assert!(!is_installed());
    }

    #[test]
    fn test_reconfigure_replaces_policy() {
        let _serial = serial();
        let first = scratch_dir("reconfigure-a");
        let second = scratch_dir("reconfigure-b");
        configure(silent_policy(&first)).unwrap();
        configure(silent_policy(&second)).unwrap();

        assert_eq!(report_now().unwrap(), Outcome::Handled);
        assert!(dumps_in(&first).is_empty());
        assert_eq!(dumps_in(&second).len(), 1);

        uninstall().unwrap();
        let _ = std::fs::remove_dir_all(&second);
    }

    #[test]
    fn test_uninstall_busy_while_handling() {
        let _serial = serial();
        let dir = scratch_dir("busy");
        configure(silent_policy(&dir)).unwrap();

        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            let token = GUARD.try_acquire(current_thread_id()).unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            drop(token);
        });

        held_rx.recv().unwrap();
        assert_eq!(uninstall(), Err(CrashError::Busy));
        assert!(is_installed());
        release_tx.send(()).unwrap();
        holder.join().unwrap();

        uninstall().unwrap();
    }

    #[test]
    fn test_concurrent_reports_are_serialized() {
        let _serial = serial();
        let dir = scratch_dir("serialized");
        let writer = CountingWriter::default();
        configure_with(
            silent_policy(&dir),
            writer.clone(),
            OsFileSystem::new(),
            DisabledTransport,
            TtyPrompt::new(),
        )
        .unwrap();

        let threads: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| report_now().unwrap()))
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), Outcome::Handled);
        }
        assert_eq!(writer.calls.load(Ordering::SeqCst), 4);
        assert_eq!(writer.max_active.load(Ordering::SeqCst), 1);

        uninstall().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    static NESTED: Mutex<Option<CrashResult<Outcome>>> = Mutex::new(None);

    /// Re-enters the pipeline from inside the prompt, then declines
    struct NestingPrompt;

    impl Prompt for NestingPrompt {
        fn confirm(&self, _title: &str, _message: &str) -> PromptAnswer {
            *NESTED.lock().unwrap() = Some(report_now());
            PromptAnswer::No
        }
    }

    #[test]
    fn test_reentry_on_same_thread_is_busy() {
        let _serial = serial();
        let dir = scratch_dir("nested");
        configure_with(
            PolicyConfiguration::new()
                .actions(ActionMask::PROMPT_USER | ActionMask::PERSIST_TO_DISK)
                .dump_dir(&dir),
            ContextRecordWriter::new(),
            OsFileSystem::new(),
            DisabledTransport,
            NestingPrompt,
        )
        .unwrap();

        assert_eq!(report_now().unwrap(), Outcome::PassThrough);
        assert_eq!(NESTED.lock().unwrap().take(), Some(Err(CrashError::Busy)));
        assert!(dumps_in(&dir).is_empty());
        uninstall().unwrap();
    }

    #[test]
    fn test_dispatch_reentrant_passes_through() {
        let _serial = serial();
        let fault = FaultContext {
            kind: FaultKind::Bus,
            signal: 7,
            code: 0,
            address: 0,
            thread_id: current_thread_id(),
            info: std::ptr::null(),
            machine_context: std::ptr::null(),
        };
        let _token = match GUARD.acquire(fault.thread_id) {
            Acquire::Acquired(token) => token,
            Acquire::Reentrant => panic!("guard already held"),
        };
        assert_eq!(dispatch(&fault), Disposition::ContinueSearch);
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_thread_replaces_runtime_stack() {
        std::thread::spawn(|| {
            let query = || {
                let mut current: libc::stack_t = unsafe { std::mem::zeroed() };
                unsafe { libc::sigaltstack(std::ptr::null(), &mut current) };
                current
            };
            let before = query();

            prepare_thread().unwrap();
            assert!(!prepare_thread().unwrap());
            assert_eq!(query().ss_size, crashguard_runtime::altstack::ALT_STACK_SIZE);

            release_thread();
            let after = query();
            assert_eq!(after.ss_flags & libc::SS_DISABLE, before.ss_flags & libc::SS_DISABLE);
            if before.ss_flags & libc::SS_DISABLE == 0 {
                assert_eq!(after.ss_sp, before.ss_sp);
            }
        })
        .join()
        .unwrap();
    }

    #[cfg(unix)]
    mod fault {
        use super::*;
        use crashguard_core::error::TransportError;
        use crashguard_core::message::{InteractiveMessage, SilentMessage};
        use crashguard_core::traits::InteractiveOutcome;
        use crashguard_runtime::snapshot::{TAG_CONTEXT, TAG_END, TAG_MAPS};
        use std::os::unix::process::ExitStatusExt;
        use std::process::{Command, ExitStatus};

        const CHILD_DIR: &str = "CRASHGUARD_TEST_CHILD_DIR";
        const MARKER: &str = "notified";

        /// Write into a page mapped with no access
        fn fault_now() {
            unsafe {
                let page = libc::mmap(
                    std::ptr::null_mut(),
                    4096,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );
                assert_ne!(page, libc::MAP_FAILED);
                page.cast::<u32>().write_volatile(0xdead);
            }
        }

        /// Set when running as the re-executed child
        fn child_dir() -> Option<PathBuf> {
            std::env::var_os(CHILD_DIR).map(PathBuf::from)
        }

        /// Re-run the test named `test` alone in a child process
        fn run_in_child(test: &str, dir: &Path) -> ExitStatus {
            Command::new(std::env::current_exe().unwrap())
                .args(["--exact", test, "--nocapture", "--test-threads=1"])
                .env(CHILD_DIR, dir)
                .env("CRASHGUARD_LOG_LEVEL", "off")
                .status()
                .unwrap()
        }

        /// Records where the attached dump was, in a file next to it
        struct MarkerTransport {
            marker: PathBuf,
        }

        impl Transport for MarkerTransport {
            fn send_silent(&self, m: &SilentMessage<'_>) -> Result<(), TransportError> {
                let attached = m
                    .attachment
                    .map(|a| a.path.to_string_lossy().into_owned())
                    .unwrap_or_default();
                std::fs::write(&self.marker, attached).map_err(|_| TransportError::Unavailable)
            }

            fn send_interactive(&self, _m: &InteractiveMessage<'_>) -> InteractiveOutcome {
                InteractiveOutcome::Cancelled
            }
        }

        fn configure_notifying(dir: &Path, verbosity: DumpVerbosity) {
            let policy = silent_policy(dir)
                .actions(
                    ActionMask::RUN_SILENTLY
                        | ActionMask::PERSIST_TO_DISK
                        | ActionMask::NOTIFY_WITH_ATTACHMENT,
                )
                .verbosity(verbosity);
            configure_with(
                policy,
                ContextRecordWriter::new(),
                OsFileSystem::new(),
                MarkerTransport {
                    marker: dir.join(MARKER),
                },
                TtyPrompt::new(),
            )
            .unwrap();
        }

        fn has_section(record: &[u8], tag: [u8; 4]) -> bool {
            record.windows(4).any(|w| w == tag)
        }

        /// One complete dump, attached to one notification
        fn assert_reported(dir: &Path, status: ExitStatus, verbosity: u32) -> Vec<u8> {
            assert_eq!(status.signal(), Some(libc::SIGSEGV));
            let dumps = dumps_in(dir);
            assert_eq!(dumps.len(), 1);

            let record = std::fs::read(&dumps[0]).unwrap();
            let header = RecordHeader::decode(&record).unwrap();
            assert_eq!(header.signal, libc::SIGSEGV);
            assert_eq!(header.verbosity, verbosity);
            let mut end = TAG_END.to_vec();
            end.extend_from_slice(&[0; 4]);
            assert!(record.ends_with(&end), "dump was cut short");

            let attached = std::fs::read_to_string(dir.join(MARKER)).unwrap();
            assert_eq!(PathBuf::from(attached), dumps[0]);
            record
        }

        #[test]
        fn test_segfault_dumps_once_and_dies() {
            if let Some(dir) = child_dir() {
                configure(silent_policy(&dir)).unwrap();
                fault_now();
                panic!("survived a segmentation fault");
            }

            let dir = scratch_dir("segv");
            let status = run_in_child(
                "installer::tests::fault::test_segfault_dumps_once_and_dies",
                &dir,
            );

            assert_eq!(status.signal(), Some(libc::SIGSEGV));
            let dumps = dumps_in(&dir);
            assert_eq!(dumps.len(), 1);
            let record = std::fs::read(&dumps[0]).unwrap();
            assert_eq!(RecordHeader::decode(&record).unwrap().signal, libc::SIGSEGV);
            std::fs::remove_dir_all(&dir).unwrap();
        }

        #[test]
        fn test_segfault_normal_dump_is_attached() {
            if let Some(dir) = child_dir() {
                configure_notifying(&dir, DumpVerbosity::Normal);
                fault_now();
                panic!("survived a segmentation fault");
            }

            let dir = scratch_dir("segv-normal");
            let status = run_in_child(
                "installer::tests::fault::test_segfault_normal_dump_is_attached",
                &dir,
            );
            let record = assert_reported(&dir, status, 1);
            if cfg!(any(target_os = "linux", target_os = "android")) {
                assert!(has_section(&record, TAG_CONTEXT));
            }
            assert!(!has_section(&record, TAG_MAPS));
            std::fs::remove_dir_all(&dir).unwrap();
        }

        #[test]
        fn test_segfault_full_dump_is_attached() {
            if let Some(dir) = child_dir() {
                configure_notifying(&dir, DumpVerbosity::Full);
                fault_now();
                panic!("survived a segmentation fault");
            }

            let dir = scratch_dir("segv-full");
            let status = run_in_child(
                "installer::tests::fault::test_segfault_full_dump_is_attached",
                &dir,
            );
            let record = assert_reported(&dir, status, 2);
            if cfg!(any(target_os = "linux", target_os = "android")) {
                assert!(has_section(&record, TAG_CONTEXT));
                assert!(has_section(&record, TAG_MAPS));
            }
            std::fs::remove_dir_all(&dir).unwrap();
        }

        #[test]
        fn test_segfault_on_prepared_thread() {
            if let Some(dir) = child_dir() {
                configure_notifying(&dir, DumpVerbosity::Full);
                let _ = std::thread::spawn(|| {
                    prepare_thread().unwrap();
                    fault_now();
                })
                .join();
                panic!("survived a segmentation fault");
            }

            let dir = scratch_dir("segv-thread");
            let status = run_in_child(
                "installer::tests::fault::test_segfault_on_prepared_thread",
                &dir,
            );
            assert_reported(&dir, status, 2);
            std::fs::remove_dir_all(&dir).unwrap();
        }
    }
}
