//! # crashguard - in-process crash reporting
//!
//! Intercepts fatal faults (segmentation faults, bus errors, arithmetic
//! faults, illegal instructions, aborts), and turns each one into the
//! actions its policy asks for: a yes/no prompt, a dump written to disk, a
//! notification with or without the dump attached.
//!
//! ## Quick Start
//!
//! ```ignore
//! use crashguard::{ActionMask, PolicyConfiguration};
//!
//! fn main() {
//!     let policy = PolicyConfiguration::from_env()
//!         .app_name("MyApp")
//!         .app_version(env!("CARGO_PKG_VERSION"))
//!         .actions(ActionMask::RUN_SILENTLY | ActionMask::PERSIST_TO_DISK)
//!         .dump_dir("/var/crash/myapp");
//!
//!     crashguard::configure(policy).expect("crash reporting");
//!
//!     // ... a fault from here on leaves MyApp 1.2.0 - <build time>.dmp
//!     // in /var/crash/myapp before the process dies
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   fault ──► signal handler (crashguard-runtime)
//!                  │
//!                  ▼
//!            FaultGuard  (one fault at a time)
//!                  │
//!                  ▼
//!            Reporter::process (crashguard-core)
//!              prompt? ─► capture ─► notify
//!                  │
//!                  ▼
//!            Outcome ─► terminate | pass to previous handler
//! ```
//!
//! ## Threads
//!
//! The fault handler runs on an alternate signal stack. `configure` gives
//! the calling thread one big enough for the pipeline; other threads get
//! only the few KiB the Rust runtime installs. Call [`prepare_thread`] first
//! thing on any thread that may fault, and [`release_thread`] before it
//! exits:
//!
//! ```ignore
//! std::thread::spawn(|| {
//!     crashguard::prepare_thread().ok();
//!     work();
//!     crashguard::release_thread();
//! });
//! ```
//!
//! Mail delivery is not built in; inject a `Transport` with
//! [`configure_with`].

mod installer;

pub use installer::{
    configure, configure_with, is_installed, prepare_thread, release_thread, report_now, uninstall,
    DefaultReporter,
};

// Re-export core types
pub use crashguard_core::{
    ActionMask,
    NotifyMode,
    DumpVerbosity,
    NotificationSettings,
    PolicyConfiguration,
    FaultContext,
    FaultKind,
    Outcome,
    Disposition,
    Reporter,
    Attachment,
    SilentMessage,
    InteractiveMessage,
    SnapshotWriter,
    FileSystem,
    Transport,
    InteractiveOutcome,
    Prompt,
    PromptAnswer,
    ConfigError,
    CrashError,
    CrashResult,
    SnapshotError,
    TransportError,
};

// Re-export kprint macros for debug logging
pub use crashguard_core::{kerror, kwarn, kinfo, kdebug, ktrace};
pub use crashguard_core::kprint::{LogLevel, init as init_logging, set_log_level};

// Re-export default collaborators
pub use crashguard_runtime::{
    ContextRecordWriter,
    DisabledTransport,
    OsFileSystem,
    RecordHeader,
    TtyPrompt,
};
