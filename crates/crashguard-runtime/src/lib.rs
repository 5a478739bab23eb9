//! # crashguard-runtime
//!
//! Platform-specific half of crashguard.
//!
//! This crate provides:
//! - Fault interception (`sigaction` on Unix) with chaining to the
//!   previously installed handlers
//! - Alternate signal stacks so stack overflows can be reported
//! - OS thread ids for the fault guard
//! - Default collaborators: `OsFileSystem`, `ContextRecordWriter`,
//!   `TtyPrompt` and `DisabledTransport`

pub mod signal;
pub mod thread;
pub mod fs;
pub mod snapshot;
pub mod prompt;
pub mod transport;

#[cfg(unix)]
pub mod altstack;

// Re-exports
pub use fs::OsFileSystem;
pub use snapshot::{ContextRecordWriter, RecordHeader};
pub use prompt::TtyPrompt;
pub use transport::DisabledTransport;
pub use thread::current_thread_id;
