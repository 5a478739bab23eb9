//! # crashguard-core
//!
//! Platform-agnostic core of the crashguard crash-reporting pipeline.
//!
//! This crate contains no OS-specific code. Fault interception, the
//! filesystem and the default collaborators are in `crashguard-runtime`.
//!
//! ## Modules
//!
//! - `actions` - Crash action flags and their precedence
//! - `policy` - Policy configuration, env overrides, validation
//! - `guard` - Serialization guard (one fault at a time)
//! - `scratch` - Fixed-capacity buffers for fault-time formatting
//! - `naming` - Dump file naming and sanitization
//! - `message` - Notification subject/body composition
//! - `fault` - Fault context handed over by the platform layer
//! - `traits` - Collaborator interfaces
//! - `engine` - Decision engine
//! - `error` - Error types
//! - `kprint` - Kernel-style logging macros, usable in a fault handler
//! - `env` - Environment variable utilities

pub mod actions;
pub mod policy;
pub mod guard;
pub mod scratch;
pub mod naming;
pub mod message;
pub mod fault;
pub mod traits;
pub mod engine;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use actions::{ActionMask, NotifyMode};
pub use policy::{DumpVerbosity, NotificationSettings, PolicyConfiguration};
pub use guard::{Acquire, FaultGuard, FaultGuardToken};
pub use scratch::ScratchBuf;
pub use message::{Attachment, InteractiveMessage, SilentMessage};
pub use fault::{FaultContext, FaultKind};
pub use traits::{
    FaultHandler, FileSystem, InteractiveOutcome, Prompt, PromptAnswer, SnapshotWriter, Transport,
};
pub use engine::{Disposition, HandlingState, Outcome, Reporter};
pub use error::{ConfigError, CrashError, CrashResult, SnapshotError, TransportError};
pub use env::{env_get, env_get_opt};
