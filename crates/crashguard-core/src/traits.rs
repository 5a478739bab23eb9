//! Collaborator traits
//!
//! These traits are the seams between the platform-agnostic pipeline and
//! the things it only knows by interface: the snapshot writer, the
//! filesystem, the notification transport and the yes/no prompt. The
//! platform runtime provides default implementations; tests substitute
//! recording fakes.
//!
//! Every method may be called from a fault handler. Implementations should
//! avoid locks another thread could be holding and should never panic.

use crate::error::{SnapshotError, TransportError};
use crate::fault::FaultContext;
use crate::message::{InteractiveMessage, SilentMessage};
use crate::policy::DumpVerbosity;
use crate::scratch::ScratchBuf;
use std::io::{self, Write};
use std::path::Path;

/// Produces the opaque diagnostic snapshot
pub trait SnapshotWriter: Send + Sync {
    /// Write a snapshot of `fault` at the requested verbosity into `out`.
    fn write_snapshot(
        &self,
        fault: &FaultContext,
        verbosity: DumpVerbosity,
        out: &mut dyn Write,
    ) -> Result<(), SnapshotError>;
}

/// Filesystem operations the pipeline needs
pub trait FileSystem: Send + Sync {
    /// Handle a created dump is written through
    type Output: Write;

    /// Write the system temp directory into `out`; false if unknown
    fn temp_dir<const N: usize>(&self, out: &mut ScratchBuf<N>) -> bool;

    /// Create `dir` and any missing parents
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Create (or truncate) `path` for writing
    fn create_for_write(&self, path: &Path) -> io::Result<Self::Output>;
}

/// Result of an interactive send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveOutcome {
    /// The user completed the send
    Sent,
    /// The user closed the dialog, or no dialog could be shown
    Cancelled,
}

/// Delivers crash notifications
pub trait Transport: Send + Sync {
    /// Send without user interaction using the configured credentials
    fn send_silent(&self, message: &SilentMessage<'_>) -> Result<(), TransportError>;

    /// Open a pre-filled compose UI and let the user decide
    fn send_interactive(&self, message: &InteractiveMessage<'_>) -> InteractiveOutcome;
}

/// Answer from the yes/no prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Yes,
    No,
    /// No UI could be shown; reporting goes ahead
    Unavailable,
}

/// Asks the user whether to report the crash
pub trait Prompt: Send + Sync {
    fn confirm(&self, title: &str, message: &str) -> PromptAnswer;
}

/// Type-erased entry point the platform layer calls on a fault
pub trait FaultHandler: Send + Sync {
    fn handle(&self, fault: &FaultContext) -> crate::engine::Outcome;
}
