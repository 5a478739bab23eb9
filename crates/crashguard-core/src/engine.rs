//! Decision engine
//!
//! Turns `(policy, fault)` into actions and an `Outcome`:
//!
//! ```text
//! Entered -> PromptOrSkip -> CaptureDecision -> Captured -> DecideNotify
//!         -> Notified | SkippedNotify -> Done
//! ```
//!
//! The engine does not take the serialization guard itself; the installer
//! wraps `Reporter::process` in it (Entered/Done). Everything composed here
//! lives in stack buffers sized by the policy limits. No step returns an
//! error: each collaborator call is best-effort, failures are logged and
//! folded into the outcome, and nothing is ever retried.

use crate::actions::NotifyMode;
use crate::error::{ConfigError, SnapshotError, TransportError};
use crate::fault::FaultContext;
use crate::message::{compose_body, compose_subject, Attachment, InteractiveMessage, SilentMessage};
use crate::naming::{dump_file_name, finish_dump_path, write_dump_stem};
use crate::policy::PolicyConfiguration;
use crate::scratch::{ScratchBuf, BODY_CAP, DESCRIPTOR_CAP, PATH_CAP, SUBJECT_CAP};
use crate::traits::{
    FaultHandler, FileSystem, InteractiveOutcome, Prompt, PromptAnswer, SnapshotWriter, Transport,
};
use crate::{kdebug, kerror, kinfo, ktrace, kwarn};
use core::fmt::{self, Write as _};
use std::io::Write as _;
use std::path::Path;

/// Title of the yes/no prompt
pub const PROMPT_TITLE: &str = "Crash Reporter";

/// How one fault's handling ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Report produced (as far as the policy asked); terminate
    Handled,
    /// The user declined; hand the fault back untouched
    PassThrough,
    /// No snapshot could be written
    CaptureFailed,
}

/// What the platform layer does after the engine returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Run the default termination for the fault
    Terminate,
    /// Let the previous handler (or the default action) have it
    ContinueSearch,
}

impl Outcome {
    pub fn disposition(self) -> Disposition {
        match self {
            Outcome::Handled => Disposition::Terminate,
            Outcome::PassThrough | Outcome::CaptureFailed => Disposition::ContinueSearch,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Handled => "handled",
            Outcome::PassThrough => "pass-through",
            Outcome::CaptureFailed => "capture failed",
        })
    }
}

/// Handling state, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlingState {
    Entered,
    PromptOrSkip,
    CaptureDecision,
    Captured,
    DecideNotify,
    Notified,
    SkippedNotify,
    Done,
}

#[inline]
pub fn trace_state(state: HandlingState) {
    ktrace!("state -> {:?}", state);
}

/// Policy plus collaborators: everything a fault needs
pub struct Reporter<S, F, T, P> {
    policy: PolicyConfiguration,
    writer: S,
    fs: F,
    transport: T,
    prompt: P,
}

impl<S, F, T, P> Reporter<S, F, T, P>
where
    S: SnapshotWriter,
    F: FileSystem,
    T: Transport,
    P: Prompt,
{
    /// Validate `policy` and bundle it with its collaborators
    pub fn new(
        policy: PolicyConfiguration,
        writer: S,
        fs: F,
        transport: T,
        prompt: P,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Reporter {
            policy,
            writer,
            fs,
            transport,
            prompt,
        })
    }

    pub fn policy(&self) -> &PolicyConfiguration {
        &self.policy
    }

    /// Run one fault through the pipeline (guard already held)
    pub fn process(&self, fault: &FaultContext) -> Outcome {
        let actions = self.policy.actions;
        kdebug!("handling {} on thread {} ({})", fault.kind, fault.thread_id, actions);

        trace_state(HandlingState::PromptOrSkip);
        if actions.should_prompt() && !self.user_wants_report() {
            kinfo!("crash report declined by user");
            return Outcome::PassThrough;
        }

        if !actions.needs_capture() {
            trace_state(HandlingState::SkippedNotify);
            return Outcome::Handled;
        }

        trace_state(HandlingState::CaptureDecision);
        let mut stem = ScratchBuf::<DESCRIPTOR_CAP>::new();
        let mut path = ScratchBuf::<PATH_CAP>::new();
        let captured = match write_dump_stem(&self.policy, &mut stem) {
            Ok(()) => self.capture(fault, stem.as_str(), &mut path),
            Err(_) => Err(SnapshotError::PathTooLong),
        };

        let mode = actions.notify_mode();
        match &captured {
            Ok(()) => {
                trace_state(HandlingState::Captured);
                kinfo!("crash dump written to {}", path);
            }
            Err(e) => {
                kerror!("crash dump not written: {}", e);
                // Nothing left that can go out without the artifact
                if mode != Some(NotifyMode::NoAttachment) {
                    return Outcome::CaptureFailed;
                }
            }
        }

        trace_state(HandlingState::DecideNotify);
        match mode {
            Some(mode) => {
                self.notify(mode, stem.as_str(), path.as_str(), captured.is_ok());
                trace_state(HandlingState::Notified);
            }
            None => trace_state(HandlingState::SkippedNotify),
        }

        match captured {
            Ok(()) => Outcome::Handled,
            Err(_) => Outcome::CaptureFailed,
        }
    }

    fn user_wants_report(&self) -> bool {
        let mut question = ScratchBuf::<{ DESCRIPTOR_CAP + 64 }>::new();
        let _ = write!(
            question,
            "{} has crashed.\nGenerate a report?",
            self.policy.app_name
        );
        match self.prompt.confirm(PROMPT_TITLE, question.as_str()) {
            PromptAnswer::Yes => true,
            PromptAnswer::No => false,
            PromptAnswer::Unavailable => {
                kdebug!("no prompt available, reporting anyway");
                true
            }
        }
    }

    /// Resolve the dump path into `path` and write the snapshot there
    fn capture<const N: usize>(
        &self,
        fault: &FaultContext,
        stem: &str,
        path: &mut ScratchBuf<N>,
    ) -> Result<(), SnapshotError> {
        let persist_dir = if self.policy.actions.persists() {
            self.policy.effective_dump_dir()
        } else {
            None
        };

        path.clear();
        match persist_dir {
            Some(configured) => {
                // validate() guarantees UTF-8
                let configured_str = configured.to_str().unwrap_or("");
                path.push_str(configured_str)
                    .map_err(|_| SnapshotError::PathTooLong)?;
                if let Err(e) = self.fs.create_dir_all(configured) {
                    kwarn!("cannot create dump directory {}: {}", configured_str, e);
                }
            }
            None => {
                if !self.fs.temp_dir(path) {
                    kwarn!("no temp directory, writing dump to the working directory");
                    path.clear();
                }
            }
        }

        finish_dump_path(stem, path).map_err(|_| SnapshotError::PathTooLong)?;

        let mut file = self
            .fs
            .create_for_write(Path::new(path.as_str()))
            .map_err(|e| SnapshotError::OpenFailed(e.raw_os_error().unwrap_or(0)))?;
        self.writer
            .write_snapshot(fault, self.policy.verbosity, &mut file)?;
        file.flush()?;
        Ok(())
    }

    fn notify(&self, mode: NotifyMode, stem: &str, dump_path: &str, captured: bool) {
        let settings = &self.policy.notification;

        let mut subject = ScratchBuf::<SUBJECT_CAP>::new();
        let mut body = ScratchBuf::<BODY_CAP>::new();

        let persisted = (captured && self.policy.actions.persists()).then_some(dump_path);
        if compose_subject(&settings.subject_prefix, stem, &mut subject).is_err()
            || compose_body(&self.policy, persisted, &mut body).is_err()
        {
            kerror!("crash notification not sent: {}", TransportError::MessageTooLong);
            return;
        }

        let attachment = match mode {
            NotifyMode::WithAttachment => Some(Attachment {
                path: Path::new(dump_path),
                file_name: dump_file_name(dump_path),
            }),
            NotifyMode::NoAttachment => None,
        };

        if self.policy.actions.is_silent() {
            let message = SilentMessage::new(settings, subject.as_str(), body.as_str(), attachment);
            match self.transport.send_silent(&message) {
                Ok(()) => kinfo!("crash notification sent to {}", settings.recipient),
                Err(e) => kwarn!("crash notification dropped: {}", e),
            }
        } else {
            let message = InteractiveMessage {
                recipient: &settings.recipient,
                subject: subject.as_str(),
                body: body.as_str(),
                attachment,
            };
            match self.transport.send_interactive(&message) {
                InteractiveOutcome::Sent => kinfo!("crash notification sent by user"),
                InteractiveOutcome::Cancelled => kinfo!("crash notification cancelled"),
            }
        }
    }
}

impl<S, F, T, P> FaultHandler for Reporter<S, F, T, P>
where
    S: SnapshotWriter,
    F: FileSystem,
    T: Transport,
    P: Prompt,
{
    fn handle(&self, fault: &FaultContext) -> Outcome {
        self.process(fault)
    }
}
