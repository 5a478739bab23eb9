//! Notification composition
//!
//! Subject and body are built from the policy plus runtime facts into
//! fixed buffers. The message types borrow those buffers, so handing a
//! message to a transport never allocates.

use crate::policy::{NotificationSettings, PolicyConfiguration};
use crate::scratch::ScratchBuf;
use core::fmt::{self, Write};
use std::path::Path;

/// Write `prefix` + `stem`
pub fn compose_subject<const N: usize>(
    prefix: &str,
    stem: &str,
    out: &mut ScratchBuf<N>,
) -> fmt::Result {
    out.clear();
    out.push_str(prefix)?;
    out.push_str(stem)
}

/// Write the crash body.
///
/// `persisted_path` is the dump location, included only when the dump was
/// kept on disk.
pub fn compose_body<const N: usize>(
    policy: &PolicyConfiguration,
    persisted_path: Option<&str>,
    out: &mut ScratchBuf<N>,
) -> fmt::Result {
    out.clear();
    write!(
        out,
        "{}{} version {} has crashed.\r\nIt was compiled on {}.\r\n",
        policy.notification.body_template,
        policy.app_name,
        policy.app_version,
        policy.build_timestamp,
    )?;
    if let Some(path) = persisted_path {
        write!(out, "Minidump written to {} \r\n", path)?;
    }
    Ok(())
}

/// The dump attached to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment<'a> {
    /// Where the dump is on disk
    pub path: &'a Path,
    /// File name the recipient sees
    pub file_name: &'a str,
}

/// Fields for a programmatic, no-UI send
#[derive(Debug, Clone, Copy)]
pub struct SilentMessage<'a> {
    pub server: &'a str,
    pub port: u16,
    pub account: &'a str,
    pub sender: &'a str,
    pub recipient: &'a str,
    pub password: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub attachment: Option<Attachment<'a>>,
}

impl<'a> SilentMessage<'a> {
    pub fn new(
        settings: &'a NotificationSettings,
        subject: &'a str,
        body: &'a str,
        attachment: Option<Attachment<'a>>,
    ) -> Self {
        SilentMessage {
            server: &settings.server,
            port: settings.port,
            account: &settings.account,
            sender: &settings.sender,
            recipient: &settings.recipient,
            password: &settings.password,
            subject,
            body,
            attachment,
        }
    }
}

/// Fields pre-filled into a user-facing compose dialog
#[derive(Debug, Clone, Copy)]
pub struct InteractiveMessage<'a> {
    pub recipient: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub attachment: Option<Attachment<'a>>,
}
