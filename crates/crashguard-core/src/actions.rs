//! Crash action flags
//!
//! An `ActionMask` says what the pipeline does when a fault is intercepted.
//! Flags combine freely; the engine resolves conflicting combinations with a
//! fixed precedence (silent beats prompt, with-attachment beats
//! no-attachment).

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use core::str::FromStr;

/// Set of actions to take on crash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ActionMask(u32);

impl ActionMask {
    /// No action: the fault is passed through untouched
    pub const NONE: ActionMask = ActionMask(0);
    /// Ask the user before generating a report
    pub const PROMPT_USER: ActionMask = ActionMask(1 << 0);
    /// Suppress every interactive step
    pub const RUN_SILENTLY: ActionMask = ActionMask(1 << 1);
    /// Keep the dump under the configured dump directory
    pub const PERSIST_TO_DISK: ActionMask = ActionMask(1 << 2);
    /// Send a notification without the dump attached
    pub const NOTIFY_NO_ATTACHMENT: ActionMask = ActionMask(1 << 3);
    /// Send a notification with the dump attached
    pub const NOTIFY_WITH_ATTACHMENT: ActionMask = ActionMask(1 << 4);

    const ALL: u32 = 0b1_1111;

    const NAMES: [(ActionMask, &'static str); 5] = [
        (ActionMask::PROMPT_USER, "prompt"),
        (ActionMask::RUN_SILENTLY, "silent"),
        (ActionMask::PERSIST_TO_DISK, "persist"),
        (ActionMask::NOTIFY_NO_ATTACHMENT, "notify"),
        (ActionMask::NOTIFY_WITH_ATTACHMENT, "notify-attach"),
    ];

    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        ActionMask(bits & Self::ALL)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: ActionMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn union(self, other: ActionMask) -> Self {
        ActionMask(self.0 | other.0)
    }

    /// Interactive UI is allowed at all
    #[inline]
    pub const fn is_silent(self) -> bool {
        self.contains(Self::RUN_SILENTLY)
    }

    /// The yes/no prompt is shown. Silent mode always wins.
    #[inline]
    pub const fn should_prompt(self) -> bool {
        self.contains(Self::PROMPT_USER) && !self.is_silent()
    }

    #[inline]
    pub const fn persists(self) -> bool {
        self.contains(Self::PERSIST_TO_DISK)
    }

    /// Notification flavour, with-attachment checked first
    #[inline]
    pub const fn notify_mode(self) -> Option<NotifyMode> {
        if self.contains(Self::NOTIFY_WITH_ATTACHMENT) {
            Some(NotifyMode::WithAttachment)
        } else if self.contains(Self::NOTIFY_NO_ATTACHMENT) {
            Some(NotifyMode::NoAttachment)
        } else {
            None
        }
    }

    /// A snapshot must be captured (persisting or notifying)
    #[inline]
    pub const fn needs_capture(self) -> bool {
        self.persists() || self.notify_mode().is_some()
    }
}

impl BitOr for ActionMask {
    type Output = ActionMask;

    #[inline]
    fn bitor(self, rhs: ActionMask) -> ActionMask {
        self.union(rhs)
    }
}

impl BitOrAssign for ActionMask {
    #[inline]
    fn bitor_assign(&mut self, rhs: ActionMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ActionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ActionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionMask({})", self)
    }
}

/// Error parsing an action list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionError(pub String);

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown crash action '{}'", self.0)
    }
}

impl std::error::Error for ParseActionError {}

impl FromStr for ActionMask {
    type Err = ParseActionError;

    /// Parses `"silent|persist"` or `"prompt, notify-attach"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = ActionMask::NONE;
        for token in s.split(|c: char| c == '|' || c == ',') {
            let token = token.trim();
            if token.is_empty() || token.eq_ignore_ascii_case("none") {
                continue;
            }
            let flag = Self::NAMES
                .iter()
                .find(|(_, name)| token.eq_ignore_ascii_case(name))
                .map(|(flag, _)| *flag)
                .ok_or_else(|| ParseActionError(token.to_string()))?;
            mask |= flag;
        }
        Ok(mask)
    }
}

/// How the notification is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    NoAttachment,
    WithAttachment,
}
