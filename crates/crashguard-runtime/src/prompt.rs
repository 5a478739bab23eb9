//! Terminal yes/no prompt
//!
//! Talks to the controlling terminal directly rather than stdin/stdout so
//! it works when those are redirected. Without a terminal the answer is
//! `Unavailable` and the report goes ahead.

use crashguard_core::kdebug;
use crashguard_core::traits::{Prompt, PromptAnswer};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Default device the prompt is shown on
pub const TTY_PATH: &str = "/dev/tty";

#[derive(Debug, Clone)]
pub struct TtyPrompt {
    device: PathBuf,
}

impl TtyPrompt {
    pub fn new() -> Self {
        Self::with_device(TTY_PATH)
    }

    /// Prompt on another device (or a FIFO in tests)
    pub fn with_device(device: impl Into<PathBuf>) -> Self {
        TtyPrompt {
            device: device.into(),
        }
    }

    fn open(&self) -> Option<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .ok()
    }
}

impl Default for TtyPrompt {
    fn default() -> Self {
        Self::new()
    }
}

/// First non-blank byte decides; anything but y/Y is a no
pub fn parse_answer(input: &[u8]) -> PromptAnswer {
    match input.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'y') | Some(b'Y') => PromptAnswer::Yes,
        _ => PromptAnswer::No,
    }
}

impl Prompt for TtyPrompt {
    fn confirm(&self, title: &str, message: &str) -> PromptAnswer {
        let mut tty = match self.open() {
            Some(tty) => tty,
            None => {
                kdebug!("no terminal for crash prompt");
                return PromptAnswer::Unavailable;
            }
        };

        let shown = write!(tty, "\n[{}] {} [y/N] ", title, message).and_then(|_| tty.flush());
        if shown.is_err() {
            return PromptAnswer::Unavailable;
        }

        let mut line = [0u8; 64];
        match tty.read(&mut line) {
            Ok(n) => parse_answer(&line[..n]),
            Err(_) => PromptAnswer::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer(b"y\n"), PromptAnswer::Yes);
        assert_eq!(parse_answer(b"  Yes\n"), PromptAnswer::Yes);
        assert_eq!(parse_answer(b"n\n"), PromptAnswer::No);
        assert_eq!(parse_answer(b"\n"), PromptAnswer::No);
        assert_eq!(parse_answer(b""), PromptAnswer::No);
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let prompt = TtyPrompt::with_device("/nonexistent/crashguard-tty");
        assert_eq!(prompt.confirm("Crash Reporter", "x"), PromptAnswer::Unavailable);
    }
}
