//! Kernel-style print macros usable from a fault handler
//!
//! Each line is formatted into a fixed stack buffer and emitted with a single
//! `write(2)` on stderr. No allocation and no stderr lock are involved, so
//! the macros stay usable while a crash is being handled on a thread that
//! may itself hold the std stderr lock. Lines longer than the buffer are cut
//! and end with `...`.
//!
//! # Environment Variables
//!
//! - `CRASHGUARD_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!
//! # Usage
//!
//! ```ignore
//! use crashguard_core::{kerror, kinfo, kdebug};
//!
//! kinfo!("crash reporter installed for {}", app_name);
//! kdebug!("dump path {}", path);
//! kerror!("snapshot failed: {}", err);
//! ```

use crate::scratch::ScratchBuf;
use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Longest single log line, including prefix and newline
pub const LINE_CAP: usize = 512;

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => return None,
        })
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[crashguard ERROR]",
            LogLevel::Warn => "[crashguard WARN] ",
            LogLevel::Info => "[crashguard INFO] ",
            LogLevel::Debug => "[crashguard DEBUG]",
            LogLevel::Trace => "[crashguard TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging from `CRASHGUARD_LOG_LEVEL`
///
/// Called by `configure`, before any handler is registered, so the fault
/// path never touches the environment.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(val) = std::env::var("CRASHGUARD_LOG_LEVEL") {
        if let Some(level) = LogLevel::parse(&val) {
            LOG_LEVEL.store(level as u8, Ordering::Relaxed);
        }
    }
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

/// `fmt::Write` adapter that keeps what fits below a limit instead of failing
struct Truncating<'a, const N: usize>(&'a mut ScratchBuf<N>, usize);

impl<const N: usize> core::fmt::Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if self.0.push_truncated(s, self.1) {
            Ok(())
        } else {
            Err(core::fmt::Error)
        }
    }
}

/// Format one line into `buf`; cut lines end with `...`
#[doc(hidden)]
pub fn format_line(
    buf: &mut ScratchBuf<LINE_CAP>,
    level: LogLevel,
    args: core::fmt::Arguments<'_>,
) {
    buf.clear();
    let _ = buf.push_str(level.prefix());
    let _ = buf.push_str(" ");
    // Leave room for the "...\n" tail
    let _ = Truncating(&mut *buf, LINE_CAP - 4).write_fmt(args);
    if buf.overflowed() {
        let _ = buf.push_str("...");
    }
    let _ = buf.push_str("\n");
}

/// Internal: Leveled print
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: core::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let mut line = ScratchBuf::<LINE_CAP>::new();
    format_line(&mut line, level, args);
    write_stderr(line.as_bytes());
}

/// Write raw bytes to stderr with no locking or allocation
pub fn write_stderr(bytes: &[u8]) {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            let mut rest = bytes;
            while !rest.is_empty() {
                let n = unsafe { libc::write(2, rest.as_ptr().cast(), rest.len()) };
                if n <= 0 {
                    break;
                }
                rest = &rest[n as usize..];
            }
        } else {
            use std::io::Write;
            let _ = std::io::stderr().write_all(bytes);
        }
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Warn,
            format_args!($($arg)*)
        );
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Info,
            format_args!($($arg)*)
        );
    }};
}

/// Debug level log
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::Trace,
            format_args!($($arg)*)
        );
    }};
}

// ============================================================================
// Tests
// ============================================================================
