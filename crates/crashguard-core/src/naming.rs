//! Dump file naming
//!
//! A dump is named after the application and the build it came from:
//! `"{name} {version} - {timestamp}"` with the path delimiters `:`, `/` and
//! `\` replaced by `.`, then `.dmp`. The same sanitized stem doubles as the
//! notification subject.

use crate::policy::PolicyConfiguration;
use crate::scratch::ScratchBuf;
use core::fmt::{self, Write};

/// Dump file extension, appended exactly once
pub const DUMP_EXTENSION: &str = ".dmp";

/// Write the sanitized dump stem (no directory, no extension)
pub fn write_dump_stem<const N: usize>(
    policy: &PolicyConfiguration,
    out: &mut ScratchBuf<N>,
) -> fmt::Result {
    out.clear();
    out.push_sanitized(&policy.app_name)?;
    out.push_str(" ")?;
    out.push_sanitized(&policy.app_version)?;
    out.push_str(" - ")?;
    out.push_sanitized(&policy.build_timestamp)
}

/// Append separator (only if missing) + `stem` + `.dmp` to whatever
/// directory `out` already holds.
///
/// An empty `out` yields a bare file name.
pub fn finish_dump_path<const N: usize>(stem: &str, out: &mut ScratchBuf<N>) -> fmt::Result {
    let dir = out.as_str();
    if !dir.is_empty() && !dir.ends_with(is_separator) {
        out.write_char(std::path::MAIN_SEPARATOR)?;
    }
    out.push_str(stem)?;
    out.push_str(DUMP_EXTENSION)
}

/// File name part of a dump path, as the recipient of an attachment sees it
pub fn dump_file_name(path: &str) -> &str {
    match path.rfind(is_separator) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}
