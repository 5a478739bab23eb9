//! Environment variable utilities
//!
//! All crash reporter overrides live under the `CRASHGUARD_` prefix and are
//! read once, at configure time. Nothing here runs inside a fault handler.
//!
//! # Usage
//!
//! ```ignore
//! use crashguard_core::env::{env_get, env_get_opt};
//!
//! let port: u16 = env_get("CRASHGUARD_SMTP_PORT", 25);
//! let dir: Option<String> = env_get_opt("CRASHGUARD_DUMP_DIR");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as optional value
///
/// Empty strings count as unset.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

/// Like `env_get_opt`, but a present-and-unparsable value is an error
///
/// Lets callers warn about a typo instead of silently using a default.
pub fn env_get_checked<T>(key: &str) -> Result<Option<T>, T::Err>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v.parse().map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
