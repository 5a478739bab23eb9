//! Error types for the crash pipeline
//!
//! Only configuration and teardown errors ever reach a caller. Errors raised
//! while a fault is being handled are mapped onto an `Outcome` by the engine
//! and never propagate out of the handler.

use core::fmt;

/// Result type for crash pipeline operations
pub type CrashResult<T> = Result<T, CrashError>;

/// Errors surfaced by the crash pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashError {
    /// Policy rejected at configure time
    Config(ConfigError),

    /// Snapshot writer could not produce an artifact
    CaptureFailed(SnapshotError),

    /// Notification could not be delivered
    TransportFailed(TransportError),

    /// A crash is being handled right now
    Busy,

    /// No reporter has been configured
    NotInstalled,

    /// Platform call failed with the given errno
    Platform(i32),

    /// Fault interception is not available on this platform
    Unsupported,
}

impl fmt::Display for CrashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrashError::Config(e) => write!(f, "configuration error: {}", e),
            CrashError::CaptureFailed(e) => write!(f, "capture failed: {}", e),
            CrashError::TransportFailed(e) => write!(f, "transport failed: {}", e),
            CrashError::Busy => write!(f, "a crash is being handled"),
            CrashError::NotInstalled => write!(f, "crash reporter not installed"),
            CrashError::Platform(errno) => write!(f, "platform error: errno {}", errno),
            CrashError::Unsupported => write!(f, "fault interception unsupported on this platform"),
        }
    }
}

impl std::error::Error for CrashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrashError::Config(e) => Some(e),
            CrashError::CaptureFailed(e) => Some(e),
            CrashError::TransportFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Policy validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// String longer than its fixed bound
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// String contains an interior NUL byte
    InteriorNul(&'static str),

    /// Value out of range
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooLong { field, len, max } => {
                write!(f, "{} is {} bytes, limit is {}", field, len, max)
            }
            ConfigError::InteriorNul(field) => write!(f, "{} contains a NUL byte", field),
            ConfigError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for CrashError {
    fn from(e: ConfigError) -> Self {
        CrashError::Config(e)
    }
}

/// Snapshot capture errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Dump path did not fit the path buffer
    PathTooLong,

    /// Target file could not be opened for writing
    OpenFailed(i32),

    /// Writer failed part-way through
    WriteFailed(i32),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::PathTooLong => write!(f, "dump path too long"),
            SnapshotError::OpenFailed(errno) => write!(f, "cannot open dump file (errno {})", errno),
            SnapshotError::WriteFailed(errno) => write!(f, "dump write failed (errno {})", errno),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<SnapshotError> for CrashError {
    fn from(e: SnapshotError) -> Self {
        CrashError::CaptureFailed(e)
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::WriteFailed(e.raw_os_error().unwrap_or(0))
    }
}

/// Notification transport errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No transport was provided
    Unavailable,

    /// Server refused or the connection dropped
    Rejected(i32),

    /// Message fields did not fit the compose buffers
    MessageTooLong,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unavailable => write!(f, "no transport configured"),
            TransportError::Rejected(code) => write!(f, "send rejected (code {})", code),
            TransportError::MessageTooLong => write!(f, "message too long"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for CrashError {
    fn from(e: TransportError) -> Self {
        CrashError::TransportFailed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = CrashError::Busy;
        assert_eq!(format!("{}", e), "a crash is being handled");

        let e = CrashError::Config(ConfigError::TooLong {
            field: "app_name",
            len: 300,
            max: 128,
        });
        assert_eq!(
            format!("{}", e),
            "configuration error: app_name is 300 bytes, limit is 128"
        );

        let e = CrashError::TransportFailed(TransportError::MessageTooLong);
        assert_eq!(format!("{}", TransportError::MessageTooLong), "message too long");
        assert!(format!("{}", e).ends_with("message too long"));
    }

    #[test]
    fn test_error_conversion() {
        let err: CrashError = SnapshotError::PathTooLong.into();
        assert!(matches!(err, CrashError::CaptureFailed(SnapshotError::PathTooLong)));

        let err: CrashError = TransportError::Unavailable.into();
        assert!(matches!(err, CrashError::TransportFailed(TransportError::Unavailable)));
    }

    #[test]
    fn test_io_error_keeps_errno() {
        let io = std::io::Error::from_raw_os_error(28);
        assert_eq!(SnapshotError::from(io), SnapshotError::WriteFailed(28));
    }
}
