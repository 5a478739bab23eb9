//! Fault interception
//!
//! Registers the process-wide handler that feeds intercepted faults to the
//! installed reporter.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        mod unsupported;
        pub use unsupported::*;
    }
}
