//! Crash on purpose
//!
//! Installs crash reporting from the environment, then triggers the
//! requested fault so the whole pipeline can be watched end to end.
//!
//! ```text
//! crashme [segv|bus|fpe|ill|abort|trap|overflow|thread|report]
//! ```
//!
//! # Environment Variables
//!
//! - `CRASHGUARD_ACTIONS=silent|persist` - What to do on a crash
//! - `CRASHGUARD_DUMP_DIR=/tmp/dumps` - Where persisted dumps go
//! - `CRASHGUARD_LOG_LEVEL=debug` - Log level (off, error, warn, info, debug, trace)
//!
//! See `PolicyConfiguration::from_env` for the full list.

use crashguard::{kinfo, PolicyConfiguration};
use std::hint::black_box;

// CRASHGUARD_ACTIONS=silent,persist CRASHGUARD_DUMP_DIR=/tmp/dumps CRASHGUARD_LOG_LEVEL=debug cargo run -p crashguard-crashme -- segv
fn main() {
    let what = std::env::args().nth(1).unwrap_or_else(|| "segv".to_string());

    let policy = PolicyConfiguration::from_env()
        .app_name("crashme")
        .app_version(env!("CARGO_PKG_VERSION"));
    if let Err(e) = crashguard::configure(policy) {
        eprintln!("crashme: cannot install crash reporting: {}", e);
        std::process::exit(2);
    }

    kinfo!("triggering '{}'", what);
    match what.as_str() {
        "segv" => write_protected_page(),
        "bus" => raise(libc::SIGBUS),
        "fpe" => raise(libc::SIGFPE),
        "ill" => raise(libc::SIGILL),
        "abort" => std::process::abort(),
        "trap" => raise(libc::SIGTRAP),
        "overflow" => {
            black_box(recurse(0));
        }
        "thread" => {
            let _ = std::thread::spawn(|| {
                if let Err(e) = crashguard::prepare_thread() {
                    eprintln!("crashme: no alternate signal stack: {}", e);
                }
                write_protected_page();
            })
            .join();
        }
        "report" => match crashguard::report_now() {
            Ok(outcome) => {
                println!("report: {}", outcome);
                return;
            }
            Err(e) => {
                eprintln!("report failed: {}", e);
                std::process::exit(1);
            }
        },
        other => {
            eprintln!("crashme: unknown fault '{}'", other);
            std::process::exit(2);
        }
    }

    eprintln!("crashme: still alive after '{}'", what);
    std::process::exit(1);
}

fn write_protected_page() {
    unsafe {
        let page = libc::mmap(
            std::ptr::null_mut(),
            4096,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if page == libc::MAP_FAILED {
            eprintln!("crashme: mmap failed");
            std::process::exit(1);
        }
        page.cast::<u32>().write_volatile(0xdead_beef);
    }
}

fn raise(sig: libc::c_int) {
    unsafe {
        libc::raise(sig);
    }
}

#[allow(unconditional_recursion)]
fn recurse(depth: u64) -> u64 {
    let frame = black_box([depth; 64]);
    recurse(frame[0] + 1) + frame[63]
}
