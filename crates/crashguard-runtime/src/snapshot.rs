//! Default snapshot writer
//!
//! Writes a compact binary record of the fault. All integers are
//! little-endian.
//!
//! ```text
//! header (52 bytes)
//!   magic      [u8; 8]   "CGDUMP\0\0"
//!   version    u32
//!   verbosity  u32       0 minimal, 1 normal, 2 full
//!   signal     i32
//!   code       i32
//!   address    u64
//!   pid        u32
//!   tid        u64
//!   unix_time  u64       seconds
//! sections, each: tag [u8; 4], len u32, len bytes
//!   "CTXT"  raw machine context          (normal and full)
//!   "MAPS"  chunk of /proc/self/maps     (full, Linux only, repeated)
//!   "END\0" empty, always last
//! ```
//!
//! Nothing here allocates; the record is built in stack buffers.

use crashguard_core::error::SnapshotError;
use crashguard_core::fault::FaultContext;
use crashguard_core::policy::DumpVerbosity;
use crashguard_core::traits::SnapshotWriter;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::thread::current_process_id;

pub const MAGIC: [u8; 8] = *b"CGDUMP\0\0";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 52;

pub const TAG_CONTEXT: [u8; 4] = *b"CTXT";
pub const TAG_MAPS: [u8; 4] = *b"MAPS";
pub const TAG_END: [u8; 4] = *b"END\0";

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
const MAPS_CHUNK: usize = 1024;

fn verbosity_code(verbosity: DumpVerbosity) -> u32 {
    match verbosity {
        DumpVerbosity::Minimal => 0,
        DumpVerbosity::Normal => 1,
        DumpVerbosity::Full => 2,
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u32,
    pub verbosity: u32,
    pub signal: i32,
    pub code: i32,
    pub address: u64,
    pub pid: u32,
    pub tid: u64,
    pub unix_time: u64,
}

impl RecordHeader {
    fn for_fault(fault: &FaultContext, verbosity: DumpVerbosity) -> Self {
        let unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        RecordHeader {
            version: FORMAT_VERSION,
            verbosity: verbosity_code(verbosity),
            signal: fault.signal,
            code: fault.code,
            address: fault.address as u64,
            pid: current_process_id(),
            tid: fault.thread_id,
            unix_time,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(&MAGIC);
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..16].copy_from_slice(&self.verbosity.to_le_bytes());
        out[16..20].copy_from_slice(&self.signal.to_le_bytes());
        out[20..24].copy_from_slice(&self.code.to_le_bytes());
        out[24..32].copy_from_slice(&self.address.to_le_bytes());
        out[32..36].copy_from_slice(&self.pid.to_le_bytes());
        out[36..44].copy_from_slice(&self.tid.to_le_bytes());
        out[44..52].copy_from_slice(&self.unix_time.to_le_bytes());
        out
    }

    /// Parse the header at the start of `bytes`; `None` if it is not a record
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[0..8] != MAGIC {
            return None;
        }
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let u64_at = |i: usize| (u32_at(i) as u64) | ((u32_at(i + 4) as u64) << 32);
        Some(RecordHeader {
            version: u32_at(8),
            verbosity: u32_at(12),
            signal: u32_at(16) as i32,
            code: u32_at(20) as i32,
            address: u64_at(24),
            pid: u32_at(32),
            tid: u64_at(36),
            unix_time: u64_at(44),
        })
    }
}

fn write_section(out: &mut dyn Write, tag: [u8; 4], data: &[u8]) -> Result<(), SnapshotError> {
    out.write_all(&tag)?;
    out.write_all(&(data.len() as u32).to_le_bytes())?;
    out.write_all(data)?;
    Ok(())
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn machine_context_bytes(fault: &FaultContext) -> &[u8] {
            if !fault.has_machine_context() {
                return &[];
            }
            // The kernel hands the handler a complete ucontext_t
            unsafe {
                std::slice::from_raw_parts(
                    fault.machine_context.cast::<u8>(),
                    std::mem::size_of::<libc::ucontext_t>(),
                )
            }
        }
    } else {
        fn machine_context_bytes(_fault: &FaultContext) -> &[u8] {
            &[]
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        fn write_memory_map(out: &mut dyn Write) -> Result<(), SnapshotError> {
            use std::io::Read;

            let mut maps = match std::fs::File::open("/proc/self/maps") {
                Ok(f) => f,
                // Optional section
                Err(_) => return Ok(()),
            };
            let mut chunk = [0u8; MAPS_CHUNK];
            loop {
                let n = match maps.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                write_section(out, TAG_MAPS, &chunk[..n])?;
            }
            Ok(())
        }
    } else {
        fn write_memory_map(_out: &mut dyn Write) -> Result<(), SnapshotError> {
            Ok(())
        }
    }
}

/// Writes the record described in the module docs
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextRecordWriter;

impl ContextRecordWriter {
    pub fn new() -> Self {
        ContextRecordWriter
    }
}

impl SnapshotWriter for ContextRecordWriter {
    fn write_snapshot(
        &self,
        fault: &FaultContext,
        verbosity: DumpVerbosity,
        out: &mut dyn Write,
    ) -> Result<(), SnapshotError> {
        out.write_all(&RecordHeader::for_fault(fault, verbosity).encode())?;

        if verbosity >= DumpVerbosity::Normal {
            let context = machine_context_bytes(fault);
            if !context.is_empty() {
                write_section(out, TAG_CONTEXT, context)?;
            }
        }
        if verbosity == DumpVerbosity::Full {
            write_memory_map(out)?;
        }

        write_section(out, TAG_END, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashguard_core::fault::FaultKind;
    use std::io;

    /// Walk the sections after the header, returning (tag, len) pairs
    fn sections(record: &[u8]) -> Vec<([u8; 4], usize)> {
        let mut out = Vec::new();
        let mut at = HEADER_LEN;
        while at + 8 <= record.len() {
            let tag = [record[at], record[at + 1], record[at + 2], record[at + 3]];
            let len = u32::from_le_bytes([record[at + 4], record[at + 5], record[at + 6], record[at + 7]]) as usize;
            out.push((tag, len));
            at += 8 + len;
        }
        assert_eq!(at, record.len());
        out
    }

    fn fault() -> FaultContext {
        FaultContext {
            kind: FaultKind::Segmentation,
            signal: 11,
            code: 1,
            address: 0xdead_beef,
            thread_id: 4242,
            info: std::ptr::null(),
            machine_context: std::ptr::null(),
        }
    }

    #[test]
    fn test_minimal_record() {
        let mut record = Vec::new();
        ContextRecordWriter::new()
            .write_snapshot(&fault(), DumpVerbosity::Minimal, &mut record)
            .unwrap();

        let header = RecordHeader::decode(&record).unwrap();
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.verbosity, 0);
        assert_eq!(header.signal, 11);
        assert_eq!(header.code, 1);
        assert_eq!(header.address, 0xdead_beef);
        assert_eq!(header.tid, 4242);
        assert_eq!(header.pid, std::process::id());
        assert!(header.unix_time > 0);
        assert_eq!(sections(&record), vec![(TAG_END, 0)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_normal_includes_machine_context() {
        let context: libc::ucontext_t = unsafe { std::mem::zeroed() };
        let mut f = fault();
        f.machine_context = (&context as *const libc::ucontext_t).cast();

        let mut record = Vec::new();
        ContextRecordWriter
            .write_snapshot(&f, DumpVerbosity::Normal, &mut record)
            .unwrap();
        assert_eq!(
            sections(&record),
            vec![(TAG_CONTEXT, std::mem::size_of::<libc::ucontext_t>()), (TAG_END, 0)]
        );
    }

    #[test]
    fn test_normal_without_context_is_header_only() {
        let mut record = Vec::new();
        ContextRecordWriter
            .write_snapshot(&fault(), DumpVerbosity::Normal, &mut record)
            .unwrap();
        assert_eq!(sections(&record), vec![(TAG_END, 0)]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_appends_memory_map() {
        let mut record = Vec::new();
        ContextRecordWriter
            .write_snapshot(&fault(), DumpVerbosity::Full, &mut record)
            .unwrap();
        let found = sections(&record);
        assert!(found.iter().any(|(tag, len)| *tag == TAG_MAPS && *len > 0));
        assert_eq!(found.last(), Some(&(TAG_END, 0)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(RecordHeader::decode(b"not a record"), None);
        assert_eq!(RecordHeader::decode(&[0u8; HEADER_LEN]), None);
    }

    const ENOSPC: i32 = 28;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(ENOSPC))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_reported() {
        let err = ContextRecordWriter
            .write_snapshot(&fault(), DumpVerbosity::Minimal, &mut FailingWriter)
            .unwrap_err();
        assert_eq!(err, SnapshotError::WriteFailed(ENOSPC));
    }
}
