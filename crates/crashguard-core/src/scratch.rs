//! Fixed-capacity string buffers for fault-time formatting
//!
//! Everything composed while a fault is being handled (dump path, subject,
//! body) lives in a `ScratchBuf` on the handling thread's stack. Writes are
//! bounds-checked: an overflowing write fails instead of truncating, and the
//! buffer remembers that it overflowed.

use core::fmt;

/// Capacity for a dump descriptor (`"{name} {version} - {timestamp}"`)
pub const DESCRIPTOR_CAP: usize = 256;
/// Capacity for a full dump path
pub const PATH_CAP: usize = 1024;
/// Capacity for a notification subject
pub const SUBJECT_CAP: usize = 512;
/// Capacity for a notification body
pub const BODY_CAP: usize = 2048;

/// Stack-resident UTF-8 buffer with a fixed capacity
pub struct ScratchBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
    overflowed: bool,
}

impl<const N: usize> ScratchBuf<N> {
    #[inline]
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
            overflowed: false,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once any write has been refused for lack of space
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
        self.overflowed = false;
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only whole `&str` values are ever copied in.
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Append `s` whole, or nothing at all
    pub fn push_str(&mut self, s: &str) -> Result<(), fmt::Error> {
        let end = self.len.checked_add(s.len()).ok_or(fmt::Error)?;
        if end > N {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.bytes[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }

    /// Append as much of `s` as fits below `limit` bytes, cutting at a char
    /// boundary
    ///
    /// Returns false when anything was dropped.
    pub fn push_truncated(&mut self, s: &str, limit: usize) -> bool {
        let room = limit.min(N).saturating_sub(self.len);
        if s.len() <= room {
            let _ = self.push_str(s);
            return true;
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let _ = self.push_str(&s[..cut]);
        self.overflowed = true;
        false
    }

    /// Append `s` with every `:`, `/` and `\` replaced by `.`
    pub fn push_sanitized(&mut self, s: &str) -> Result<(), fmt::Error> {
        let start = self.len;
        self.push_str(s)?;
        for b in &mut self.bytes[start..self.len] {
            if matches!(*b, b':' | b'/' | b'\\') {
                *b = b'.';
            }
        }
        Ok(())
    }
}

impl<const N: usize> Default for ScratchBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for ScratchBuf<N> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s)
    }
}

impl<const N: usize> fmt::Display for ScratchBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for ScratchBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchBuf")
            .field("contents", &self.as_str())
            .field("capacity", &N)
            .field("overflowed", &self.overflowed)
            .finish()
    }
}
