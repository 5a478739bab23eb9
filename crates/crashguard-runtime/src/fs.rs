//! Filesystem collaborator backed by `std::fs`

use crashguard_core::scratch::ScratchBuf;
use crashguard_core::traits::FileSystem;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

/// Real filesystem.
///
/// The temp directory is resolved once at construction: reading the
/// environment from a fault handler could block on the env lock.
#[derive(Debug, Clone)]
pub struct OsFileSystem {
    temp_dir: Option<String>,
}

impl OsFileSystem {
    /// Resolve `$TMPDIR` (or the platform default) now
    pub fn new() -> Self {
        let temp_dir = std::env::temp_dir()
            .into_os_string()
            .into_string()
            .ok()
            .filter(|s| !s.is_empty());
        OsFileSystem { temp_dir }
    }

    /// Use a fixed temp directory
    pub fn with_temp_dir(dir: impl Into<String>) -> Self {
        let dir = dir.into();
        OsFileSystem {
            temp_dir: (!dir.is_empty()).then_some(dir),
        }
    }
}

impl Default for OsFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for OsFileSystem {
    type Output = File;

    fn temp_dir<const N: usize>(&self, out: &mut ScratchBuf<N>) -> bool {
        out.clear();
        match &self.temp_dir {
            Some(dir) => out.push_str(dir).is_ok(),
            None => false,
        }
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn create_for_write(&self, path: &Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // Dumps carry process memory
            options.mode(0o600);
        }
        options.open(path)
    }
}
