//! File-system collaborator interface
//!
//! The kernel never interprets file contents. It stores handles in PCBs,
//! passes them to children on spawn, and forwards I/O calls here.

use bitflags::bitflags;

use crate::error::FsResult;
use crate::types::Fd;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Read from the start; the file must exist
    Read,
    /// Create or truncate, then write
    Write,
    /// Create if missing, write at the end
    Append,
}

bitflags! {
    /// Permission bits of a file
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXECUTE = 0b001;
    }
}

impl Permissions {
    /// `rwx`-style rendering used by `ls`
    pub fn render(self) -> String {
        let mut out = String::with_capacity(3);
        out.push(if self.contains(Permissions::READ) { 'r' } else { '-' });
        out.push(if self.contains(Permissions::WRITE) { 'w' } else { '-' });
        out.push(if self.contains(Permissions::EXECUTE) { 'x' } else { '-' });
        out
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::READ | Permissions::WRITE
    }
}

/// Directory entry as reported by `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: usize,
    pub permissions: Permissions,
}

/// Backing store for process I/O.
///
/// Handles 0 and 1 are the terminal; every other handle comes from `open`.
pub trait FileSystem: Send {
    fn open(&mut self, path: &str, mode: OpenMode) -> FsResult<Fd>;

    fn close(&mut self, fd: Fd) -> FsResult<()>;

    /// Reads up to `n` bytes. An empty result means end of file.
    fn read(&mut self, fd: Fd, n: usize) -> FsResult<Vec<u8>>;

    /// Writes `bytes`, returning how many were accepted
    fn write(&mut self, fd: Fd, bytes: &[u8]) -> FsResult<usize>;

    fn unlink(&mut self, path: &str) -> FsResult<()>;

    fn rename(&mut self, from: &str, to: &str) -> FsResult<()>;

    /// Creates an empty file if `path` does not exist
    fn touch(&mut self, path: &str) -> FsResult<()>;

    fn chmod(&mut self, path: &str, permissions: Permissions) -> FsResult<()>;

    fn stat(&self, path: &str) -> FsResult<FileInfo>;

    /// All files, sorted by name
    fn list(&self) -> Vec<FileInfo>;

    /// Writes buffered state to durable storage, if there is any
    fn sync(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// Console device behind handles 0 and 1
pub trait Terminal: Send {
    /// Reads up to `n` bytes of pending input. `WouldBlock` means nothing
    /// is pending yet; an empty result means the input is closed.
    fn read(&mut self, n: usize) -> FsResult<Vec<u8>>;

    fn write(&mut self, bytes: &[u8]) -> FsResult<usize>;
}
