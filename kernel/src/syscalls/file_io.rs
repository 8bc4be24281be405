//! File I/O pass-through to the file-system collaborator

extern crate alloc;

use alloc::vec::Vec;

use tickos_api::{Fd, FileInfo, FsResult, OpenMode, Permissions, STDIN_FILENO, STDOUT_FILENO};

use super::Sys;

impl Sys {
    /// Input handle inherited at spawn
    pub fn stdin(&self) -> Fd {
        self.kernel
            .with_state(|state| state.registry.get(self.pid).map_or(STDIN_FILENO, |pcb| pcb.stdin))
    }

    /// Output handle inherited at spawn
    pub fn stdout(&self) -> Fd {
        self.kernel
            .with_state(|state| state.registry.get(self.pid).map_or(STDOUT_FILENO, |pcb| pcb.stdout))
    }

    pub fn open(&self, path: &str, mode: OpenMode) -> FsResult<Fd> {
        self.kernel.io().open(path, mode)
    }

    pub fn close(&self, fd: Fd) -> FsResult<()> {
        self.kernel.io().close(fd)
    }

    pub fn read(&self, fd: Fd, n: usize) -> FsResult<Vec<u8>> {
        self.kernel.io().read(fd, n)
    }

    pub fn write(&self, fd: Fd, bytes: &[u8]) -> FsResult<usize> {
        self.kernel.io().write(fd, bytes)
    }

    /// Writes `text` to the caller's output handle
    pub fn print(&self, text: &str) -> FsResult<usize> {
        let fd = self.stdout();
        self.write(fd, text.as_bytes())
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        self.kernel.io().unlink(path)
    }

    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.kernel.io().rename(from, to)
    }

    pub fn touch(&self, path: &str) -> FsResult<()> {
        self.kernel.io().touch(path)
    }

    pub fn chmod(&self, path: &str, permissions: Permissions) -> FsResult<()> {
        self.kernel.io().chmod(path, permissions)
    }

    pub fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.kernel.io().stat(path)
    }

    pub fn list_files(&self) -> Vec<FileInfo> {
        self.kernel.io().list()
    }
}
