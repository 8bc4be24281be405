//! Fallback file-system collaborator

use tickos_api::{
    Fd, FileInfo, FileSystem, FsError, FsResult, OpenMode, Permissions, STDIN_FILENO,
    STDOUT_FILENO,
};

/// Used when no file system is attached: terminal input is closed,
/// terminal output is discarded and no file exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFileSystem;

impl FileSystem for NullFileSystem {
    fn open(&mut self, _path: &str, _mode: OpenMode) -> FsResult<Fd> {
        Err(FsError::NotFound)
    }

    fn close(&mut self, fd: Fd) -> FsResult<()> {
        match fd {
            STDIN_FILENO | STDOUT_FILENO => Ok(()),
            _ => Err(FsError::BadHandle),
        }
    }

    fn read(&mut self, fd: Fd, _n: usize) -> FsResult<Vec<u8>> {
        match fd {
            STDIN_FILENO => Ok(Vec::new()),
            _ => Err(FsError::BadHandle),
        }
    }

    fn write(&mut self, fd: Fd, bytes: &[u8]) -> FsResult<usize> {
        match fd {
            STDOUT_FILENO => Ok(bytes.len()),
            _ => Err(FsError::BadHandle),
        }
    }

    fn unlink(&mut self, _path: &str) -> FsResult<()> {
        Err(FsError::NotFound)
    }

    fn rename(&mut self, _from: &str, _to: &str) -> FsResult<()> {
        Err(FsError::NotFound)
    }

    fn touch(&mut self, _path: &str) -> FsResult<()> {
        Err(FsError::PermissionDenied)
    }

    fn chmod(&mut self, _path: &str, _permissions: Permissions) -> FsResult<()> {
        Err(FsError::NotFound)
    }

    fn stat(&self, _path: &str) -> FsResult<FileInfo> {
        Err(FsError::NotFound)
    }

    fn list(&self) -> Vec<FileInfo> {
        Vec::new()
    }
}
