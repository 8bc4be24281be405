//! Error taxonomy for kernel calls and the file-system collaborator
//!
//! Every error carries a stable negative sentinel through `code()`, which is
//! what a C-style caller would have received in place of a pid or a count.

use core::fmt;

/// Errors returned by process-lifecycle system calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelError {
    /// No such process, or not a live child of the caller
    InvalidPid,
    /// Process table is full
    AllocationFailure,
    /// Priority outside -1..=1
    InvalidPriority,
    /// `wait` for any child while the caller has none
    NoChildren,
    /// Signal that cannot be sent with `kill`
    InvalidSignal,
}

impl KernelError {
    /// Negative sentinel for this error
    pub const fn code(self) -> i32 {
        match self {
            KernelError::InvalidPid => -1,
            KernelError::AllocationFailure => -2,
            KernelError::InvalidPriority => -3,
            KernelError::NoChildren => -4,
            KernelError::InvalidSignal => -5,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidPid => write!(f, "invalid pid"),
            KernelError::AllocationFailure => write!(f, "process table is full"),
            KernelError::InvalidPriority => write!(f, "priority must be -1, 0 or 1"),
            KernelError::NoChildren => write!(f, "no children to wait for"),
            KernelError::InvalidSignal => write!(f, "signal cannot be sent to a process"),
        }
    }
}

impl std::error::Error for KernelError {}

/// Result type for kernel calls
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors returned by the file-system collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsError {
    /// No file with that name
    NotFound,
    /// Permission bits forbid the access
    PermissionDenied,
    /// Handle is not open, or not open in a compatible mode
    BadHandle,
    /// File is already open for writing, or open at all for unlink
    Busy,
    /// Terminal has no input pending yet
    WouldBlock,
    /// Empty or otherwise unusable file name
    InvalidName,
    /// The backing store could not be written
    Storage,
}

impl FsError {
    /// Negative sentinel for this error
    pub const fn code(self) -> i32 {
        match self {
            FsError::NotFound => -10,
            FsError::PermissionDenied => -11,
            FsError::BadHandle => -12,
            FsError::Busy => -13,
            FsError::WouldBlock => -14,
            FsError::InvalidName => -15,
            FsError::Storage => -16,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "no such file"),
            FsError::PermissionDenied => write!(f, "permission denied"),
            FsError::BadHandle => write!(f, "bad file handle"),
            FsError::Busy => write!(f, "file is busy"),
            FsError::WouldBlock => write!(f, "no input available"),
            FsError::InvalidName => write!(f, "invalid file name"),
            FsError::Storage => write!(f, "backing store unavailable"),
        }
    }
}

impl std::error::Error for FsError {}

/// Result type for file-system calls
pub type FsResult<T> = Result<T, FsError>;
