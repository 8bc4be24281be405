//! tickos API - Core types and collaborator interfaces for the tickos kernel
//!
//! This crate holds the vocabulary shared by the kernel, the file system
//! and the shell, so that none of them depends on another's internals.
//!
//! # Architecture
//!
//! - **Types**: identifiers (`Pid`, `Fd`) and well-known handles
//! - **Process**: priorities, signals, statuses and wait results
//! - **Error**: the kernel and file-system error taxonomies
//! - **Fs**: the file-system and terminal collaborator traits
//!
//! # Usage
//!
//! ```rust
//! use tickos_api::{KernelError, Priority};
//!
//! assert_eq!(Priority::try_from(1), Ok(Priority::Low));
//! assert_eq!(Priority::try_from(7), Err(KernelError::InvalidPriority));
//! ```

pub mod error;
pub mod fs;
pub mod process;
pub mod types;

// Re-export commonly used types
pub use crate::error::{FsError, FsResult, KernelError, KernelResult};
pub use crate::fs::{FileInfo, FileSystem, OpenMode, Permissions, Terminal};
pub use crate::process::{Priority, ProcessInfo, ProcessStatus, Signal, WaitOutcome, WaitTarget};
pub use crate::types::*;
