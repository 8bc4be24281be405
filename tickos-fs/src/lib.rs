//! tickos file system
//!
//! In-memory implementation of the kernel's file-system collaborator.
//! Files live in a flat name space with `rwx` permission bits; handles 0
//! and 1 are routed to a [`Terminal`](tickos_api::Terminal). A file
//! system can be bound to a host image so its files survive restarts.
//!
//! # Example
//!
//! ```
//! use tickos_api::{FileSystem, OpenMode};
//! use tickos_fs::{MemFs, ScriptedTerminal};
//!
//! let mut fs = MemFs::new(ScriptedTerminal::new());
//! let fd = fs.open("notes", OpenMode::Write).unwrap();
//! fs.write(fd, b"hello").unwrap();
//! fs.close(fd).unwrap();
//! assert_eq!(fs.stat("notes").unwrap().size, 5);
//! ```

pub mod image;
pub mod memfs;
pub mod terminal;

pub use image::ImageError;
pub use memfs::MemFs;
pub use terminal::{HostTerminal, ScriptedTerminal};
