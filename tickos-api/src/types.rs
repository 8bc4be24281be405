//! Core identifier types

/// Process identifier type. Zero is never assigned and marks "no parent".
pub type Pid = u32;

/// File handle type, as issued by the file-system collaborator
pub type Fd = i32;

/// Kernel clock value, counted in timer ticks
pub type Tick = u64;

/// Handle of the terminal input stream
pub const STDIN_FILENO: Fd = 0;

/// Handle of the terminal output stream
pub const STDOUT_FILENO: Fd = 1;

/// Parent id recorded for processes spawned outside any process
pub const NO_PARENT: Pid = 0;
