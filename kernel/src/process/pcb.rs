//! Process control block

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use tickos_api::{Fd, Pid, Priority, ProcessInfo, ProcessStatus, STDIN_FILENO, STDOUT_FILENO, WaitTarget};

use crate::context::Task;

/// Per-process kernel record
pub struct Pcb {
    pub pid: Pid,
    /// `NO_PARENT` for processes spawned by the kernel itself
    pub ppid: Pid,
    pub children: Vec<Pid>,
    pub name: String,
    pub args: Vec<String>,
    pub priority: Priority,
    pub status: ProcessStatus,
    pub stdin: Fd,
    pub stdout: Fd,
    /// Set while blocked in `wait`
    pub wait_for: Option<WaitTarget>,
    pub sleep_remaining: u64,
    /// Distinguishes this process from later holders of the same pid
    pub incarnation: u64,
    /// Saved execution state; absent while the task is being polled
    pub(crate) context: Option<Task>,
}

impl Pcb {
    pub(crate) fn new(pid: Pid, ppid: Pid, incarnation: u64) -> Self {
        Self {
            pid,
            ppid,
            children: Vec::new(),
            name: String::new(),
            args: Vec::new(),
            priority: Priority::Medium,
            status: ProcessStatus::Ready,
            stdin: STDIN_FILENO,
            stdout: STDOUT_FILENO,
            wait_for: None,
            sleep_remaining: 0,
            incarnation,
            context: None,
        }
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            ppid: self.ppid,
            priority: self.priority,
            status: self.status,
            name: self.name.clone(),
        }
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }
}

impl core::fmt::Debug for Pcb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pcb")
            .field("pid", &self.pid)
            .field("ppid", &self.ppid)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}
