//! Process management types

use core::fmt;

use crate::error::KernelError;
use crate::types::Pid;

/// Scheduling priority; the numeric value is the nice level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    High = -1,
    Medium = 0,
    Low = 1,
}

impl Priority {
    /// All priorities, in dispatch order
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Index of this priority's ready queue (0 = high)
    pub const fn level(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Priority owning ready queue `level`
    pub const fn from_level(level: usize) -> Option<Priority> {
        match level {
            0 => Some(Priority::High),
            1 => Some(Priority::Medium),
            2 => Some(Priority::Low),
            _ => None,
        }
    }

    /// Nice value, as shown by `ps`
    pub const fn nice(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Priority {
    type Error = KernelError;

    fn try_from(nice: i32) -> Result<Self, Self::Error> {
        match nice {
            -1 => Ok(Priority::High),
            0 => Ok(Priority::Medium),
            1 => Ok(Priority::Low),
            _ => Err(KernelError::InvalidPriority),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nice())
    }
}

/// Signals understood by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Stop,
    Continue,
    Terminate,
    /// Interactive interrupt; only delivered to the foreground process
    Interrupt,
}

/// Lifecycle status stored in a PCB.
///
/// Running is not a stored status: the running process is simply the one
/// whose context the scheduler has installed, and it stays `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Ready,
    Blocked,
    Stopped,
    Exited,
    Signaled,
    Orphan,
}

impl ProcessStatus {
    /// One-letter code used by `ps`
    pub const fn letter(self) -> char {
        match self {
            ProcessStatus::Ready => 'R',
            ProcessStatus::Blocked => 'B',
            ProcessStatus::Stopped => 'S',
            ProcessStatus::Exited | ProcessStatus::Signaled => 'Z',
            ProcessStatus::Orphan => 'O',
        }
    }

    /// Exited or signaled, waiting to be reaped
    pub const fn is_terminated(self) -> bool {
        matches!(self, ProcessStatus::Exited | ProcessStatus::Signaled)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Which child a `wait` call is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitTarget {
    Any,
    Pid(Pid),
}

impl WaitTarget {
    /// Decodes the conventional integer form: -1 for any child, else a pid
    pub fn from_raw(raw: i64) -> Result<Self, KernelError> {
        match raw {
            -1 => Ok(WaitTarget::Any),
            pid if pid >= 0 => Pid::try_from(pid)
                .map(WaitTarget::Pid)
                .map_err(|_| KernelError::InvalidPid),
            _ => Err(KernelError::InvalidPid),
        }
    }

    /// Whether the child `pid` satisfies this target
    pub fn matches(self, pid: Pid) -> bool {
        match self {
            WaitTarget::Any => true,
            WaitTarget::Pid(target) => target == pid,
        }
    }
}

/// Result of a successful `wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A child exited, was signaled, or stopped
    Changed { pid: Pid, status: ProcessStatus },
    /// Non-blocking wait found nothing; carries the target's status when
    /// a specific pid was waited on
    NoChange { status: Option<ProcessStatus> },
}

impl WaitOutcome {
    /// Pid of the changed child, or 0 when nothing changed
    pub fn pid(&self) -> Pid {
        match self {
            WaitOutcome::Changed { pid, .. } => *pid,
            WaitOutcome::NoChange { .. } => 0,
        }
    }

    pub fn status(&self) -> Option<ProcessStatus> {
        match self {
            WaitOutcome::Changed { status, .. } => Some(*status),
            WaitOutcome::NoChange { status } => *status,
        }
    }

    pub fn exited(&self) -> bool {
        matches!(self, WaitOutcome::Changed { status: ProcessStatus::Exited, .. })
    }

    pub fn signaled(&self) -> bool {
        matches!(self, WaitOutcome::Changed { status: ProcessStatus::Signaled, .. })
    }

    pub fn stopped(&self) -> bool {
        matches!(self, WaitOutcome::Changed { status: ProcessStatus::Stopped, .. })
    }
}

/// One row of the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Pid,
    pub priority: Priority,
    pub status: ProcessStatus,
    pub name: String,
}
