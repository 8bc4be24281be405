//! System call layer
//!
//! Processes talk to the kernel through a [`Sys`] handle, created for
//! them at spawn and bound to their pid. Calls that only mutate kernel
//! state are plain methods; calls that may suspend the caller (sleep,
//! wait, kill, exit, yield) are `async` and must be awaited.
//!
//! Every call takes the protected-mode guard around its queue mutations
//! and releases it before suspending.

extern crate alloc;

use alloc::sync::Arc;
use core::fmt;

use tickos_api::{Pid, ProcessStatus, Tick};

use crate::context::Suspend;
use crate::kernel::Kernel;

mod file_io;
mod process;

/// Kernel handle of one process
#[derive(Clone)]
pub struct Sys {
    kernel: Arc<Kernel>,
    pid: Pid,
    incarnation: u64,
}

impl Sys {
    pub(crate) fn new(kernel: Arc<Kernel>, pid: Pid, incarnation: u64) -> Self {
        Self { kernel, pid, incarnation }
    }

    pub fn getpid(&self) -> Pid {
        self.pid
    }

    /// Ticks since boot
    pub fn now(&self) -> Tick {
        self.kernel.ticks()
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.kernel.config().ticks_per_second()
    }

    /// Preemption point. Delivers a due timer tick and gives the CPU back
    /// to the scheduler when a reschedule is pending. Long-running process
    /// bodies call this in their loops.
    pub async fn checkpoint(&self) {
        if self.kernel.timer().poll() {
            self.kernel.timer_interrupt();
        }
        if self.kernel.take_resched() {
            self.kernel.scheduler_stats().record_switch(true);
            Suspend::new().await;
        }
    }

    /// Gives up the CPU; the caller stays ready at the tail of its queue
    pub async fn yield_now(&self) {
        self.suspend().await;
    }

    pub(crate) async fn suspend(&self) {
        self.kernel.scheduler_stats().record_switch(false);
        Suspend::new().await;
    }

    /// Status of the calling process, `None` once it no longer exists
    fn own_status(&self) -> Option<ProcessStatus> {
        self.kernel.with_state(|state| match state.registry.get(self.pid) {
            Some(pcb) if pcb.incarnation == self.incarnation => state.live_status(self.pid),
            _ => None,
        })
    }

    /// Reacts to what a call just did to the caller: an ended process never
    /// runs again, a stopped or blocked one suspends, and a ready one
    /// honours a pending reschedule.
    async fn settle(&self) {
        match self.own_status() {
            None
            | Some(ProcessStatus::Exited)
            | Some(ProcessStatus::Signaled)
            | Some(ProcessStatus::Orphan) => core::future::pending::<()>().await,
            Some(ProcessStatus::Stopped) | Some(ProcessStatus::Blocked) => self.suspend().await,
            Some(ProcessStatus::Ready) => {
                if self.kernel.take_resched() {
                    self.kernel.scheduler_stats().record_switch(true);
                    Suspend::new().await;
                }
            }
        }
    }
}

impl fmt::Debug for Sys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sys")
            .field("pid", &self.pid)
            .field("incarnation", &self.incarnation)
            .finish()
    }
}
