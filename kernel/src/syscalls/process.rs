//! Process-lifecycle system calls

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::future::Future;

use tickos_api::{
    Fd, KernelError, KernelResult, Pid, Priority, ProcessInfo, ProcessStatus, Signal, WaitOutcome,
    WaitTarget,
};

use super::Sys;

impl Sys {
    /// Starts `entry` as a medium-priority child of the caller, reading
    /// from `stdin` and writing to `stdout`. The child is queued at the
    /// head of its ready queue; the caller keeps running.
    pub fn spawn<F, Fut>(&self, entry: F, args: Vec<String>, stdin: Fd, stdout: Fd) -> KernelResult<Pid>
    where
        F: FnOnce(Sys, Vec<String>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.kernel.spawn_process(
            Some(self.pid),
            Priority::Medium,
            entry,
            args,
            Some((stdin, stdout)),
        )
    }

    /// Waits for a child to end or stop.
    ///
    /// Ended children are reaped and reported once; stopped children are
    /// reported but stay in place. With `nohang` the call never suspends
    /// and reports `NoChange` when nothing happened.
    pub async fn wait(&self, target: WaitTarget, nohang: bool) -> KernelResult<WaitOutcome> {
        let immediate = self.kernel.with_state(|state| {
            state.validate_wait(self.pid, target)?;
            if let Some((pid, status)) = state.find_changed_child(self.pid, target) {
                return Ok(Some(state.collect(pid, status)));
            }
            if nohang {
                let status = match target {
                    WaitTarget::Pid(pid) => state.live_status(pid),
                    WaitTarget::Any => None,
                };
                return Ok(Some(WaitOutcome::NoChange { status }));
            }
            state.block_for_wait(self.pid, target);
            Ok(None)
        })?;
        if let Some(outcome) = immediate {
            return Ok(outcome);
        }

        self.suspend().await;

        self.kernel.with_state(|state| match state.find_changed_child(self.pid, target) {
            Some((pid, status)) => Ok(state.collect(pid, status)),
            None => {
                log::error!("pid {} woke from wait({target:?}) with nothing to collect", self.pid);
                Err(KernelError::InvalidPid)
            }
        })
    }

    /// Sends `signal` to `pid`. Suspends the caller if the signal stopped
    /// it, and never returns if the caller ended as a result.
    pub async fn kill(&self, pid: Pid, signal: Signal) -> KernelResult<()> {
        self.kernel.with_state(|state| state.kill(pid, signal))?;
        self.settle().await;
        Ok(())
    }

    /// Blocks the caller for `ticks` timer ticks; zero returns at once
    pub async fn sleep(&self, ticks: u64) {
        if ticks == 0 {
            return;
        }
        self.kernel.with_state(|state| state.block_for_sleep(self.pid, ticks));
        self.suspend().await;
    }

    pub fn nice(&self, pid: Pid, priority: Priority) -> KernelResult<()> {
        self.kernel.nice(pid, priority)
    }

    /// Ends the caller. The returned future never completes.
    pub async fn exit(&self) {
        self.kernel.with_state(|state| {
            if let Err(err) = state.terminate(self.pid, false) {
                log::error!("exit of pid {} failed: {err}", self.pid);
            }
        });
        core::future::pending::<()>().await
    }

    /// Current status of `pid`, `None` once it has been reaped or
    /// destroyed
    pub fn status(&self, pid: Pid) -> Option<ProcessStatus> {
        self.kernel.status_of(pid)
    }

    pub fn ps(&self) -> Vec<ProcessInfo> {
        self.kernel.process_table()
    }

    /// Asks the kernel to return to main. The returned future never
    /// completes.
    pub async fn logout(&self) {
        log::info!("logout requested by pid {}", self.pid);
        self.kernel.request_shutdown();
        core::future::pending::<()>().await
    }

    /// Records which process interactive interrupts are routed to
    pub fn set_foreground(&self, pid: Option<Pid>) {
        self.kernel.set_foreground(pid);
    }
}
