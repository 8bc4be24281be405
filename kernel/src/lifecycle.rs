//! Process lifecycle transitions
//!
//! Every method here moves PCBs between queues and must run with the
//! protected-mode guard held and the kernel state locked. Each transition
//! is "unlink from one list, link into another" plus its event.

extern crate alloc;

use alloc::vec::Vec;

use tickos_api::{
    KernelError, KernelResult, Pid, Priority, ProcessInfo, ProcessStatus, Signal, WaitOutcome,
    WaitTarget,
};

use crate::event_log::{Action, ProcessEvent};
use crate::kernel::KernelState;
use crate::process::QueueId;

impl KernelState {
    pub(crate) fn log(&mut self, action: Action, pid: Pid) {
        let Some(pcb) = self.registry.get(pid) else {
            return;
        };
        let event = ProcessEvent {
            tick: self.now,
            action,
            pid,
            priority: pcb.priority,
            name: pcb.name.clone(),
        };
        self.events.record(event);
    }

    /// Status of a PCB that is still on a primary queue
    pub(crate) fn live_status(&self, pid: Pid) -> Option<ProcessStatus> {
        if !self.queues.contains(pid) {
            return None;
        }
        self.registry.get(pid).map(|pcb| pcb.status)
    }

    fn set_status(&mut self, pid: Pid, status: ProcessStatus) {
        if let Some(pcb) = self.registry.get_mut(pid) {
            pcb.status = status;
        }
    }

    fn priority_of(&self, pid: Pid) -> Priority {
        self.registry
            .get(pid)
            .map(|pcb| pcb.priority)
            .unwrap_or(Priority::Medium)
    }

    /// Links a freshly created PCB at the head of its ready queue
    pub(crate) fn admit(&mut self, pid: Pid) {
        let queue = QueueId::ready(self.priority_of(pid));
        self.queues.add_head(queue, pid);
        self.set_status(pid, ProcessStatus::Ready);
        self.log(Action::Create, pid);
    }

    fn make_ready(&mut self, pid: Pid) {
        self.queues.remove_from_primary(pid);
        self.queues.add_tail(QueueId::ready(self.priority_of(pid)), pid);
        self.set_status(pid, ProcessStatus::Ready);
    }

    fn make_blocked(&mut self, pid: Pid) {
        self.queues.remove_from_primary(pid);
        self.queues.add_tail(QueueId::Blocked, pid);
        self.set_status(pid, ProcessStatus::Blocked);
        self.log(Action::Blocked, pid);
    }

    pub(crate) fn block_for_sleep(&mut self, pid: Pid, ticks: u64) {
        if let Some(pcb) = self.registry.get_mut(pid) {
            pcb.sleep_remaining = ticks;
        }
        self.make_blocked(pid);
        self.queues.add_tail(QueueId::Sleeping, pid);
    }

    pub(crate) fn block_for_wait(&mut self, pid: Pid, target: WaitTarget) {
        if let Some(pcb) = self.registry.get_mut(pid) {
            pcb.wait_for = Some(target);
        }
        self.queues.add_tail(QueueId::WaitBlocked, pid);
        self.make_blocked(pid);
    }

    /// Counts every sleeper down by one tick and readies the expired ones
    /// that are still blocked. Stopped sleepers keep counting.
    pub(crate) fn sweep_sleepers(&mut self) {
        let sleepers: Vec<Pid> = self.queues.get(QueueId::Sleeping).iter().collect();
        for pid in sleepers {
            let Some(pcb) = self.registry.get_mut(pid) else {
                self.queues.delete(QueueId::Sleeping, pid);
                continue;
            };
            pcb.sleep_remaining = pcb.sleep_remaining.saturating_sub(1);
            if pcb.sleep_remaining == 0 && pcb.status == ProcessStatus::Blocked {
                self.queues.delete(QueueId::Sleeping, pid);
                self.make_ready(pid);
                self.log(Action::Unblocked, pid);
            }
        }
    }

    /// Readies the first process waiting on `child`'s state change
    pub(crate) fn unblock_waiter(&mut self, child: Pid) {
        let Some(parent) = self.registry.parent_of(child) else {
            return;
        };
        let waiter = self.queues.get(QueueId::WaitBlocked).iter().find(|&waiter| {
            match self.registry.get(waiter).and_then(|pcb| pcb.wait_for) {
                Some(WaitTarget::Pid(target)) => target == child,
                Some(WaitTarget::Any) => waiter == parent,
                None => false,
            }
        });
        if let Some(waiter) = waiter {
            self.queues.delete(QueueId::WaitBlocked, waiter);
            if let Some(pcb) = self.registry.get_mut(waiter) {
                pcb.wait_for = None;
            }
            self.make_ready(waiter);
            self.log(Action::Unblocked, waiter);
        }
    }

    /// Ends a process. Idempotent for processes that already ended.
    ///
    /// A regular process becomes a zombie and wakes its waiting parent; an
    /// orphan is destroyed on the spot. Either way every live child is
    /// then orphaned and terminated, depth first.
    pub(crate) fn terminate(&mut self, pid: Pid, signaled: bool) -> KernelResult<()> {
        let status = self.live_status(pid).ok_or(KernelError::InvalidPid)?;
        if status.is_terminated() {
            return Ok(());
        }

        self.log(if signaled { Action::Signaled } else { Action::Exited }, pid);
        self.queues.remove_everywhere(pid);
        let children = self.registry.children_of(pid);

        if status == ProcessStatus::Orphan {
            self.destroy(pid);
        } else {
            if let Some(pcb) = self.registry.get_mut(pid) {
                if let Some(task) = pcb.context.take() {
                    self.retired.push(task);
                }
                pcb.wait_for = None;
                pcb.status = if signaled {
                    ProcessStatus::Signaled
                } else {
                    ProcessStatus::Exited
                };
            }
            self.queues.add_tail(QueueId::Zombie, pid);
            self.log(Action::Zombie, pid);
            self.unblock_waiter(pid);
        }
        if self.foreground == Some(pid) {
            self.foreground = None;
        }

        for child in children {
            let Some(child_status) = self.live_status(child) else {
                continue;
            };
            self.log(Action::Orphan, child);
            if child_status.is_terminated() {
                // unreaped zombie: nobody is left to wait for it
                self.queues.remove_everywhere(child);
                self.destroy(child);
                continue;
            }
            self.set_status(child, ProcessStatus::Orphan);
            self.terminate(child, true)?;
        }
        Ok(())
    }

    /// Drops the PCB, handing its saved context to the retired list
    fn destroy(&mut self, pid: Pid) {
        if let Some(task) = self.registry.cleanup(pid).and_then(|mut pcb| pcb.context.take()) {
            self.retired.push(task);
        }
    }

    pub(crate) fn kill(&mut self, pid: Pid, signal: Signal) -> KernelResult<()> {
        if signal == Signal::Interrupt {
            return Err(KernelError::InvalidSignal);
        }
        self.live_status(pid).ok_or(KernelError::InvalidPid)?;
        match signal {
            Signal::Stop => self.stop(pid),
            Signal::Continue => self.resume(pid),
            Signal::Terminate => return self.terminate(pid, true),
            Signal::Interrupt => {}
        }
        Ok(())
    }

    /// Stops a ready or sleeping process; anything else is left alone
    fn stop(&mut self, pid: Pid) {
        let sleeping = self.queues.find_by_pid(QueueId::Sleeping, pid);
        let stoppable = match self.live_status(pid) {
            Some(ProcessStatus::Ready) => true,
            Some(ProcessStatus::Blocked) => sleeping,
            _ => false,
        };
        if !stoppable {
            return;
        }
        self.queues.remove_from_primary(pid);
        self.queues.add_tail(QueueId::Stopped, pid);
        self.set_status(pid, ProcessStatus::Stopped);
        self.log(Action::Stopped, pid);
        self.unblock_waiter(pid);
    }

    /// Continues a stopped process, back into its sleep if it was mid-sleep
    fn resume(&mut self, pid: Pid) {
        if self.live_status(pid) != Some(ProcessStatus::Stopped) {
            return;
        }
        self.queues.delete(QueueId::Stopped, pid);
        if self.queues.find_by_pid(QueueId::Sleeping, pid) {
            self.queues.add_tail(QueueId::Blocked, pid);
            self.set_status(pid, ProcessStatus::Blocked);
        } else {
            self.queues.add_tail(QueueId::ready(self.priority_of(pid)), pid);
            self.set_status(pid, ProcessStatus::Ready);
        }
        self.log(Action::Continued, pid);
    }

    pub(crate) fn renice(&mut self, pid: Pid, priority: Priority) -> KernelResult<()> {
        let status = self.live_status(pid).ok_or(KernelError::InvalidPid)?;
        if let Some(pcb) = self.registry.get_mut(pid) {
            pcb.priority = priority;
        }
        self.log(Action::Nice, pid);
        if status == ProcessStatus::Ready {
            self.make_ready(pid);
        }
        Ok(())
    }

    /// Checks that `target` names something `parent` may wait for
    pub(crate) fn validate_wait(&self, parent: Pid, target: WaitTarget) -> KernelResult<()> {
        match target {
            WaitTarget::Pid(pid) => {
                let is_child = self.registry.parent_of(pid) == Some(parent);
                if is_child && self.queues.contains(pid) {
                    Ok(())
                } else {
                    Err(KernelError::InvalidPid)
                }
            }
            WaitTarget::Any => {
                let has_children = self
                    .registry
                    .children_of(parent)
                    .into_iter()
                    .any(|child| self.queues.contains(child));
                if has_children {
                    Ok(())
                } else {
                    Err(KernelError::NoChildren)
                }
            }
        }
    }

    /// First child of `parent` matching `target` that ended (zombie queue)
    /// or stopped (stopped queue), zombies first
    pub(crate) fn find_changed_child(
        &self,
        parent: Pid,
        target: WaitTarget,
    ) -> Option<(Pid, ProcessStatus)> {
        [QueueId::Zombie, QueueId::Stopped]
            .into_iter()
            .flat_map(|queue| self.queues.get(queue).iter())
            .find(|&pid| self.registry.parent_of(pid) == Some(parent) && target.matches(pid))
            .and_then(|pid| self.registry.get(pid).map(|pcb| (pid, pcb.status)))
    }

    /// Reports a changed child, reaping it if it ended
    pub(crate) fn collect(&mut self, pid: Pid, status: ProcessStatus) -> WaitOutcome {
        if status.is_terminated() {
            self.log(Action::Waited, pid);
            self.queues.delete(QueueId::Zombie, pid);
            self.registry.cleanup(pid);
        } else {
            self.log(Action::WaitedStopped, pid);
        }
        WaitOutcome::Changed { pid, status }
    }

    pub(crate) fn process_table(&self) -> Vec<ProcessInfo> {
        self.registry
            .pids()
            .into_iter()
            .filter(|&pid| self.queues.contains(pid))
            .filter_map(|pid| self.registry.get(pid).map(|pcb| pcb.info()))
            .collect()
    }

    /// Dispatch decision: rotate the head of the chosen ready queue to
    /// its tail and make it current
    pub(crate) fn pick_next(&mut self) -> Option<(Pid, usize)> {
        let level = self.scheduler.pick(self.queues.ready_levels())?;
        let priority = Priority::from_level(level)?;
        let pid = self.queues.get_mut(QueueId::ready(priority)).rotate()?;
        self.current = Some(pid);
        if self.log_schedule {
            self.log(Action::Schedule, pid);
        }
        Some((pid, level))
    }

    /// Whether any process has not ended yet
    pub(crate) fn has_live_processes(&self) -> bool {
        [
            QueueId::ReadyHigh,
            QueueId::ReadyMedium,
            QueueId::ReadyLow,
            QueueId::Blocked,
            QueueId::Stopped,
        ]
        .iter()
        .any(|&queue| !self.queues.get(queue).is_empty())
    }

    /// Whether a timer tick can make progress: a blocked sleeper exists
    pub(crate) fn has_timed_sleeper(&self) -> bool {
        self.queues
            .get(QueueId::Sleeping)
            .iter()
            .any(|pid| self.live_status(pid) == Some(ProcessStatus::Blocked))
    }
}
