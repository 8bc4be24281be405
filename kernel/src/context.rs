//! Context-switch engine
//!
//! Each process's saved execution state is a pinned, boxed future owned by
//! its PCB. Resuming a process is polling that future once; a process
//! suspends by returning `Pending` from one of the kernel's suspension
//! points. Only the scheduler loop ever polls, so exactly one process runs
//! at a time and no waker is needed.
//!
//! # Contexts
//!
//! - **Main**: the caller of [`Kernel::run`]; control returns here on
//!   logout or when nothing can run any more.
//! - **Scheduler**: picks a ready queue and dispatches its head.
//! - **Process**: a process future is being polled.
//! - **Returner**: a process future completed; it is exited implicitly.
//! - **Idle**: nothing is ready; wait for (or fast-forward to) the next
//!   tick.

extern crate alloc;

use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use tickos_api::Pid;

use crate::kernel::Kernel;

/// Body of a process
pub type ProcessFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Saved execution state of one process
pub struct Task {
    future: ProcessFuture,
}

impl Task {
    pub(crate) fn new(future: ProcessFuture) -> Self {
        Self { future }
    }

    fn resume(&mut self) -> Poll<()> {
        let mut cx = Context::from_waker(Waker::noop());
        self.future.as_mut().poll(&mut cx)
    }
}

/// Suspends the calling process once; it continues when next dispatched
#[must_use = "futures do nothing unless awaited"]
pub(crate) struct Suspend {
    suspended: bool,
}

impl Suspend {
    pub(crate) fn new() -> Self {
        Self { suspended: false }
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.suspended {
            Poll::Ready(())
        } else {
            self.suspended = true;
            Poll::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    Main,
    Scheduler,
    Process(Pid),
    Returner,
    Idle,
}

/// Why [`Kernel::run`] handed control back to main
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A process asked for shutdown
    Logout,
    /// Every process has ended
    AllExited,
    /// Nothing is ready or sleeping, so nothing can become ready
    Stalled,
    /// The dispatch budget given to [`Kernel::run_for`] ran out
    BudgetExhausted,
}

enum Dispatch {
    Process(Pid),
    Idle,
    Done(RunOutcome),
}

impl Kernel {
    /// Runs the scheduler until logout or until nothing can run
    pub fn run(&self) -> RunOutcome {
        self.run_loop(None)
    }

    /// Like [`Kernel::run`], but returns after `dispatches` process
    /// dispatches
    pub fn run_for(&self, dispatches: usize) -> RunOutcome {
        self.run_loop(Some(dispatches))
    }

    fn run_loop(&self, budget: Option<usize>) -> RunOutcome {
        let mut dispatched = 0usize;
        let outcome = loop {
            if self.shutdown_requested() {
                break RunOutcome::Logout;
            }
            if budget.is_some_and(|budget| dispatched >= budget) {
                break RunOutcome::BudgetExhausted;
            }
            self.enter_context(ExecutionContext::Scheduler);
            match self.schedule() {
                Dispatch::Process(pid) => {
                    dispatched += 1;
                    self.switch_to(pid);
                }
                Dispatch::Idle => self.idle(),
                Dispatch::Done(outcome) => break outcome,
            }
        };
        self.enter_context(ExecutionContext::Main);
        log::debug!("scheduler returned to main: {outcome:?}");
        outcome
    }

    fn schedule(&self) -> Dispatch {
        self.with_state(|state| {
            if let Some((pid, level)) = state.pick_next() {
                self.scheduler_stats().record_dispatch(level);
                return Dispatch::Process(pid);
            }
            if !state.has_live_processes() {
                Dispatch::Done(RunOutcome::AllExited)
            } else if state.has_timed_sleeper() {
                Dispatch::Idle
            } else {
                Dispatch::Done(RunOutcome::Stalled)
            }
        })
    }

    fn idle(&self) {
        self.enter_context(ExecutionContext::Idle);
        self.scheduler_stats().record_idle();
        self.timer().wait_for_tick();
        self.timer_interrupt();
    }

    fn switch_to(&self, pid: Pid) {
        let Some((mut task, incarnation)) = self.take_context(pid) else {
            return;
        };
        self.enter_context(ExecutionContext::Process(pid));
        let finished = task.resume().is_ready();

        let leftover = if finished {
            self.enter_context(ExecutionContext::Returner);
            self.return_from(pid, incarnation);
            Some(task)
        } else {
            self.park(pid, incarnation, task)
        };
        // dropped outside the kernel lock
        drop(leftover);
        self.with_state(|state| state.current = None);
    }

    fn take_context(&self, pid: Pid) -> Option<(Task, u64)> {
        self.with_state(|state| {
            let pcb = state.registry.get_mut(pid)?;
            let incarnation = pcb.incarnation;
            match pcb.context.take() {
                Some(task) => Some((task, incarnation)),
                None => {
                    log::error!("pid {pid} was dispatched without a saved context");
                    if let Err(err) = state.terminate(pid, true) {
                        log::error!("could not retire pid {pid}: {err}");
                    }
                    state.current = None;
                    None
                }
            }
        })
    }

    /// Saves the suspended task back into its PCB, unless the process
    /// ended (or was destroyed) while it ran. Returns the task if it was
    /// not saved.
    fn park(&self, pid: Pid, incarnation: u64, task: Task) -> Option<Task> {
        self.with_state(|state| match state.registry.get_mut(pid) {
            Some(pcb) if pcb.incarnation == incarnation && !pcb.status.is_terminated() => {
                pcb.context = Some(task);
                None
            }
            _ => Some(task),
        })
    }

    /// Implicit exit of a process whose body returned
    fn return_from(&self, pid: Pid, incarnation: u64) {
        self.with_state(|state| {
            let same_process = state
                .registry
                .get(pid)
                .is_some_and(|pcb| pcb.incarnation == incarnation);
            if same_process {
                if let Err(err) = state.terminate(pid, false) {
                    log::error!("returner could not exit pid {pid}: {err}");
                }
            }
        });
    }
}
