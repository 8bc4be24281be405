//! The kernel object
//!
//! One [`Kernel`] owns every piece of process state. It is built with
//! [`KernelBuilder`], shared through an `Arc` (each process holds a
//! [`Sys`] handle pointing back at it), driven by [`Kernel::run`] and torn
//! down with [`Kernel::shutdown`].

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, MutexGuard};
use static_assertions::assert_impl_all;
use tickos_api::{
    Fd, FileSystem, KernelError, KernelResult, Pid, Priority, ProcessInfo, ProcessStatus, Signal, Tick,
};

use crate::config::KernelConfig;
use crate::context::{ExecutionContext, Task};
use crate::event_log::{EventLog, EventSink, NullEventLog};
use crate::interrupt::HostInterrupts;
use crate::io::NullFileSystem;
use crate::process::{PcbRegistry, ProcessQueues, QueueId};
use crate::sched::{MlfqScheduler, SchedulerError, SchedulerStats, StatsSnapshot};
use crate::sync::{ProtectionState, Protected};
use crate::syscalls::Sys;
use crate::time::Timer;

/// Everything guarded by the kernel lock
pub(crate) struct KernelState {
    pub(crate) registry: PcbRegistry,
    pub(crate) queues: ProcessQueues,
    pub(crate) scheduler: MlfqScheduler,
    pub(crate) current: Option<Pid>,
    pub(crate) foreground: Option<Pid>,
    pub(crate) events: EventLog,
    /// Contexts of ended processes, dropped once the lock is released
    pub(crate) retired: Vec<Task>,
    pub(crate) now: Tick,
    pub(crate) log_schedule: bool,
}

/// What a timer interrupt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sleepers were swept and a reschedule was requested
    Delivered,
    /// Protected mode was active; the work waits for the guard to drop
    Deferred,
}

pub struct Kernel {
    state: Mutex<KernelState>,
    protection: ProtectionState,
    timer: Timer,
    io: Mutex<Box<dyn FileSystem>>,
    stats: SchedulerStats,
    context: Mutex<ExecutionContext>,
    interrupts: HostInterrupts,
    need_resched: AtomicBool,
    shutdown: AtomicBool,
    config: KernelConfig,
}

assert_impl_all!(Kernel: Send, Sync);

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Protected mode and timer
    // ------------------------------------------------------------------

    /// Enters protected mode until the returned guard is dropped
    pub fn protect(&self) -> Protected<'_> {
        Protected::new(self)
    }

    pub(crate) fn protection(&self) -> &ProtectionState {
        &self.protection
    }

    pub fn is_protected(&self) -> bool {
        self.protection.is_active()
    }

    fn state(&self) -> MutexGuard<'_, KernelState> {
        let mut state = self.state.lock();
        state.now = self.timer.now();
        state
    }

    /// Runs `f` on the locked state inside protected mode. Contexts retired
    /// by `f` are dropped after the lock is released.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut KernelState) -> R) -> R {
        let _guard = self.protect();
        let (result, retired) = {
            let mut state = self.state();
            let result = f(&mut state);
            (result, core::mem::take(&mut state.retired))
        };
        drop(retired);
        result
    }

    pub(crate) fn timer(&self) -> &Timer {
        &self.timer
    }

    pub(crate) fn scheduler_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Delivers one timer tick. The clock always advances; the sleep sweep
    /// and the reschedule request wait while protected mode is active.
    pub fn timer_interrupt(&self) -> TickOutcome {
        self.timer.advance();
        self.stats.record_tick();
        if self.protection.is_active() {
            self.protection.defer_tick();
            return TickOutcome::Deferred;
        }
        self.run_tick();
        TickOutcome::Delivered
    }

    pub(crate) fn replay_deferred_tick(&self) {
        log::trace!("replaying deferred tick");
        self.run_tick();
    }

    fn run_tick(&self) {
        self.with_state(|state| {
            state.sweep_sleepers();
            state.events.flush();
        });
        for signal in self.interrupts.take() {
            match self.interrupt_foreground(signal) {
                Some(pid) => log::debug!("host {signal:?} delivered to pid {pid}"),
                None => log::debug!("host {signal:?} ignored: no foreground process"),
            }
        }
        self.need_resched.store(true, Ordering::Release);
    }

    /// Consumes a pending reschedule request
    pub(crate) fn take_resched(&self) -> bool {
        self.need_resched.swap(false, Ordering::AcqRel)
    }

    pub fn ticks(&self) -> Tick {
        self.timer.now()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ------------------------------------------------------------------
    // Execution contexts
    // ------------------------------------------------------------------

    pub fn active_context(&self) -> ExecutionContext {
        *self.context.lock()
    }

    pub(crate) fn enter_context(&self, context: ExecutionContext) {
        log::trace!("context -> {context:?}");
        *self.context.lock() = context;
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.with_state(|state| state.current)
    }

    // ------------------------------------------------------------------
    // Process creation
    // ------------------------------------------------------------------

    /// Spawns a parentless process at medium priority on the terminal
    pub fn spawn<F, Fut>(self: &Arc<Self>, entry: F, args: Vec<String>) -> KernelResult<Pid>
    where
        F: FnOnce(Sys, Vec<String>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_process(None, Priority::Medium, entry, args, None)
    }

    /// Spawns the shell: parentless, on the terminal, at high priority
    pub fn spawn_shell<F, Fut>(self: &Arc<Self>, entry: F, args: Vec<String>) -> KernelResult<Pid>
    where
        F: FnOnce(Sys, Vec<String>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_process(None, Priority::High, entry, args, None)
    }

    pub(crate) fn spawn_process<F, Fut>(
        self: &Arc<Self>,
        parent: Option<Pid>,
        priority: Priority,
        entry: F,
        args: Vec<String>,
        handles: Option<(Fd, Fd)>,
    ) -> KernelResult<Pid>
    where
        F: FnOnce(Sys, Vec<String>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let _guard = self.protect();
        let (pid, incarnation) = self.with_state(|state| {
            let pid = state.registry.create(parent)?;
            let pcb = state.registry.get_mut(pid).ok_or(KernelError::InvalidPid)?;
            pcb.name = args.first().cloned().unwrap_or_default();
            pcb.args = args.clone();
            pcb.priority = priority;
            if let Some((stdin, stdout)) = handles {
                pcb.stdin = stdin;
                pcb.stdout = stdout;
            }
            Ok::<_, KernelError>((pid, pcb.incarnation))
        })?;

        let sys = Sys::new(Arc::clone(self), pid, incarnation);
        let task = Task::new(Box::pin(entry(sys, args)));

        self.with_state(|state| {
            let pcb = state.registry.get_mut(pid).ok_or(KernelError::InvalidPid)?;
            pcb.context = Some(task);
            state.admit(pid);
            Ok(pid)
        })
    }

    // ------------------------------------------------------------------
    // Host-side control
    // ------------------------------------------------------------------

    /// Sends `signal` from outside any process
    pub fn kill(&self, pid: Pid, signal: Signal) -> KernelResult<()> {
        self.with_state(|state| state.kill(pid, signal))
    }

    pub fn nice(&self, pid: Pid, priority: Priority) -> KernelResult<()> {
        self.with_state(|state| state.renice(pid, priority))
    }

    /// Routes an interactive interrupt to the foreground process. Interrupt
    /// terminates it, Stop stops it; other signals are ignored.
    pub fn interrupt_foreground(&self, signal: Signal) -> Option<Pid> {
        self.with_state(|state| {
            let target = state.foreground?;
            let delivered = match signal {
                Signal::Interrupt | Signal::Terminate => state.kill(target, Signal::Terminate),
                Signal::Stop => state.kill(target, Signal::Stop),
                Signal::Continue => return None,
            };
            match delivered {
                Ok(()) => Some(target),
                Err(err) => {
                    log::warn!("interrupt for foreground pid {target} dropped: {err}");
                    None
                }
            }
        })
    }

    /// Pending host interrupts, routed to the foreground process on the
    /// next tick
    pub fn interrupts(&self) -> &HostInterrupts {
        &self.interrupts
    }

    pub(crate) fn set_foreground(&self, pid: Option<Pid>) {
        self.with_state(|state| state.foreground = pid);
    }

    pub fn foreground(&self) -> Option<Pid> {
        self.with_state(|state| state.foreground)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Releases every saved execution context, flushes the event log and
    /// syncs the file system.
    /// PCBs stay in place so the final process table can be inspected.
    pub fn shutdown(&self) {
        self.request_shutdown();
        let tasks: Vec<Task> = self.with_state(|state| {
            state.events.flush();
            state
                .registry
                .iter_mut()
                .filter_map(|pcb| pcb.context.take())
                .collect()
        });
        if let Err(err) = self.io().sync() {
            log::error!("file system sync at shutdown failed: {err}");
        }
        log::info!(
            "kernel shut down after {} ticks, released {} contexts",
            self.ticks(),
            tasks.len()
        );
        drop(tasks);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Every PCB on a primary queue, ascending by pid
    pub fn process_table(&self) -> Vec<ProcessInfo> {
        self.with_state(|state| state.process_table())
    }

    pub fn status_of(&self, pid: Pid) -> Option<ProcessStatus> {
        self.with_state(|state| state.live_status(pid))
    }

    /// Primary queue holding `pid`
    pub fn queue_of(&self, pid: Pid) -> Option<QueueId> {
        self.with_state(|state| state.queues.locate(pid))
    }

    /// Contents of one list, head first
    pub fn queue_snapshot(&self, queue: QueueId) -> Vec<Pid> {
        self.with_state(|state| state.queues.get(queue).iter().collect())
    }

    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.with_state(|state| state.registry.children_of(pid))
    }

    /// Number of allocated PCBs, reachable or not
    pub fn pcb_count(&self) -> usize {
        self.with_state(|state| state.registry.len())
    }

    /// Checks the queue invariants: every PCB sits on exactly one primary
    /// queue, queued pids have PCBs, and the auxiliary lists only hold
    /// blocked (or stopped sleeping) processes.
    pub fn verify_queues(&self) -> Result<(), String> {
        self.with_state(|state| Self::check_queues(state))
    }

    fn check_queues(state: &KernelState) -> Result<(), String> {
        for pid in state.registry.pids() {
            let memberships = QueueId::PRIMARY
                .iter()
                .filter(|&&queue| state.queues.find_by_pid(queue, pid))
                .count();
            if memberships != 1 {
                return Err(alloc::format!("pid {pid} is on {memberships} primary queues"));
            }
        }
        for queue in QueueId::PRIMARY {
            for pid in state.queues.get(queue).iter() {
                if !state.registry.contains(pid) {
                    return Err(alloc::format!("{queue:?} holds unknown pid {pid}"));
                }
            }
        }
        for pid in state.queues.get(QueueId::WaitBlocked).iter() {
            if state.queues.locate(pid) != Some(QueueId::Blocked) {
                return Err(alloc::format!("waiter {pid} is not blocked"));
            }
        }
        for pid in state.queues.get(QueueId::Sleeping).iter() {
            match state.queues.locate(pid) {
                Some(QueueId::Blocked) | Some(QueueId::Stopped) => {}
                other => return Err(alloc::format!("sleeper {pid} is on {other:?}")),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // File-system collaborator
    // ------------------------------------------------------------------

    pub(crate) fn io(&self) -> MutexGuard<'_, Box<dyn FileSystem>> {
        self.io.lock()
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("ticks", &self.ticks())
            .field("context", &self.active_context())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Kernel`] from its configuration and collaborators
pub struct KernelBuilder {
    config: KernelConfig,
    file_system: Option<Box<dyn FileSystem>>,
    events: Option<Box<dyn EventSink>>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            config: KernelConfig::default(),
            file_system: None,
            events: None,
        }
    }

    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn file_system<F: FileSystem + 'static>(mut self, file_system: F) -> Self {
        self.file_system = Some(Box::new(file_system));
        self
    }

    pub fn event_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.events = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> Result<Arc<Kernel>, SchedulerError> {
        let scheduler = MlfqScheduler::new(self.config.weights)?;
        let state = KernelState {
            registry: PcbRegistry::new(self.config.max_processes),
            queues: ProcessQueues::new(),
            scheduler,
            current: None,
            foreground: None,
            events: EventLog::new(self.events.unwrap_or_else(|| Box::new(NullEventLog))),
            retired: Vec::new(),
            now: 0,
            log_schedule: self.config.log_schedule_events,
        };
        log::info!(
            "kernel booted: weights {:?}, timer {:?}, max {} processes",
            self.config.weights.as_array(),
            self.config.timer,
            self.config.max_processes
        );
        Ok(Arc::new(Kernel {
            state: Mutex::new(state),
            protection: ProtectionState::new(),
            timer: Timer::new(self.config.timer),
            io: Mutex::new(self.file_system.unwrap_or_else(|| Box::new(NullFileSystem))),
            stats: SchedulerStats::new(),
            context: Mutex::new(ExecutionContext::Main),
            interrupts: HostInterrupts::new(),
            need_resched: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            config: self.config,
        }))
    }
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
