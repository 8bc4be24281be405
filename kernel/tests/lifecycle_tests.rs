//! Process lifecycle tests
//! Spawn, wait, kill, sleep, nice and exit as seen from processes and from the host

mod common;

use common::*;
use kernel::{Action, KernelConfig, QueueId, RunOutcome, Sys};
use tickos_api::{
    KernelError, Pid, Priority, ProcessStatus, Signal, WaitOutcome, WaitTarget, STDIN_FILENO,
    STDOUT_FILENO,
};

fn spawn_child<F, Fut>(sys: &Sys, entry: F, name: &str) -> Pid
where
    F: FnOnce(Sys, Vec<String>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    sys.spawn(entry, args(name), STDIN_FILENO, STDOUT_FILENO)
        .expect("spawn child")
}

#[cfg(test)]
mod wait_tests {
    use super::*;

    /// wait(any) without children fails with NoChildren
    #[test]
    fn test_wait_without_children() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let outcome = sys.wait(WaitTarget::Any, false).await;
                    *out.lock() = Some(outcome);
                },
                args("lonely"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(*result.lock(), Some(Err(KernelError::NoChildren)));
    }

    /// Waiting on a pid that is not a child fails with InvalidPid
    #[test]
    fn test_wait_for_stranger() {
        let (kernel, _events) = deterministic_kernel();
        let stranger = kernel.spawn(busy, args("stranger")).unwrap();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let outcome = sys.wait(WaitTarget::Pid(stranger), false).await;
                    *out.lock() = Some(outcome);
                },
                args("waiter"),
            )
            .unwrap();

        kernel.run_for(4);
        assert_eq!(*result.lock(), Some(Err(KernelError::InvalidPid)));
    }

    /// A child that exits is reaped by the blocking wait and its pcb is gone
    #[test]
    fn test_spawn_exit_wait_reaps() {
        let (kernel, events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        let parent = kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let child = spawn_child(&sys, noop, "child");
                    let outcome = sys.wait(WaitTarget::Pid(child), false).await;
                    *out.lock() = Some((child, outcome));
                },
                args("parent"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        let (child, outcome) = result.lock().clone().expect("parent finished");
        assert_eq!(
            outcome,
            Ok(WaitOutcome::Changed { pid: child, status: ProcessStatus::Exited })
        );
        assert_eq!(kernel.status_of(child), None);
        assert_eq!(kernel.pcb_count(), 1);
        assert_eq!(events.count(Action::Waited, child), 1);
        assert_eq!(events.count(Action::Blocked, parent), 1);
        assert_eq!(events.count(Action::Unblocked, parent), 1);
        kernel.verify_queues().unwrap();
    }

    /// nohang on a running child reports no change and its status
    #[test]
    fn test_nohang_reports_live_status() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let child = spawn_child(&sys, busy, "busy");
                    let early = sys.wait(WaitTarget::Pid(child), true).await;
                    sys.kill(child, Signal::Terminate).await.unwrap();
                    let late = sys.wait(WaitTarget::Pid(child), true).await;
                    *out.lock() = Some((child, early, late));
                },
                args("parent"),
            )
            .unwrap();

        kernel.run();
        let (child, early, late) = result.lock().clone().expect("parent finished");
        assert_eq!(early, Ok(WaitOutcome::NoChange { status: Some(ProcessStatus::Ready) }));
        assert_eq!(
            late,
            Ok(WaitOutcome::Changed { pid: child, status: ProcessStatus::Signaled })
        );
    }

    /// wait(any) blocks until a sleeping child exits
    #[test]
    fn test_wait_any_blocks_until_child_exits() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let child = sys
                        .spawn(nap, vec!["nap".into(), "3".into()], STDIN_FILENO, STDOUT_FILENO)
                        .unwrap();
                    let outcome = sys.wait(WaitTarget::Any, false).await;
                    *out.lock() = Some((child, sys.now(), outcome));
                },
                args("parent"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        let (child, tick, outcome) = result.lock().clone().expect("parent finished");
        assert!(tick >= 3);
        assert_eq!(
            outcome,
            Ok(WaitOutcome::Changed { pid: child, status: ProcessStatus::Exited })
        );
    }

    /// A stopped child is reported once and left in place
    #[test]
    fn test_wait_reports_stopped_child() {
        let (kernel, events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        let parent = kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let child = spawn_child(&sys, busy, "busy");
                    let outcome = sys.wait(WaitTarget::Pid(child), false).await;
                    let after = sys.status(child);
                    *out.lock() = Some((child, outcome, after));
                },
                args("parent"),
            )
            .unwrap();

        kernel.run_for(1);
        assert_eq!(kernel.status_of(parent), Some(ProcessStatus::Blocked));
        let child = kernel.children_of(parent)[0];
        kernel.kill(child, Signal::Stop).unwrap();
        assert_eq!(kernel.status_of(parent), Some(ProcessStatus::Ready));

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        let (reported, outcome, after) = result.lock().clone().expect("parent finished");
        assert_eq!(reported, child);
        assert_eq!(
            outcome,
            Ok(WaitOutcome::Changed { pid: child, status: ProcessStatus::Stopped })
        );
        assert_eq!(after, Some(ProcessStatus::Stopped));
        assert_eq!(events.count(Action::WaitedStopped, child), 1);
        assert_eq!(events.count(Action::Waited, child), 0);
        // the parent's exit orphaned the stopped child
        assert_eq!(events.count(Action::Orphan, child), 1);
        assert_eq!(kernel.pcb_count(), 1);
    }
}

#[cfg(test)]
mod signal_tests {
    use super::*;

    /// Stop then continue puts a process back at the tail of its queue once
    #[test]
    fn test_stop_continue_requeues_at_tail() {
        let (kernel, events) = deterministic_kernel();
        let a = kernel.spawn(busy, args("a")).unwrap();
        let b = kernel.spawn(busy, args("b")).unwrap();
        kernel.run_for(3);

        kernel.kill(a, Signal::Stop).unwrap();
        kernel.kill(a, Signal::Stop).unwrap();
        assert_eq!(kernel.queue_of(a), Some(QueueId::Stopped));
        assert_eq!(kernel.queue_snapshot(QueueId::ReadyMedium), vec![b]);

        kernel.kill(a, Signal::Continue).unwrap();
        kernel.kill(a, Signal::Continue).unwrap();
        assert_eq!(kernel.queue_snapshot(QueueId::ReadyMedium), vec![b, a]);
        assert_eq!(events.count(Action::Stopped, a), 1);
        assert_eq!(events.count(Action::Continued, a), 1);
        kernel.verify_queues().unwrap();
    }

    /// Terminating twice has the effect of terminating once
    #[test]
    fn test_terminate_is_idempotent() {
        let (kernel, events) = deterministic_kernel();
        let pid = kernel.spawn(busy, args("victim")).unwrap();
        kernel.run_for(2);

        kernel.kill(pid, Signal::Terminate).unwrap();
        kernel.kill(pid, Signal::Terminate).unwrap();

        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Signaled));
        assert_eq!(kernel.queue_snapshot(QueueId::Zombie), vec![pid]);
        assert_eq!(events.count(Action::Signaled, pid), 1);
        assert_eq!(events.count(Action::Zombie, pid), 1);
        assert_eq!(kernel.run(), RunOutcome::AllExited);
    }

    /// Bad targets and signals are rejected
    #[test]
    fn test_kill_errors() {
        let (kernel, _events) = deterministic_kernel();
        let pid = kernel.spawn(busy, args("busy")).unwrap();

        assert_eq!(kernel.kill(99, Signal::Terminate), Err(KernelError::InvalidPid));
        assert_eq!(kernel.kill(pid, Signal::Interrupt), Err(KernelError::InvalidSignal));
        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Ready));
    }

    /// Interrupt routed to the foreground process terminates it
    #[test]
    fn test_interrupt_foreground() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let child = spawn_child(&sys, busy, "busy");
                    sys.set_foreground(Some(child));
                    let outcome = sys.wait(WaitTarget::Pid(child), false).await;
                    sys.set_foreground(None);
                    *out.lock() = Some(outcome);
                },
                args("shell"),
            )
            .unwrap();

        kernel.run_for(2);
        let child = kernel.foreground().expect("foreground child");
        assert_eq!(kernel.interrupt_foreground(Signal::Interrupt), Some(child));
        assert_eq!(kernel.status_of(child), Some(ProcessStatus::Signaled));
        assert_eq!(kernel.foreground(), None);
        assert_eq!(kernel.interrupt_foreground(Signal::Interrupt), None);

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(
            *result.lock(),
            Some(Ok(WaitOutcome::Changed { pid: child, status: ProcessStatus::Signaled }))
        );
    }

    /// A host stop key raised between ticks stops the foreground process
    /// on the next tick
    #[test]
    fn test_host_stop_key_reaches_foreground() {
        let (kernel, events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let child = spawn_child(&sys, busy, "busy");
                    sys.set_foreground(Some(child));
                    let outcome = sys.wait(WaitTarget::Pid(child), false).await;
                    sys.set_foreground(None);
                    *out.lock() = Some(outcome);
                },
                args("shell"),
            )
            .unwrap();

        kernel.run_for(2);
        let child = kernel.foreground().expect("foreground child");
        kernel.interrupts().raise(Signal::Stop);
        assert!(kernel.interrupts().is_pending());

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert!(!kernel.interrupts().is_pending());
        assert_eq!(
            *result.lock(),
            Some(Ok(WaitOutcome::Changed { pid: child, status: ProcessStatus::Stopped }))
        );
        assert_eq!(events.count(Action::Stopped, child), 1);
    }

    /// A host interrupt with nothing in the foreground is dropped
    #[test]
    fn test_host_interrupt_without_foreground() {
        let (kernel, _events) = deterministic_kernel();
        let pid = kernel.spawn(busy, args("busy")).unwrap();
        kernel.interrupts().raise(Signal::Interrupt);
        assert_eq!(kernel.run_for(3), RunOutcome::BudgetExhausted);
        assert!(!kernel.interrupts().is_pending());
        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Ready));
        kernel.shutdown();
    }

    /// A process that terminates itself never runs another line
    #[test]
    fn test_self_terminate_never_returns() {
        let (kernel, events) = deterministic_kernel();
        let reached = slot::<bool>();
        let flag = reached.clone();
        let pid = kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let me = sys.getpid();
                    let _ = sys.kill(me, Signal::Terminate).await;
                    *flag.lock() = Some(true);
                },
                args("self"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(*reached.lock(), None);
        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Signaled));
        assert_eq!(events.count(Action::Signaled, pid), 1);
    }
}

#[cfg(test)]
mod orphan_tests {
    use super::*;

    /// Killing a parent orphans and terminates every live child
    #[test]
    fn test_parent_termination_orphans_children() {
        let (kernel, events) = deterministic_kernel();
        let parent = kernel.spawn(fan_out, args("fan_out")).unwrap();
        kernel.run_for(4);
        let children = kernel.children_of(parent);
        assert_eq!(children.len(), 3);

        kernel.kill(parent, Signal::Terminate).unwrap();

        for &child in &children {
            assert_eq!(kernel.status_of(child), None);
            assert_eq!(events.count(Action::Orphan, child), 1);
            assert_eq!(events.count(Action::Signaled, child), 1);
        }
        assert!(kernel.children_of(parent).is_empty());
        assert_eq!(kernel.pcb_count(), 1);
        assert_eq!(kernel.status_of(parent), Some(ProcessStatus::Signaled));
        kernel.verify_queues().unwrap();
        assert_eq!(kernel.run(), RunOutcome::AllExited);
    }

    /// Orphaning cascades through grandchildren
    #[test]
    fn test_orphan_cascade_is_recursive() {
        let (kernel, events) = deterministic_kernel();
        let root = kernel.spawn(grandparent, args("grandparent")).unwrap();
        kernel.run_for(5);
        assert_eq!(kernel.pcb_count(), 5);

        kernel.kill(root, Signal::Terminate).unwrap();

        assert_eq!(kernel.pcb_count(), 1);
        assert_eq!(events.actions(Action::Orphan).len(), 4);
        kernel.verify_queues().unwrap();
    }

    /// Unreaped zombies of an exiting parent are cleaned up with it
    #[test]
    fn test_exiting_parent_releases_zombie_children() {
        let (kernel, events) = deterministic_kernel();
        let parent = kernel
            .spawn(
                |sys: Sys, _args: Vec<String>| async move {
                    let child = spawn_child(&sys, noop, "child");
                    while sys.status(child) != Some(ProcessStatus::Exited) {
                        sys.yield_now().await;
                    }
                },
                args("parent"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(kernel.pcb_count(), 1);
        assert_eq!(kernel.status_of(parent), Some(ProcessStatus::Exited));
        let orphans = events.actions(Action::Orphan);
        assert_eq!(orphans.len(), 1);
        assert_eq!(events.count(Action::Exited, orphans[0].pid), 1);
        assert_eq!(events.count(Action::Signaled, orphans[0].pid), 0);
    }
}

#[cfg(test)]
mod pid_tests {
    use super::*;

    /// Pids are reused only once the old pcb has been reaped
    #[test]
    fn test_pid_reuse_after_reap() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let first = spawn_child(&sys, noop, "first");
                    while sys.status(first) != Some(ProcessStatus::Exited) {
                        sys.yield_now().await;
                    }
                    let second = spawn_child(&sys, noop, "second");
                    sys.wait(WaitTarget::Pid(first), false).await.unwrap();
                    let third = spawn_child(&sys, noop, "third");
                    *out.lock() = Some((first, second, third));
                },
                args("parent"),
            )
            .unwrap();

        kernel.run();
        assert_eq!(*result.lock(), Some((2, 3, 2)));
    }

    /// Spawning past capacity fails with AllocationFailure
    #[test]
    fn test_allocation_failure_at_capacity() {
        let (kernel, _events) = kernel_with(KernelConfig::deterministic().with_max_processes(2));
        kernel.spawn(busy, args("one")).unwrap();
        kernel.spawn(busy, args("two")).unwrap();

        assert_eq!(
            kernel.spawn(busy, args("three")),
            Err(KernelError::AllocationFailure)
        );
        assert_eq!(kernel.pcb_count(), 2);
        kernel.verify_queues().unwrap();
    }

    /// Children inherit the handles they were spawned with
    #[test]
    fn test_child_handles_and_name() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let inner = out.clone();
                    sys.spawn(
                        move |child: Sys, args: Vec<String>| async move {
                            *inner.lock() = Some((child.stdin(), child.stdout(), args));
                        },
                        vec!["cat".into(), "notes".into()],
                        5,
                        6,
                    )
                    .unwrap();
                    sys.yield_now().await;
                },
                args("parent"),
            )
            .unwrap();

        kernel.run_for(1);
        let table = kernel.process_table();
        let child = table.iter().find(|info| info.name == "cat").expect("child listed");
        assert_eq!(child.ppid, 1);
        assert_eq!(child.priority, Priority::Medium);

        kernel.run();
        let (stdin, stdout, argv) = result.lock().clone().expect("child ran");
        assert_eq!((stdin, stdout), (5, 6));
        assert_eq!(argv, vec!["cat".to_string(), "notes".to_string()]);
    }
}

#[cfg(test)]
mod sleep_and_nice_tests {
    use super::*;

    /// sleep(n) blocks for exactly n ticks when nothing else runs
    #[test]
    fn test_sleep_duration() {
        let (kernel, _events) = deterministic_kernel();
        let result = slot();
        let out = result.clone();
        kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let before = sys.now();
                    sys.sleep(3).await;
                    *out.lock() = Some(sys.now() - before);
                },
                args("sleeper"),
            )
            .unwrap();

        kernel.run();
        assert_eq!(*result.lock(), Some(3));
    }

    /// sleep(0) returns without blocking
    #[test]
    fn test_zero_sleep_does_not_block() {
        let (kernel, events) = deterministic_kernel();
        let pid = kernel.spawn(nap, vec!["nap".into(), "0".into()]).unwrap();
        kernel.run();
        assert_eq!(events.count(Action::Blocked, pid), 0);
        assert_eq!(kernel.ticks(), 0);
    }

    /// A stopped sleeper goes back to sleeping when continued
    #[test]
    fn test_stopped_sleeper_resumes_sleep() {
        let (kernel, _events) = deterministic_kernel();
        let sleeper = kernel.spawn(nap, vec!["nap".into(), "10".into()]).unwrap();
        let spinner = kernel.spawn(busy, args("busy")).unwrap();
        kernel.run_for(2);
        assert_eq!(kernel.status_of(sleeper), Some(ProcessStatus::Blocked));

        kernel.kill(sleeper, Signal::Stop).unwrap();
        assert_eq!(kernel.queue_of(sleeper), Some(QueueId::Stopped));
        assert!(kernel.queue_snapshot(QueueId::Sleeping).contains(&sleeper));
        kernel.verify_queues().unwrap();

        kernel.kill(sleeper, Signal::Continue).unwrap();
        assert_eq!(kernel.queue_of(sleeper), Some(QueueId::Blocked));

        kernel.kill(spinner, Signal::Terminate).unwrap();
        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(kernel.status_of(sleeper), Some(ProcessStatus::Exited));
        assert!(kernel.ticks() >= 10);
    }

    /// nice moves a ready process to the tail of its new queue
    #[test]
    fn test_nice_moves_queue() {
        let (kernel, events) = deterministic_kernel();
        let a = kernel.spawn(busy, args("a")).unwrap();
        let b = kernel.spawn(busy, args("b")).unwrap();
        kernel.nice(b, Priority::High).unwrap();
        kernel.nice(a, Priority::High).unwrap();

        assert_eq!(kernel.queue_snapshot(QueueId::ReadyHigh), vec![b, a]);
        assert!(kernel.queue_snapshot(QueueId::ReadyMedium).is_empty());
        assert_eq!(events.count(Action::Nice, a), 1);
        assert_eq!(kernel.nice(42, Priority::Low), Err(KernelError::InvalidPid));
        assert_eq!(Priority::try_from(3), Err(KernelError::InvalidPriority));
    }

    /// A blocked process keeps its queue but takes the new priority on wake
    #[test]
    fn test_nice_on_sleeper_applies_on_wake() {
        let (kernel, _events) = deterministic_kernel();
        let pid = kernel.spawn(nap, vec!["nap".into(), "2".into()]).unwrap();
        kernel.run_for(1);
        kernel.nice(pid, Priority::Low).unwrap();
        assert_eq!(kernel.queue_of(pid), Some(QueueId::Blocked));

        // two ticks wake it into the low queue
        kernel.timer_interrupt();
        kernel.timer_interrupt();
        assert_eq!(kernel.queue_of(pid), Some(QueueId::ReadyLow));
    }

    /// exit() ends the caller on the spot
    #[test]
    fn test_exit_never_returns() {
        let (kernel, events) = deterministic_kernel();
        let reached = slot::<bool>();
        let flag = reached.clone();
        let pid = kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    sys.exit().await;
                    *flag.lock() = Some(true);
                },
                args("quitter"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(*reached.lock(), None);
        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Exited));
        assert_eq!(events.count(Action::Exited, pid), 1);
    }
}
