//! Scheduler and dispatch tests
//! Ratio enforcement, round robin within a level, idling and run outcomes

mod common;

use common::*;
use kernel::{
    Action, ExecutionContext, KernelConfig, MemoryEventLog, QueueId, RunOutcome, Sys, TimerMode,
};
use tickos_api::{Pid, Priority, ProcessStatus, Signal};

fn dispatch_order(events: &MemoryEventLog) -> Vec<Pid> {
    events
        .actions(Action::Schedule)
        .into_iter()
        .map(|event| event.pid)
        .collect()
}

#[cfg(test)]
mod round_robin_tests {
    use super::*;

    /// Two medium processes alternate dispatch by dispatch
    #[test]
    fn test_same_level_processes_alternate() {
        let (kernel, events) = deterministic_kernel();
        let a = kernel.spawn(busy, args("a")).unwrap();
        let b = kernel.spawn(busy, args("b")).unwrap();

        assert_eq!(kernel.run_for(19), RunOutcome::BudgetExhausted);

        let order = dispatch_order(&events);
        assert_eq!(order.len(), 19);
        // the later spawn sits at the head of the queue
        assert_eq!(order[0], b);
        assert!(order.windows(2).all(|pair| pair[0] != pair[1]));
        assert_eq!(order.iter().filter(|&&pid| pid == a).count(), 9);
        assert_eq!(order.iter().filter(|&&pid| pid == b).count(), 10);
    }

    /// A dispatched process moves to the tail of its queue
    #[test]
    fn test_dispatch_rotates_queue() {
        let (kernel, _events) = deterministic_kernel();
        let a = kernel.spawn(busy, args("a")).unwrap();
        let b = kernel.spawn(busy, args("b")).unwrap();
        assert_eq!(kernel.queue_snapshot(QueueId::ReadyMedium), vec![b, a]);

        kernel.run_for(1);
        assert_eq!(kernel.queue_snapshot(QueueId::ReadyMedium), vec![a, b]);
        assert_eq!(kernel.status_of(b), Some(ProcessStatus::Ready));
    }
}

#[cfg(test)]
mod ratio_tests {
    use super::*;

    /// All three levels busy: dispatches split 9:6:4
    #[test]
    fn test_three_levels_share_nine_six_four() {
        let (kernel, events) = deterministic_kernel();
        let high = kernel.spawn(busy, args("high")).unwrap();
        let medium = kernel.spawn(busy, args("medium")).unwrap();
        let low = kernel.spawn(busy, args("low")).unwrap();
        kernel.nice(high, Priority::High).unwrap();
        kernel.nice(low, Priority::Low).unwrap();

        kernel.run_for(190);

        assert_eq!(events.count(Action::Schedule, high), 90);
        assert_eq!(events.count(Action::Schedule, medium), 60);
        assert_eq!(events.count(Action::Schedule, low), 40);
        assert_eq!(kernel.stats().dispatches, [90, 60, 40]);
    }

    /// Every 19 consecutive dispatches hold exactly 9, 6 and 4 per level
    #[test]
    fn test_every_window_is_balanced() {
        let (kernel, events) = deterministic_kernel();
        let high = kernel.spawn(busy, args("high")).unwrap();
        let medium = kernel.spawn(busy, args("medium")).unwrap();
        let low = kernel.spawn(busy, args("low")).unwrap();
        kernel.nice(high, Priority::High).unwrap();
        kernel.nice(low, Priority::Low).unwrap();

        kernel.run_for(100);

        let order = dispatch_order(&events);
        for window in order.windows(19) {
            let count = |pid| window.iter().filter(|&&p| p == pid).count();
            assert_eq!([count(high), count(medium), count(low)], [9, 6, 4]);
        }
    }

    /// An empty level never blocks the others
    #[test]
    fn test_empty_level_is_skipped() {
        let (kernel, _events) = deterministic_kernel();
        let high = kernel.spawn(busy, args("high")).unwrap();
        kernel.spawn(busy, args("medium")).unwrap();
        kernel.nice(high, Priority::High).unwrap();

        assert_eq!(kernel.run_for(150), RunOutcome::BudgetExhausted);
        let [h, m, l] = kernel.stats().dispatches;
        assert_eq!(h + m, 150);
        assert_eq!(l, 0);
        assert!(h > m);
    }

    /// Only one level populated: it gets every dispatch
    #[test]
    fn test_single_level_gets_everything() {
        let (kernel, _events) = deterministic_kernel();
        let low = kernel.spawn(busy, args("low")).unwrap();
        kernel.nice(low, Priority::Low).unwrap();

        kernel.run_for(25);
        assert_eq!(kernel.stats().dispatches, [0, 0, 25]);
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;

    /// A body that returns is exited by the returner and left as a zombie
    #[test]
    fn test_returning_body_exits() {
        let (kernel, events) = deterministic_kernel();
        let pid = kernel.spawn(noop, args("noop")).unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Exited));
        assert_eq!(kernel.queue_of(pid), Some(QueueId::Zombie));
        assert_eq!(events.count(Action::Exited, pid), 1);
        assert_eq!(events.count(Action::Zombie, pid), 1);
        assert_eq!(kernel.active_context(), ExecutionContext::Main);
        kernel.verify_queues().unwrap();
    }

    /// With only sleepers left the engine idles until they wake
    #[test]
    fn test_idle_until_sleeper_wakes() {
        let (kernel, events) = deterministic_kernel();
        let pid = kernel.spawn(nap, vec!["nap".into(), "5".into()]).unwrap();

        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert!(kernel.ticks() >= 5);
        assert!(kernel.stats().idle_entries >= 5);
        assert_eq!(events.count(Action::Blocked, pid), 1);
        assert_eq!(events.count(Action::Unblocked, pid), 1);
    }

    /// A stopped process with nothing else around stalls the engine, and
    /// the code after its self-stop waits for Continue
    #[test]
    fn test_lone_stopped_process_stalls() {
        let (kernel, _events) = deterministic_kernel();
        let resumed = slot::<u64>();
        let mark = resumed.clone();
        let pid = kernel
            .spawn(
                move |sys: Sys, _args: Vec<String>| async move {
                    let me = sys.getpid();
                    sys.kill(me, Signal::Stop).await.unwrap();
                    *mark.lock() = Some(sys.now());
                },
                args("stopper"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::Stalled);
        assert_eq!(kernel.queue_of(pid), Some(QueueId::Stopped));
        assert_eq!(*resumed.lock(), None);

        // a stalled engine stays stalled; nothing runs the stopped body
        assert_eq!(kernel.run(), RunOutcome::Stalled);
        assert_eq!(*resumed.lock(), None);

        kernel.kill(pid, Signal::Continue).unwrap();
        assert_eq!(*resumed.lock(), None);
        assert_eq!(kernel.run(), RunOutcome::AllExited);
        assert!(resumed.lock().is_some());
        assert_eq!(kernel.status_of(pid), Some(ProcessStatus::Exited));
    }

    /// A logout request hands control back to main
    #[test]
    fn test_logout_returns_to_main() {
        let (kernel, _events) = deterministic_kernel();
        kernel.spawn(busy, args("busy")).unwrap();
        kernel
            .spawn(
                |sys: Sys, _args: Vec<String>| async move { sys.logout().await },
                args("logout"),
            )
            .unwrap();

        assert_eq!(kernel.run(), RunOutcome::Logout);
        assert!(kernel.shutdown_requested());
        kernel.shutdown();
    }

    /// Preemption points yield only once a tick is delivered
    #[test]
    fn test_quantum_controls_preemption() {
        let config = KernelConfig::deterministic()
            .with_timer(TimerMode::Virtual { quantum: 4 });
        let (kernel, _events) = kernel_with(config);
        kernel.spawn(busy, args("a")).unwrap();
        kernel.spawn(busy, args("b")).unwrap();

        kernel.run_for(10);
        let stats = kernel.stats();
        assert_eq!(stats.ticks, 10);
        assert_eq!(stats.preemptions, 10);
    }

    /// Schedule events can be switched off
    #[test]
    fn test_schedule_events_optional() {
        let config = KernelConfig::deterministic().with_schedule_events(false);
        let (kernel, events) = kernel_with(config);
        kernel.spawn(noop, args("noop")).unwrap();
        kernel.run();
        assert!(events.actions(Action::Schedule).is_empty());
        assert_eq!(events.actions(Action::Exited).len(), 1);
    }
}
