//! Tick sources
//!
//! The kernel clock advances in ticks. A tick is due either every wall
//! clock period (`TimerMode::Interval`) or every `quantum` preemption
//! points (`TimerMode::Virtual`). Nothing here fires asynchronously; the
//! engine asks whether a tick is due at each preemption point and waits
//! for one when idle.

use core::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use spin::Mutex;
use tickos_api::Tick;

use crate::config::TimerMode;

pub struct Timer {
    mode: TimerMode,
    ticks: AtomicU64,
    checks: AtomicU64,
    deadline: Mutex<Instant>,
}

impl Timer {
    pub fn new(mode: TimerMode) -> Self {
        let start = Instant::now();
        let deadline = match mode {
            TimerMode::Interval(period) => start + period,
            TimerMode::Virtual { .. } => start,
        };
        Self {
            mode,
            ticks: AtomicU64::new(0),
            checks: AtomicU64::new(0),
            deadline: Mutex::new(deadline),
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.mode, TimerMode::Virtual { .. })
    }

    /// Ticks elapsed since boot
    pub fn now(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reports whether a tick has come due at this preemption point
    pub fn poll(&self) -> bool {
        match self.mode {
            TimerMode::Virtual { quantum } => {
                let checks = self.checks.fetch_add(1, Ordering::AcqRel) + 1;
                checks % u64::from(quantum.max(1)) == 0
            }
            TimerMode::Interval(period) => {
                let now = Instant::now();
                let mut deadline = self.deadline.lock();
                if now < *deadline {
                    return false;
                }
                *deadline += period;
                if *deadline <= now {
                    *deadline = now + period;
                }
                true
            }
        }
    }

    /// Blocks the host thread until the next tick is due. Virtual time
    /// fast-forwards instead.
    pub fn wait_for_tick(&self) {
        let TimerMode::Interval(period) = self.mode else {
            self.checks.store(0, Ordering::Release);
            return;
        };
        let due = *self.deadline.lock();
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        let mut deadline = self.deadline.lock();
        *deadline = due + period;
        let now = Instant::now();
        if *deadline <= now {
            *deadline = now + period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn virtual_timer_fires_every_quantum() {
        let timer = Timer::new(TimerMode::Virtual { quantum: 3 });
        let fired: Vec<bool> = (0..6).map(|_| timer.poll()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn advance_moves_the_clock() {
        let timer = Timer::new(TimerMode::Virtual { quantum: 1 });
        assert_eq!(timer.now(), 0);
        assert_eq!(timer.advance(), 1);
        assert_eq!(timer.now(), 1);
    }

    #[test]
    fn interval_timer_waits_for_deadline() {
        let start = Instant::now();
        let timer = Timer::new(TimerMode::Interval(Duration::from_millis(5)));
        timer.wait_for_tick();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
