//! Multilevel feedback queue scheduler
//!
//! Chooses which of the three ready queues runs next so that, over a
//! sliding window of recent dispatches, the queues share the CPU in the
//! configured ratio (9:6:4 by default).
//!
//! # Policy
//!
//! The scheduler keeps a ring of the levels it dispatched most recently,
//! one entry per slot of the window (`high + medium + low` slots). Each
//! decision looks at the entries that remain in the window once the new
//! one is appended:
//!
//! - one ready level: that level;
//! - two ready levels `a` before `b`: `b` when it has no runs yet, or when
//!   `runs[a] / runs[b]` exceeds `weight[a] / weight[b]`; otherwise `a`;
//! - three ready levels: the largest `weight - runs` gap, earliest level
//!   on ties.
//!
//! With an empty history the first ready level wins.

extern crate alloc;

use alloc::collections::VecDeque;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use static_assertions::const_assert_eq;

use crate::config::SchedulerWeights;

/// Number of ready levels
pub const LEVELS: usize = 3;

/// Window length of the default 9:6:4 weights
pub const DEFAULT_WINDOW: usize = 19;

const_assert_eq!(DEFAULT_WINDOW, 9 + 6 + 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Every weight must be positive
    InvalidWeights,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidWeights => write!(f, "scheduler weights must all be positive"),
        }
    }
}

impl std::error::Error for SchedulerError {}

#[derive(Debug, Clone)]
pub struct MlfqScheduler {
    weights: [usize; LEVELS],
    history: VecDeque<usize>,
    window: usize,
}

impl MlfqScheduler {
    pub fn new(weights: SchedulerWeights) -> Result<Self, SchedulerError> {
        let weights = weights.as_array();
        if weights.contains(&0) {
            return Err(SchedulerError::InvalidWeights);
        }
        let window = weights.iter().sum();
        Ok(Self {
            weights,
            history: VecDeque::with_capacity(window),
            window,
        })
    }

    /// Picks a level among the non-empty ones and records it. Returns
    /// `None`, without touching the history, when nothing is ready.
    pub fn pick(&mut self, ready: [bool; LEVELS]) -> Option<usize> {
        let mut candidates = (0..LEVELS).filter(|&level| ready[level]);
        let first = candidates.next()?;
        let second = candidates.next();
        let third = candidates.next();

        let level = if self.history.is_empty() {
            first
        } else {
            let runs = self.recent_runs();
            match (second, third) {
                (None, _) => first,
                (Some(b), None) => self.pick_between(first, b, &runs),
                (Some(_), Some(_)) => self.pick_largest_gap(&runs),
            }
        };
        self.record(level);
        Some(level)
    }

    fn pick_between(&self, a: usize, b: usize, runs: &[usize; LEVELS]) -> usize {
        if runs[b] == 0 {
            return b;
        }
        // runs[a] / runs[b] > weight[a] / weight[b], without division
        if runs[a] * self.weights[b] > self.weights[a] * runs[b] {
            b
        } else {
            a
        }
    }

    fn pick_largest_gap(&self, runs: &[usize; LEVELS]) -> usize {
        let gap = |level: usize| self.weights[level] as isize - runs[level] as isize;
        let mut best = 0;
        for level in 1..LEVELS {
            if gap(level) > gap(best) {
                best = level;
            }
        }
        best
    }

    /// Runs per level among the entries that survive the next append
    fn recent_runs(&self) -> [usize; LEVELS] {
        let skip = (self.history.len() + 1).saturating_sub(self.window);
        let mut runs = [0; LEVELS];
        for &level in self.history.iter().skip(skip) {
            runs[level] += 1;
        }
        runs
    }

    fn record(&mut self, level: usize) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(level);
    }

    /// Dispatched levels, oldest first
    pub fn history(&self) -> impl Iterator<Item = usize> + '_ {
        self.history.iter().copied()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn weights(&self) -> [usize; LEVELS] {
        self.weights
    }
}

/// Dispatch counters, readable without taking the kernel lock
#[derive(Debug)]
pub struct SchedulerStats {
    pub ticks: AtomicU64,
    pub preemptions: AtomicU64,
    pub voluntary_switches: AtomicU64,
    pub idle_entries: AtomicU64,
    pub dispatches: [AtomicU64; LEVELS],
}

impl SchedulerStats {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            voluntary_switches: AtomicU64::new(0),
            idle_entries: AtomicU64::new(0),
            dispatches: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts how a process gave up the CPU
    pub fn record_switch(&self, preempted: bool) {
        if preempted {
            self.preemptions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.voluntary_switches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dispatch(&self, level: usize) {
        self.dispatches[level].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle(&self) {
        self.idle_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            voluntary_switches: self.voluntary_switches.load(Ordering::Relaxed),
            idle_entries: self.idle_entries.load(Ordering::Relaxed),
            dispatches: [
                self.dispatches[0].load(Ordering::Relaxed),
                self.dispatches[1].load(Ordering::Relaxed),
                self.dispatches[2].load(Ordering::Relaxed),
            ],
        }
    }
}

impl Default for SchedulerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub preemptions: u64,
    pub voluntary_switches: u64,
    pub idle_entries: u64,
    pub dispatches: [u64; LEVELS],
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scheduler() -> MlfqScheduler {
        MlfqScheduler::new(SchedulerWeights::default()).unwrap()
    }

    fn counts(levels: &[usize]) -> [usize; LEVELS] {
        let mut counts = [0; LEVELS];
        for &level in levels {
            counts[level] += 1;
        }
        counts
    }

    #[test]
    fn nothing_ready_leaves_history_alone() {
        let mut sched = scheduler();
        assert_eq!(sched.pick([false; 3]), None);
        assert_eq!(sched.history().count(), 0);
    }

    #[test]
    fn first_pick_takes_first_ready_level() {
        let mut sched = scheduler();
        assert_eq!(sched.pick([false, true, true]), Some(1));
    }

    #[test]
    fn single_level_always_wins() {
        let mut sched = scheduler();
        for _ in 0..40 {
            assert_eq!(sched.pick([false, false, true]), Some(2));
        }
        assert_eq!(sched.history().count(), 19);
    }

    #[test]
    fn zero_run_level_is_favoured() {
        let mut sched = scheduler();
        sched.pick([true, false, false]);
        assert_eq!(sched.pick([true, false, true]), Some(2));
    }

    #[test]
    fn full_window_matches_weights() {
        let mut sched = scheduler();
        let picks: Vec<usize> = (0..19).filter_map(|_| sched.pick([true; 3])).collect();
        assert_eq!(counts(&picks), [9, 6, 4]);
    }

    #[test]
    fn two_levels_share_by_weight_ratio() {
        let mut sched = scheduler();
        let picks: Vec<usize> = (0..150).filter_map(|_| sched.pick([true, true, false])).collect();
        let [high, medium, low] = counts(&picks);
        assert_eq!(low, 0);
        // 9:6 within a few dispatches
        assert!((high as isize * 6 - medium as isize * 9).abs() <= 60);
    }

    #[test]
    fn zero_weight_is_rejected() {
        let weights = SchedulerWeights { high: 1, medium: 0, low: 1 };
        assert_eq!(MlfqScheduler::new(weights).unwrap_err(), SchedulerError::InvalidWeights);
    }

    #[test]
    fn stats_snapshot_counts() {
        let stats = SchedulerStats::new();
        stats.record_dispatch(1);
        stats.record_switch(true);
        stats.record_switch(false);
        let snap = stats.snapshot();
        assert_eq!(snap.dispatches, [0, 1, 0]);
        assert_eq!(snap.preemptions, 1);
        assert_eq!(snap.voluntary_switches, 1);
    }

    proptest! {
        #[test]
        fn every_window_is_nine_six_four(n in 19usize..600) {
            let mut sched = scheduler();
            let picks: Vec<usize> = (0..n).filter_map(|_| sched.pick([true; 3])).collect();
            for window in picks.windows(19) {
                prop_assert_eq!(counts(window), [9, 6, 4]);
            }
        }

        #[test]
        fn picks_only_ready_levels(ready in proptest::collection::vec(any::<[bool; 3]>(), 1..200)) {
            let mut sched = scheduler();
            for mask in ready {
                match sched.pick(mask) {
                    Some(level) => prop_assert!(mask[level]),
                    None => prop_assert_eq!(mask, [false; 3]),
                }
                prop_assert!(sched.history().count() <= sched.window());
            }
        }
    }
}
