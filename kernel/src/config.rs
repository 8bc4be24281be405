//! Kernel configuration

use core::time::Duration;

/// Default wall-clock tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default process-table capacity
pub const DEFAULT_MAX_PROCESSES: usize = 100;

/// Target dispatch shares of the high, medium and low ready queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerWeights {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SchedulerWeights {
    pub const fn as_array(&self) -> [usize; 3] {
        [self.high, self.medium, self.low]
    }

    /// Length of the dispatch history the scheduler balances over
    pub const fn window(&self) -> usize {
        self.high + self.medium + self.low
    }
}

impl Default for SchedulerWeights {
    fn default() -> Self {
        Self { high: 9, medium: 6, low: 4 }
    }
}

/// Where timer ticks come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// One tick per wall-clock period
    Interval(Duration),
    /// One tick every `quantum` preemption points; idle fast-forwards
    Virtual { quantum: u32 },
}

impl Default for TimerMode {
    fn default() -> Self {
        TimerMode::Interval(DEFAULT_TICK_INTERVAL)
    }
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub weights: SchedulerWeights,
    pub timer: TimerMode,
    pub max_processes: usize,
    /// Emit a SCHEDULE event for every dispatch
    pub log_schedule_events: bool,
}

impl KernelConfig {
    /// Deterministic configuration: virtual timer firing at every
    /// preemption point
    pub fn deterministic() -> Self {
        Self::default().with_timer(TimerMode::Virtual { quantum: 1 })
    }

    pub fn with_weights(mut self, weights: SchedulerWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_timer(mut self, timer: TimerMode) -> Self {
        self.timer = timer;
        self
    }

    pub fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.max_processes = max_processes;
        self
    }

    pub fn with_schedule_events(mut self, enabled: bool) -> Self {
        self.log_schedule_events = enabled;
        self
    }

    /// Timer ticks per wall-clock second; virtual timers count as the
    /// default interval
    pub fn ticks_per_second(&self) -> u64 {
        let interval = match self.timer {
            TimerMode::Interval(interval) => interval,
            TimerMode::Virtual { .. } => DEFAULT_TICK_INTERVAL,
        };
        let millis = interval.as_millis().max(1) as u64;
        (1000 / millis).max(1)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            weights: SchedulerWeights::default(),
            timer: TimerMode::default(),
            max_processes: DEFAULT_MAX_PROCESSES,
            log_schedule_events: true,
        }
    }
}
