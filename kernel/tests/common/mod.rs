//! Shared helpers for kernel integration tests

#![allow(dead_code)]

use std::sync::Arc;

use kernel::{Kernel, KernelConfig, MemoryEventLog, Sys};
use spin::Mutex;

/// A kernel on the deterministic virtual timer, recording events in memory
pub fn deterministic_kernel() -> (Arc<Kernel>, MemoryEventLog) {
    kernel_with(KernelConfig::deterministic())
}

pub fn kernel_with(config: KernelConfig) -> (Arc<Kernel>, MemoryEventLog) {
    let events = MemoryEventLog::new();
    let kernel = Kernel::builder()
        .config(config)
        .event_sink(events.clone())
        .build()
        .expect("default weights are valid");
    (kernel, events)
}

pub fn args(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

/// Value written by a process body, read back by the test
pub type Slot<T> = Arc<Mutex<Option<T>>>;

pub fn slot<T>() -> Slot<T> {
    Arc::new(Mutex::new(None))
}

/// Runs forever, hitting a preemption point every iteration
pub async fn busy(sys: Sys, _args: Vec<String>) {
    loop {
        sys.checkpoint().await;
    }
}

/// Returns at once
pub async fn noop(_sys: Sys, _args: Vec<String>) {}

/// Sleeps for the tick count given as its second argument
pub async fn nap(sys: Sys, args: Vec<String>) {
    let ticks = args.get(1).and_then(|arg| arg.parse().ok()).unwrap_or(1);
    sys.sleep(ticks).await;
}

/// Spawns three busy children, then spins
pub async fn fan_out(sys: Sys, _args: Vec<String>) {
    for _ in 0..3 {
        let stdin = sys.stdin();
        let stdout = sys.stdout();
        sys.spawn(busy, args("busy"), stdin, stdout).expect("spawn busy child");
    }
    busy(sys, Vec::new()).await;
}

/// Spawns one `fan_out` child, then spins
pub async fn grandparent(sys: Sys, _args: Vec<String>) {
    sys.spawn(fan_out, args("fan_out"), 0, 1).expect("spawn fan_out child");
    busy(sys, Vec::new()).await;
}
