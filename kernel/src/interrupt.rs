//! Interactive interrupts from the host
//!
//! The host's interrupt and stop keystrokes arrive asynchronously, in a
//! signal handler or another thread. They only set a flag here; the
//! kernel drains the flags on its next tick and routes them to the
//! foreground process with [`Kernel::interrupt_foreground`].
//!
//! [`Kernel::interrupt_foreground`]: crate::Kernel::interrupt_foreground

extern crate alloc;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use tickos_api::Signal;

/// Pending interrupt and stop requests
#[derive(Debug, Clone, Default)]
pub struct HostInterrupts {
    interrupt: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl HostInterrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag set by the host's interrupt key; safe to set from a signal
    /// handler
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Flag set by the host's stop key
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Marks `signal` pending. Only Interrupt and Stop are routed.
    pub fn raise(&self, signal: Signal) {
        match signal {
            Signal::Interrupt => self.interrupt.store(true, Ordering::Release),
            Signal::Stop => self.stop.store(true, Ordering::Release),
            Signal::Terminate | Signal::Continue => {
                log::debug!("host interrupt {signal:?} is not routed")
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.interrupt.load(Ordering::Acquire) || self.stop.load(Ordering::Acquire)
    }

    /// Clears and returns the pending signals, interrupt first
    pub(crate) fn take(&self) -> impl Iterator<Item = Signal> {
        let interrupt = self.interrupt.swap(false, Ordering::AcqRel);
        let stop = self.stop.swap(false, Ordering::AcqRel);
        interrupt
            .then_some(Signal::Interrupt)
            .into_iter()
            .chain(stop.then_some(Signal::Stop))
    }
}
