//! Critical-section guard ("protected mode")
//!
//! Kernel data is mutated only while a [`Protected`] guard is alive.
//! Guards nest; while any is alive a timer tick only advances the clock
//! and marks itself deferred. Dropping the outermost guard replays one
//! deferred tick: the sleep sweep runs and a reschedule is requested.
//!
//! Kernel code normally goes through `Kernel::with_state`, which holds a
//! guard around the state lock and releases the lock first.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::kernel::Kernel;

#[derive(Debug, Default)]
pub struct ProtectionState {
    depth: AtomicUsize,
    deferred: AtomicBool,
}

impl ProtectionState {
    pub const fn new() -> Self {
        Self {
            depth: AtomicUsize::new(0),
            deferred: AtomicBool::new(false),
        }
    }

    /// Enters one level; returns the new depth
    pub fn enter(&self) -> usize {
        self.depth.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Leaves one level. True when this closed the outermost level and a
    /// tick arrived meanwhile.
    pub fn leave(&self) -> bool {
        let previous = self.depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unbalanced protected-mode exit");
        previous == 1 && self.deferred.swap(false, Ordering::AcqRel)
    }

    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn defer_tick(&self) {
        self.deferred.store(true, Ordering::Release);
    }

    pub fn has_deferred_tick(&self) -> bool {
        self.deferred.load(Ordering::Acquire)
    }
}

/// Scoped protected-mode guard returned by [`Kernel::protect`]
#[must_use = "protected mode ends as soon as the guard is dropped"]
pub struct Protected<'k> {
    kernel: &'k Kernel,
}

impl<'k> Protected<'k> {
    pub(crate) fn new(kernel: &'k Kernel) -> Self {
        kernel.protection().enter();
        Self { kernel }
    }
}

impl Drop for Protected<'_> {
    fn drop(&mut self) {
        if self.kernel.protection().leave() {
            self.kernel.replay_deferred_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_levels_count() {
        let state = ProtectionState::new();
        assert_eq!(state.enter(), 1);
        assert_eq!(state.enter(), 2);
        assert!(!state.leave());
        assert!(state.is_active());
        assert!(!state.leave());
        assert!(!state.is_active());
    }

    #[test]
    fn deferred_tick_reported_once_at_outermost_exit() {
        let state = ProtectionState::new();
        state.enter();
        state.enter();
        state.defer_tick();
        assert!(!state.leave());
        assert!(state.has_deferred_tick());
        assert!(state.leave());
        assert!(!state.has_deferred_tick());
    }
}
