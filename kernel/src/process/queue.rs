//! Process Queue Store
//!
//! Ordered lists of pids: six primary queues that every live PCB belongs
//! to exactly one of, plus two auxiliary lists (sleeping, wait-blocked)
//! that refine the blocked state. No policy lives here; callers hold the
//! critical-section guard and decide what moves where.

extern crate alloc;

use alloc::collections::VecDeque;
use core::array;

use tickos_api::{Pid, Priority};

// ============================================================================
// Queue identifiers
// ============================================================================

/// Identifies one of the eight lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueId {
    ReadyHigh,
    ReadyMedium,
    ReadyLow,
    Blocked,
    Stopped,
    Zombie,
    /// Blocked in `sleep`; also on `Blocked` (or `Stopped` if stopped mid-sleep)
    Sleeping,
    /// Blocked in `wait`; also on `Blocked`
    WaitBlocked,
}

impl QueueId {
    /// The six queues partitioning all live PCBs
    pub const PRIMARY: [QueueId; 6] = [
        QueueId::ReadyHigh,
        QueueId::ReadyMedium,
        QueueId::ReadyLow,
        QueueId::Blocked,
        QueueId::Stopped,
        QueueId::Zombie,
    ];

    const COUNT: usize = 8;

    pub const fn ready(priority: Priority) -> QueueId {
        match priority {
            Priority::High => QueueId::ReadyHigh,
            Priority::Medium => QueueId::ReadyMedium,
            Priority::Low => QueueId::ReadyLow,
        }
    }

    pub const fn is_ready(self) -> bool {
        matches!(self, QueueId::ReadyHigh | QueueId::ReadyMedium | QueueId::ReadyLow)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

// ============================================================================
// ProcessQueue
// ============================================================================

/// Ordered sequence of pids with O(n) lookup
#[derive(Debug, Default, Clone)]
pub struct ProcessQueue {
    pids: VecDeque<Pid>,
}

impl ProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_head(&mut self, pid: Pid) {
        debug_assert!(!self.contains(pid), "pid {pid} queued twice");
        self.pids.push_front(pid);
    }

    pub fn add_tail(&mut self, pid: Pid) {
        debug_assert!(!self.contains(pid), "pid {pid} queued twice");
        self.pids.push_back(pid);
    }

    /// Unlinks `pid`; returns whether it was present
    pub fn delete(&mut self, pid: Pid) -> bool {
        match self.pids.iter().position(|&p| p == pid) {
            Some(index) => {
                self.pids.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    pub fn head(&self) -> Option<Pid> {
        self.pids.front().copied()
    }

    pub fn tail(&self) -> Option<Pid> {
        self.pids.back().copied()
    }

    /// Moves the head to the tail and returns it
    pub fn rotate(&mut self) -> Option<Pid> {
        let pid = self.pids.pop_front()?;
        self.pids.push_back(pid);
        Some(pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

// ============================================================================
// ProcessQueues
// ============================================================================

/// All kernel lists, indexed by `QueueId`
#[derive(Debug, Clone)]
pub struct ProcessQueues {
    lists: [ProcessQueue; QueueId::COUNT],
}

impl ProcessQueues {
    pub fn new() -> Self {
        Self { lists: array::from_fn(|_| ProcessQueue::new()) }
    }

    pub fn get(&self, id: QueueId) -> &ProcessQueue {
        &self.lists[id.index()]
    }

    pub fn get_mut(&mut self, id: QueueId) -> &mut ProcessQueue {
        &mut self.lists[id.index()]
    }

    pub fn add_head(&mut self, id: QueueId, pid: Pid) {
        self.get_mut(id).add_head(pid);
    }

    pub fn add_tail(&mut self, id: QueueId, pid: Pid) {
        self.get_mut(id).add_tail(pid);
    }

    pub fn delete(&mut self, id: QueueId, pid: Pid) -> bool {
        self.get_mut(id).delete(pid)
    }

    pub fn find_by_pid(&self, id: QueueId, pid: Pid) -> bool {
        self.get(id).contains(pid)
    }

    /// Primary queue holding `pid`, if any
    pub fn locate(&self, pid: Pid) -> Option<QueueId> {
        QueueId::PRIMARY
            .into_iter()
            .find(|&id| self.get(id).contains(pid))
    }

    /// Whether `pid` is reachable from any primary queue
    pub fn contains(&self, pid: Pid) -> bool {
        self.locate(pid).is_some()
    }

    /// First pid in `id` for which `parent_of` reports `ppid`
    pub fn find_by_parent<F>(&self, id: QueueId, ppid: Pid, parent_of: F) -> Option<Pid>
    where
        F: Fn(Pid) -> Option<Pid>,
    {
        self.get(id).iter().find(|&pid| parent_of(pid) == Some(ppid))
    }

    /// Unlinks `pid` from every primary queue
    pub fn remove_from_primary(&mut self, pid: Pid) {
        for id in QueueId::PRIMARY {
            self.get_mut(id).delete(pid);
        }
    }

    /// Unlinks `pid` from all eight lists
    pub fn remove_everywhere(&mut self, pid: Pid) {
        for list in self.lists.iter_mut() {
            list.delete(pid);
        }
    }

    /// Which ready queues are non-empty, high first
    pub fn ready_levels(&self) -> [bool; 3] {
        Priority::ALL.map(|priority| !self.get(QueueId::ready(priority)).is_empty())
    }

    /// Number of PCBs across the primary queues
    pub fn live_count(&self) -> usize {
        QueueId::PRIMARY.iter().map(|&id| self.get(id).len()).sum()
    }

    pub fn max_pid(&self) -> Option<Pid> {
        QueueId::PRIMARY
            .iter()
            .flat_map(|&id| self.get(id).iter())
            .max()
    }
}

impl Default for ProcessQueues {
    fn default() -> Self {
        Self::new()
    }
}
