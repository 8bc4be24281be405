//! PCB registry
//!
//! Arena of PCBs keyed by pid. Allocation hands out the lowest free pid,
//! so a pid is only recycled once its previous holder has been cleaned up.

extern crate alloc;

use alloc::vec::Vec;
use hashbrown::HashMap;

use tickos_api::{KernelError, KernelResult, NO_PARENT, Pid};

use super::pcb::Pcb;

pub struct PcbRegistry {
    pcbs: HashMap<Pid, Pcb>,
    capacity: usize,
    next_incarnation: u64,
}

impl PcbRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            pcbs: HashMap::new(),
            capacity,
            next_incarnation: 1,
        }
    }

    /// Allocates an unqueued PCB under `parent`, inheriting its handles.
    pub fn create(&mut self, parent: Option<Pid>) -> KernelResult<Pid> {
        if self.pcbs.len() >= self.capacity {
            return Err(KernelError::AllocationFailure);
        }
        let pid = (1..=Pid::MAX)
            .find(|pid| !self.pcbs.contains_key(pid))
            .ok_or(KernelError::AllocationFailure)?;

        let incarnation = self.next_incarnation;
        self.next_incarnation += 1;

        let mut pcb = Pcb::new(pid, parent.unwrap_or(NO_PARENT), incarnation);
        if let Some(parent) = parent.and_then(|ppid| self.pcbs.get_mut(&ppid)) {
            pcb.stdin = parent.stdin;
            pcb.stdout = parent.stdout;
            parent.children.push(pid);
        }
        self.pcbs.insert(pid, pcb);
        Ok(pid)
    }

    /// Releases a PCB that is no longer on any queue. Cleaning up the same
    /// pid twice returns `None` the second time.
    pub fn cleanup(&mut self, pid: Pid) -> Option<Pcb> {
        let pcb = self.pcbs.remove(&pid)?;
        if let Some(parent) = self.pcbs.get_mut(&pcb.ppid) {
            parent.children.retain(|&child| child != pid);
        }
        Some(pcb)
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.pcbs.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.pcbs.get_mut(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pcbs.contains_key(&pid)
    }

    pub fn parent_of(&self, pid: Pid) -> Option<Pid> {
        self.pcbs.get(&pid).map(|pcb| pcb.ppid)
    }

    /// Children of `pid` that still point back at it
    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.pcbs
            .get(&pid)
            .map(|pcb| {
                pcb.children
                    .iter()
                    .copied()
                    .filter(|child| self.parent_of(*child) == Some(pid))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pids in ascending order
    pub fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.pcbs.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pcb> {
        self.pcbs.values_mut()
    }

    pub fn len(&self) -> usize {
        self.pcbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcbs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickos_api::STDOUT_FILENO;

    #[test]
    fn parentless_processes_get_terminal_handles() {
        let mut registry = PcbRegistry::new(4);
        let pid = registry.create(None).unwrap();
        let pcb = registry.get(pid).unwrap();
        assert_eq!(pcb.ppid, NO_PARENT);
        assert_eq!(pcb.stdout, STDOUT_FILENO);
    }

    #[test]
    fn lowest_free_pid_is_reused() {
        let mut registry = PcbRegistry::new(8);
        assert_eq!(registry.create(None), Ok(1));
        assert_eq!(registry.create(None), Ok(2));
        assert_eq!(registry.create(None), Ok(3));
        registry.cleanup(2);
        assert_eq!(registry.create(None), Ok(2));
        assert_eq!(registry.create(None), Ok(4));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut registry = PcbRegistry::new(2);
        registry.create(None).unwrap();
        registry.create(None).unwrap();
        assert_eq!(registry.create(None), Err(KernelError::AllocationFailure));
    }

    #[test]
    fn children_inherit_handles_and_register() {
        let mut registry = PcbRegistry::new(8);
        let parent = registry.create(None).unwrap();
        registry.get_mut(parent).unwrap().stdout = 5;
        let child = registry.create(Some(parent)).unwrap();

        let pcb = registry.get(child).unwrap();
        assert_eq!(pcb.ppid, parent);
        assert_eq!(pcb.stdout, 5);
        assert_eq!(registry.children_of(parent), vec![child]);

        registry.cleanup(child);
        assert!(registry.children_of(parent).is_empty());
    }

    #[test]
    fn double_cleanup_is_harmless() {
        let mut registry = PcbRegistry::new(4);
        let pid = registry.create(None).unwrap();
        assert!(registry.cleanup(pid).is_some());
        assert!(registry.cleanup(pid).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn incarnations_differ_across_reuse() {
        let mut registry = PcbRegistry::new(4);
        let pid = registry.create(None).unwrap();
        let first = registry.get(pid).unwrap().incarnation;
        registry.cleanup(pid);
        let again = registry.create(None).unwrap();
        assert_eq!(again, pid);
        assert_ne!(registry.get(again).unwrap().incarnation, first);
    }
}
