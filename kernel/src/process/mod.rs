//! Process model: PCBs, the registry that owns them, and the queues that
//! order them.

pub mod pcb;
pub mod queue;
pub mod registry;

pub use pcb::Pcb;
pub use queue::{ProcessQueue, ProcessQueues, QueueId};
pub use registry::PcbRegistry;
