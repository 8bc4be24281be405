//! tickos Kernel Library
//!
//! A user-space kernel that multiplexes cooperative processes onto one
//! host thread, with priority scheduling, timer preemption and a full
//! spawn/wait/kill/sleep/exit lifecycle.
//!
//! # Architecture
//!
//! - **Process Queue Store** (`process::queue`): six primary queues and two
//!   auxiliary blocking lists
//! - **PCB Registry** (`process::registry`): PCB arena and pid allocation
//! - **Critical-Section Guard** (`sync`): nestable protected mode
//! - **Scheduler** (`sched`): 9:6:4 multilevel feedback queue
//! - **Context-Switch Engine** (`context`, `time`): dispatch, returner,
//!   idle and timer ticks
//! - **System Calls** (`syscalls`): the [`Sys`] handle given to processes
//! - **Event Log** (`event_log`): one record per lifecycle transition
//! - **Host Interrupts** (`interrupt`): interrupt and stop keys routed to
//!   the foreground process
//!
//! # Usage
//!
//! ```no_run
//! use kernel::{Kernel, KernelConfig, Sys};
//!
//! async fn hello(sys: Sys, _args: Vec<String>) {
//!     let _ = sys.print("hello\n");
//! }
//!
//! let kernel = Kernel::builder().config(KernelConfig::deterministic()).build().unwrap();
//! kernel.spawn(hello, vec!["hello".into()]).unwrap();
//! kernel.run();
//! kernel.shutdown();
//! ```

pub mod config;
pub mod context;
pub mod event_log;
pub mod interrupt;
pub mod io;
pub mod kernel;
mod lifecycle;
pub mod logger;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscalls;
pub mod time;

pub use crate::config::{KernelConfig, SchedulerWeights, TimerMode};
pub use crate::context::{ExecutionContext, ProcessFuture, RunOutcome};
pub use crate::event_log::{Action, EventSink, FileEventLog, MemoryEventLog, NullEventLog, ProcessEvent};
pub use crate::interrupt::HostInterrupts;
pub use crate::kernel::{Kernel, KernelBuilder, TickOutcome};
pub use crate::process::QueueId;
pub use crate::syscalls::Sys;
