//! Process event log
//!
//! Every scheduling decision and lifecycle transition produces one
//! [`ProcessEvent`]. Events go to an [`EventSink`] (a log file in normal
//! runs, memory in tests) and are mirrored to the `log` facade at debug
//! level. A failing sink never stops the kernel.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use spin::Mutex;
use tickos_api::{Pid, Priority, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Schedule,
    Blocked,
    Unblocked,
    Stopped,
    Continued,
    Zombie,
    Orphan,
    Exited,
    Signaled,
    Waited,
    /// A stopped child was reported to its parent, not reaped
    WaitedStopped,
    Nice,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Schedule => "SCHEDULE",
            Action::Blocked => "BLOCKED",
            Action::Unblocked => "UNBLOCKED",
            Action::Stopped => "STOPPED",
            Action::Continued => "CONTINUED",
            Action::Zombie => "ZOMBIE",
            Action::Orphan => "ORPHAN",
            Action::Exited => "EXITED",
            Action::Signaled => "SIGNALED",
            Action::Waited => "WAITED",
            Action::WaitedStopped => "WAITEDSTP",
            Action::Nice => "NICE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    pub tick: Tick,
    pub action: Action,
    pub pid: Pid,
    pub priority: Priority,
    pub name: String,
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:<5}]\t{:<9}\t{:<3}\t{:<2}\t{}",
            self.tick,
            self.action,
            self.pid,
            self.priority.nice(),
            self.name
        )
    }
}

/// Destination for process events
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send {
    fn record(&mut self, event: &ProcessEvent) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Append-only text log, one line per event
pub struct FileEventLog {
    writer: BufWriter<File>,
}

impl FileEventLog {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# tickos process log")?;
        Ok(Self { writer })
    }
}

impl EventSink for FileEventLog {
    fn record(&mut self, event: &ProcessEvent) -> io::Result<()> {
        writeln!(self.writer, "{event}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// In-memory sink; clones share one buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLog {
    events: Arc<Mutex<Vec<ProcessEvent>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProcessEvent> {
        self.events.lock().clone()
    }

    /// Events with `action`, oldest first
    pub fn actions(&self, action: Action) -> Vec<ProcessEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.action == action)
            .cloned()
            .collect()
    }

    /// How many `action` events `pid` produced
    pub fn count(&self, action: Action, pid: Pid) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.action == action && event.pid == pid)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemoryEventLog {
    fn record(&mut self, event: &ProcessEvent) -> io::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventLog;

impl EventSink for NullEventLog {
    fn record(&mut self, _event: &ProcessEvent) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Kernel-side front of a sink
pub(crate) struct EventLog {
    sink: Box<dyn EventSink>,
    failed: bool,
}

impl EventLog {
    pub(crate) fn new(sink: Box<dyn EventSink>) -> Self {
        Self { sink, failed: false }
    }

    pub(crate) fn record(&mut self, event: ProcessEvent) {
        log::debug!("{event}");
        if let Err(err) = self.sink.record(&event) {
            self.report(err);
        }
    }

    pub(crate) fn flush(&mut self) {
        if let Err(err) = self.sink.flush() {
            self.report(err);
        }
    }

    fn report(&mut self, err: io::Error) {
        if !self.failed {
            log::warn!("process event log unavailable: {err}");
            self.failed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: Action) -> ProcessEvent {
        ProcessEvent {
            tick: 12,
            action,
            pid: 3,
            priority: Priority::Low,
            name: "busy".into(),
        }
    }

    #[test]
    fn line_format() {
        assert_eq!(event(Action::Create).to_string(), "[12   ]\tCREATE   \t3  \t1 \tbusy");
    }

    #[test]
    fn memory_log_counts_actions() {
        let log = MemoryEventLog::new();
        let mut sink = log.clone();
        sink.record(&event(Action::Blocked)).unwrap();
        sink.record(&event(Action::Unblocked)).unwrap();
        sink.record(&event(Action::Blocked)).unwrap();
        assert_eq!(log.count(Action::Blocked, 3), 2);
        assert_eq!(log.actions(Action::Unblocked).len(), 1);
    }

    #[test]
    fn failing_sink_does_not_propagate() {
        let mut sink = MockEventSink::new();
        sink.expect_record()
            .times(2)
            .returning(|_| Err(io::Error::other("disk full")));
        sink.expect_flush().times(1).returning(|| Ok(()));

        let mut log = EventLog::new(Box::new(sink));
        log.record(event(Action::Zombie));
        log.record(event(Action::Waited));
        log.flush();
        assert!(log.failed);
    }

    #[test]
    fn file_log_appends_lines() {
        let path = std::env::temp_dir().join(format!("tickos-events-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let mut sink = FileEventLog::create(&path).unwrap();
            sink.record(&event(Action::Exited)).unwrap();
            sink.flush().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(text.starts_with("# tickos process log\n"));
        assert!(text.contains("EXITED"));
    }
}
