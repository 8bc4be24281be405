//! Terminal devices behind handles 0 and 1

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use spin::Mutex;
use tickos_api::{FsError, FsResult, Terminal};

/// Splits `n` bytes off the front of `pending`
fn take_pending(pending: &mut Vec<u8>, n: usize) -> Vec<u8> {
    let n = n.min(pending.len());
    pending.drain(..n).collect()
}

/// The host's stdin and stdout.
///
/// A reader thread feeds complete lines from stdin into a channel, so a
/// read never blocks the kernel thread.
pub struct HostTerminal {
    input: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: bool,
}

impl HostTerminal {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("tickos-stdin".into())
            .spawn(move || {
                let stdin = io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match stdin.lock().read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if tx.send(line.as_bytes().to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            log::warn!("stdin reader stopped: {err}");
                            break;
                        }
                    }
                }
                log::debug!("stdin closed");
            })?;
        Ok(Self {
            input: rx,
            pending: Vec::new(),
            closed: false,
        })
    }
}

impl Terminal for HostTerminal {
    fn read(&mut self, n: usize) -> FsResult<Vec<u8>> {
        if self.pending.is_empty() && !self.closed {
            match self.input.try_recv() {
                Ok(bytes) => self.pending = bytes,
                Err(TryRecvError::Empty) => return Err(FsError::WouldBlock),
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
        Ok(take_pending(&mut self.pending, n))
    }

    fn write(&mut self, bytes: &[u8]) -> FsResult<usize> {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(bytes)
            .and_then(|()| stdout.flush())
            .map_err(|_| FsError::BadHandle)?;
        Ok(bytes.len())
    }
}

#[derive(Debug)]
enum Step {
    Line(Vec<u8>),
    /// Reads that report no pending input
    Idle(u32),
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    pending: Vec<u8>,
    output: Vec<u8>,
}

/// Scripted input with captured output. Clones share one script, so a
/// test keeps a clone to read the output back.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTerminal {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one input line; the newline is added
    pub fn line(self, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.script.lock().steps.push_back(Step::Line(bytes));
        self
    }

    /// Queues `reads` reads that find no input pending
    pub fn idle(self, reads: u32) -> Self {
        self.script.lock().steps.push_back(Step::Idle(reads));
        self
    }

    /// Everything written so far
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.script.lock().output).into_owned()
    }
}

impl Terminal for ScriptedTerminal {
    fn read(&mut self, n: usize) -> FsResult<Vec<u8>> {
        let mut script = self.script.lock();
        if script.pending.is_empty() {
            match script.steps.pop_front() {
                Some(Step::Line(bytes)) => script.pending = bytes,
                Some(Step::Idle(reads)) => {
                    if reads > 1 {
                        script.steps.push_front(Step::Idle(reads - 1));
                    }
                    return Err(FsError::WouldBlock);
                }
                None => {}
            }
        }
        Ok(take_pending(&mut script.pending, n))
    }

    fn write(&mut self, bytes: &[u8]) -> FsResult<usize> {
        self.script.lock().output.extend_from_slice(bytes);
        Ok(bytes.len())
    }
}
