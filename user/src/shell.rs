//! Interactive shell
//!
//! Reads one command line at a time from its input handle, runs inline
//! builtins itself and spawns everything else as a child. Foreground
//! children are waited on; `&` children become jobs. Input is polled:
//! while the terminal has nothing pending the shell sleeps a tick, so
//! background work keeps running.

use kernel::Sys;
use tickos_api::{
    Fd, FsError, KernelError, OpenMode, Pid, Priority, ProcessStatus, Signal, WaitOutcome, WaitTarget,
    STDIN_FILENO, STDOUT_FILENO,
};

use crate::builtins::{self, say};
use crate::jobs::{Job, JobEvent, JobStatus, JobTable};
use crate::parser::{self, ParsedCommand};

const PROMPT: &str = "$ ";

/// Read size for command input
const LINE_CHUNK: usize = 256;

const MANUAL: &[(&str, &str)] = &[
    ("cat [FILE...]", "print files, or copy input to output"),
    ("sleep SECONDS", "sleep for a number of seconds"),
    ("busy", "spin until killed"),
    ("echo [WORD...]", "print the words"),
    ("ls [FILE...]", "list files with permissions and sizes"),
    ("touch FILE...", "create empty files"),
    ("mv SOURCE DEST", "rename a file"),
    ("cp [-h] SOURCE [-h] DEST", "copy a file; -h marks a host path"),
    ("rm FILE...", "remove files"),
    ("chmod [+-][rwx] FILE...", "change permissions"),
    ("ps", "list processes"),
    ("kill [-term|-stop|-cont] PID...", "signal processes"),
    ("zombify", "leave a zombie child behind"),
    ("orphanify", "exit with a running child"),
    ("nice N COMMAND...", "run a command at priority N (-1, 0 or 1)"),
    ("nice_pid N PID", "change the priority of a process"),
    ("hang", "spawn ten nappers and reap them with blocking waits"),
    ("nohang", "spawn ten nappers and poll for them without blocking"),
    ("recur", "spawn a chain of 26 generations, each reaping the next"),
    ("man", "show this list"),
    ("jobs", "list background and stopped jobs"),
    ("bg [ID]", "continue a stopped job in the background"),
    ("fg [ID]", "bring a job to the foreground"),
    ("logout", "leave the shell and shut down"),
];

/// Whether the prompt loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Logout,
}

/// Shell process entry point
pub async fn shell(sys: Sys, _args: Vec<String>) {
    Shell::new(sys).run().await
}

pub struct Shell {
    sys: Sys,
    jobs: JobTable,
}

impl Shell {
    pub fn new(sys: Sys) -> Self {
        Self {
            sys,
            jobs: JobTable::new(),
        }
    }

    pub async fn run(mut self) {
        log::info!("shell running as pid {}", self.sys.getpid());
        loop {
            self.reap().await;
            say(&self.sys, PROMPT);
            let Some(line) = self.read_line().await else {
                say(&self.sys, "\n");
                break;
            };
            self.reap().await;
            let flow = match parser::parse(&line) {
                Ok(Some(command)) => self.execute(command).await,
                Ok(None) => Flow::Continue,
                Err(err) => {
                    say(&self.sys, &format!("syntax error: {err}\n"));
                    Flow::Continue
                }
            };
            if flow == Flow::Logout {
                break;
            }
        }
        self.sys.logout().await
    }

    /// Next input line; `None` at end of input
    async fn read_line(&self) -> Option<String> {
        let stdin = self.sys.stdin();
        let mut line = Vec::new();
        loop {
            match self.sys.read(stdin, LINE_CHUNK) {
                Ok(bytes) if bytes.is_empty() => {
                    return (!line.is_empty()).then(|| String::from_utf8_lossy(&line).into_owned());
                }
                Ok(bytes) => {
                    line.extend(bytes);
                    if line.ends_with(b"\n") {
                        return Some(String::from_utf8_lossy(&line).into_owned());
                    }
                }
                Err(FsError::WouldBlock) => self.sys.sleep(1).await,
                Err(err) => {
                    log::error!("shell input failed: {err}");
                    return None;
                }
            }
        }
    }

    async fn execute(&mut self, command: ParsedCommand) -> Flow {
        let name = command.name().to_string();
        match name.as_str() {
            "logout" | "exit" => return Flow::Logout,
            "man" => self.manual(),
            "jobs" => self.list_jobs(),
            "bg" => self.background(&command.argv).await,
            "fg" => self.foreground(&command.argv).await,
            "nice" => self.nice(command).await,
            "nice_pid" => self.nice_pid(&command.argv),
            "hang" => builtins::spawn_nappers(&self.sys, false).await,
            "nohang" => builtins::spawn_nappers(&self.sys, true).await,
            "recur" => builtins::recur(&self.sys).await,
            _ => self.launch(command, None).await,
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------
    // Child processes
    // ------------------------------------------------------------------

    async fn launch(&mut self, command: ParsedCommand, priority: Option<Priority>) {
        let Some(program) = builtins::lookup(command.name()) else {
            say(&self.sys, &format!("{}: command not found\n", command.name()));
            return;
        };
        let (stdin, stdout) = match self.open_redirections(&command) {
            Ok(handles) => handles,
            Err((path, err)) => {
                say(&self.sys, &format!("{path}: {err}\n"));
                return;
            }
        };
        let pid = match self.sys.spawn(program, command.argv.clone(), stdin, stdout) {
            Ok(pid) => pid,
            Err(err) => {
                say(&self.sys, &format!("{}: {err}\n", command.name()));
                self.close_handles(&[stdin, stdout]);
                return;
            }
        };
        if let Some(priority) = priority {
            if let Err(err) = self.sys.nice(pid, priority) {
                say(&self.sys, &format!("nice: {err}\n"));
            }
        }

        let text = command.to_string();
        if command.background {
            let id = self.jobs.add(pid, text, JobStatus::Running, (stdin, stdout));
            say(&self.sys, &format!("[{id}] {pid}\n"));
        } else {
            self.wait_foreground(pid, text, (stdin, stdout)).await;
        }
    }

    fn open_redirections(&self, command: &ParsedCommand) -> Result<(Fd, Fd), (String, FsError)> {
        let stdin = match &command.stdin_file {
            Some(path) => self
                .sys
                .open(path, OpenMode::Read)
                .map_err(|err| (path.clone(), err))?,
            None => STDIN_FILENO,
        };
        let stdout = match &command.stdout_file {
            Some(path) => {
                let mode = if command.append { OpenMode::Append } else { OpenMode::Write };
                match self.sys.open(path, mode) {
                    Ok(fd) => fd,
                    Err(err) => {
                        self.close_handles(&[stdin]);
                        return Err((path.clone(), err));
                    }
                }
            }
            None => STDOUT_FILENO,
        };
        Ok((stdin, stdout))
    }

    fn close_handles(&self, handles: &[Fd]) {
        for &fd in handles {
            if fd == STDIN_FILENO || fd == STDOUT_FILENO {
                continue;
            }
            if let Err(err) = self.sys.close(fd) {
                log::warn!("shell: closing handle {fd} failed: {err}");
            }
        }
    }

    /// Waits for `pid` to end or stop. A stopped child becomes a job.
    async fn wait_foreground(&mut self, pid: Pid, text: String, handles: (Fd, Fd)) {
        self.sys.set_foreground(Some(pid));
        let outcome = self.sys.wait(WaitTarget::Pid(pid), false).await;
        self.sys.set_foreground(None);
        match outcome {
            Ok(WaitOutcome::Changed {
                status: ProcessStatus::Stopped,
                ..
            }) => {
                say(&self.sys, &format!("Stopped: {text}\n"));
                self.jobs.add(pid, text, JobStatus::Stopped, handles);
            }
            Ok(WaitOutcome::Changed {
                status: ProcessStatus::Signaled,
                ..
            }) => {
                say(&self.sys, "\n");
                self.close_handles(&[handles.0, handles.1]);
            }
            Ok(_) => self.close_handles(&[handles.0, handles.1]),
            Err(err) => {
                log::error!("shell: waiting for pid {pid} failed: {err}");
                self.close_handles(&[handles.0, handles.1]);
            }
        }
    }

    /// Reaps finished jobs and notices stops and continues made from
    /// outside the shell
    async fn reap(&mut self) {
        let watched: Vec<(Pid, JobStatus)> = self.jobs.iter().map(|job| (job.pid, job.status)).collect();
        for (pid, known) in watched {
            let status = match self.sys.status(pid) {
                Some(status) if status.is_terminated() => status,
                Some(ProcessStatus::Stopped) if known == JobStatus::Running => ProcessStatus::Stopped,
                Some(status) => {
                    self.record(pid, status);
                    continue;
                }
                None => {
                    log::warn!("shell: job pid {pid} vanished");
                    self.record(pid, ProcessStatus::Signaled);
                    continue;
                }
            };
            match self.sys.wait(WaitTarget::Pid(pid), true).await {
                Ok(WaitOutcome::Changed { pid, status }) => self.record(pid, status),
                Ok(WaitOutcome::NoChange { .. }) => {}
                Err(err) => log::error!("shell: reaping pid {pid} ({status:?}) failed: {err}"),
            }
        }
    }

    fn record(&mut self, pid: Pid, status: ProcessStatus) {
        let (label, job) = match self.jobs.update(pid, status) {
            Some(JobEvent::Finished(job)) => {
                self.close_handles(&job.owned_handles());
                ("Finished", job)
            }
            Some(JobEvent::Stopped(job)) => ("Stopped", job),
            Some(JobEvent::Continued(job)) => ("Running", job),
            None => return,
        };
        say(&self.sys, &format!("{label}: {}\n", job.command));
    }

    // ------------------------------------------------------------------
    // Inline builtins
    // ------------------------------------------------------------------

    fn manual(&self) {
        let text: String = MANUAL
            .iter()
            .map(|(usage, summary)| format!("{usage:<34}{summary}\n"))
            .collect();
        say(&self.sys, &text);
    }

    fn list_jobs(&self) {
        let text: String = self.jobs.iter().map(|job| format!("{job}\n")).collect();
        say(&self.sys, &text);
    }

    /// Job named by the optional id in `argv[1]`, or the newest job
    fn select_job(&self, argv: &[String]) -> Option<Job> {
        let name = argv.first().map_or("", String::as_str);
        let id = match argv.get(1) {
            Some(arg) => match arg.trim_start_matches('%').parse::<usize>() {
                Ok(id) => Some(id),
                Err(_) => {
                    say(&self.sys, &format!("{name}: {arg}: no such job\n"));
                    return None;
                }
            },
            None => None,
        };
        let job = self.jobs.select(id).cloned();
        if job.is_none() {
            say(&self.sys, &format!("{name}: no such job\n"));
        }
        job
    }

    async fn background(&mut self, argv: &[String]) {
        let Some(job) = self.select_job(argv) else {
            return;
        };
        if job.status == JobStatus::Running {
            say(&self.sys, &format!("bg: job {} is already running\n", job.id));
            return;
        }
        if let Err(err) = self.sys.kill(job.pid, Signal::Continue).await {
            say(&self.sys, &format!("bg: {err}\n"));
            return;
        }
        self.jobs.set_status(job.id, JobStatus::Running);
        say(&self.sys, &format!("Running: {}\n", job.command));
    }

    async fn foreground(&mut self, argv: &[String]) {
        let Some(job) = self.select_job(argv) else {
            return;
        };
        if job.status == JobStatus::Stopped {
            if let Err(err) = self.sys.kill(job.pid, Signal::Continue).await {
                say(&self.sys, &format!("fg: {err}\n"));
                return;
            }
        }
        self.jobs.remove(job.id);
        say(&self.sys, &format!("{}\n", job.command));
        self.wait_foreground(job.pid, job.command, (job.stdin, job.stdout)).await;
    }

    fn parse_priority(&self, arg: Option<&String>) -> Option<Priority> {
        let priority = arg
            .and_then(|arg| arg.parse::<i32>().ok())
            .ok_or(KernelError::InvalidPriority)
            .and_then(Priority::try_from);
        match priority {
            Ok(priority) => Some(priority),
            Err(err) => {
                say(&self.sys, &format!("nice: {err}\n"));
                None
            }
        }
    }

    /// `nice N COMMAND...`
    async fn nice(&mut self, mut command: ParsedCommand) {
        if command.argv.len() < 3 {
            say(&self.sys, "usage: nice N COMMAND...\n");
            return;
        }
        let Some(priority) = self.parse_priority(command.argv.get(1)) else {
            return;
        };
        command.argv.drain(..2);
        self.launch(command, Some(priority)).await;
    }

    /// `nice_pid N PID`
    fn nice_pid(&self, argv: &[String]) {
        let [_, level, pid] = argv else {
            say(&self.sys, "usage: nice_pid N PID\n");
            return;
        };
        let Some(priority) = self.parse_priority(Some(level)) else {
            return;
        };
        let Ok(pid) = pid.parse::<Pid>() else {
            say(&self.sys, &format!("nice_pid: {pid}: not a pid\n"));
            return;
        };
        if let Err(err) = self.sys.nice(pid, priority) {
            say(&self.sys, &format!("nice_pid: {err}\n"));
        }
    }
}
