//! Programs the shell runs as child processes
//!
//! Each program reads from `sys.stdin()` and writes to `sys.stdout()`, so
//! redirection is handled entirely by the shell. Errors are reported on
//! the program's output and never end the shell.

use std::fmt;

use kernel::{ProcessFuture, Sys};
use tickos_api::{
    Fd, FsError, FsResult, OpenMode, Permissions, Pid, ProcessStatus, Signal, WaitOutcome, WaitTarget,
};

/// Read size for file and terminal copies
const CHUNK: usize = 4096;

/// Entry point of a spawnable program
pub type Program = fn(Sys, Vec<String>) -> ProcessFuture;

macro_rules! program {
    ($body:path) => {{
        fn entry(sys: Sys, args: Vec<String>) -> ProcessFuture {
            Box::pin($body(sys, args))
        }
        entry as Program
    }};
}

/// Finds the program called `name`
pub fn lookup(name: &str) -> Option<Program> {
    let program = match name {
        "cat" => program!(cat),
        "sleep" => program!(sleep),
        "busy" => program!(busy),
        "echo" => program!(echo),
        "ls" => program!(ls),
        "touch" => program!(touch),
        "mv" => program!(mv),
        "cp" => program!(cp),
        "rm" => program!(rm),
        "chmod" => program!(chmod),
        "ps" => program!(ps),
        "kill" => program!(kill),
        "zombify" => program!(zombify),
        "orphanify" => program!(orphanify),
        _ => return None,
    };
    Some(program)
}

// ============================================================================
// I/O helpers
// ============================================================================

/// Writes `text` to the caller's output; a failed write is only logged
pub(crate) fn say(sys: &Sys, text: &str) {
    if let Err(err) = sys.print(text) {
        log::warn!("pid {}: write failed: {err}", sys.getpid());
    }
}

fn write_all(sys: &Sys, fd: Fd, mut bytes: &[u8]) -> FsResult<()> {
    while !bytes.is_empty() {
        let written = sys.write(fd, bytes)?;
        if written == 0 {
            return Err(FsError::BadHandle);
        }
        bytes = &bytes[written.min(bytes.len())..];
    }
    Ok(())
}

/// Copies `from` to `to` until end of input, sleeping a tick whenever the
/// terminal has nothing pending
async fn copy(sys: &Sys, from: Fd, to: Fd) -> FsResult<()> {
    loop {
        match sys.read(from, CHUNK) {
            Ok(bytes) if bytes.is_empty() => return Ok(()),
            Ok(bytes) => write_all(sys, to, &bytes)?,
            Err(FsError::WouldBlock) => sys.sleep(1).await,
            Err(err) => return Err(err),
        }
    }
}

fn read_file(sys: &Sys, path: &str) -> FsResult<Vec<u8>> {
    let fd = sys.open(path, OpenMode::Read)?;
    let mut data = Vec::new();
    let result = loop {
        match sys.read(fd, CHUNK) {
            Ok(bytes) if bytes.is_empty() => break Ok(()),
            Ok(bytes) => data.extend(bytes),
            Err(err) => break Err(err),
        }
    };
    sys.close(fd)?;
    result.map(|()| data)
}

fn write_file(sys: &Sys, path: &str, data: &[u8]) -> FsResult<()> {
    let fd = sys.open(path, OpenMode::Write)?;
    let result = write_all(sys, fd, data);
    sys.close(fd)?;
    result
}

// ============================================================================
// File programs
// ============================================================================

/// `cat [file...]`: concatenates files, or copies input when given none
pub async fn cat(sys: Sys, args: Vec<String>) {
    let out = sys.stdout();
    if args.len() < 2 {
        if let Err(err) = copy(&sys, sys.stdin(), out).await {
            say(&sys, &format!("cat: {err}\n"));
        }
        return;
    }
    for path in &args[1..] {
        let result = read_file(&sys, path).and_then(|data| write_all(&sys, out, &data));
        if let Err(err) = result {
            say(&sys, &format!("cat: {path}: {err}\n"));
        }
    }
}

pub async fn echo(sys: Sys, args: Vec<String>) {
    let mut line = args.get(1..).unwrap_or_default().join(" ");
    line.push('\n');
    say(&sys, &line);
}

/// `ls [file...]`: permissions, size and name of each file
pub async fn ls(sys: Sys, args: Vec<String>) {
    let entries = if args.len() < 2 {
        sys.list_files()
    } else {
        let mut entries = Vec::new();
        for path in &args[1..] {
            match sys.stat(path) {
                Ok(info) => entries.push(info),
                Err(err) => say(&sys, &format!("ls: {path}: {err}\n")),
            }
        }
        entries
    };
    let listing: String = entries
        .iter()
        .map(|info| format!("{} {:>6} {}\n", info.permissions.render(), info.size, info.name))
        .collect();
    say(&sys, &listing);
}

pub async fn touch(sys: Sys, args: Vec<String>) {
    if args.len() < 2 {
        say(&sys, "usage: touch FILE...\n");
    }
    for path in args.iter().skip(1) {
        if let Err(err) = sys.touch(path) {
            say(&sys, &format!("touch: {path}: {err}\n"));
        }
    }
}

pub async fn mv(sys: Sys, args: Vec<String>) {
    let [_, from, to] = args.as_slice() else {
        say(&sys, "usage: mv SOURCE DEST\n");
        return;
    };
    if let Err(err) = sys.rename(from, to) {
        say(&sys, &format!("mv: {err}\n"));
    }
}

pub async fn rm(sys: Sys, args: Vec<String>) {
    if args.len() < 2 {
        say(&sys, "usage: rm FILE...\n");
    }
    for path in args.iter().skip(1) {
        if let Err(err) = sys.unlink(path) {
            say(&sys, &format!("rm: {path}: {err}\n"));
        }
    }
}

/// Either side of a `cp`
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Fs(String),
    /// Path on the host file system, marked with `-h`
    Host(String),
}

#[derive(Debug)]
enum CopyError {
    Usage,
    Fs(FsError),
    Host(std::io::Error),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::Usage => write!(f, "usage: cp [-h] SOURCE [-h] DEST"),
            CopyError::Fs(err) => write!(f, "{err}"),
            CopyError::Host(err) => write!(f, "host: {err}"),
        }
    }
}

impl From<FsError> for CopyError {
    fn from(err: FsError) -> Self {
        CopyError::Fs(err)
    }
}

impl From<std::io::Error> for CopyError {
    fn from(err: std::io::Error) -> Self {
        CopyError::Host(err)
    }
}

fn copy_locations(args: &[String]) -> Result<(Location, Location), CopyError> {
    let mut locations = Vec::new();
    let mut host = false;
    for arg in args {
        if arg == "-h" {
            if host {
                return Err(CopyError::Usage);
            }
            host = true;
        } else if host {
            locations.push(Location::Host(arg.clone()));
            host = false;
        } else {
            locations.push(Location::Fs(arg.clone()));
        }
    }
    match <[Location; 2]>::try_from(locations) {
        Ok([Location::Host(_), Location::Host(_)]) | Err(_) => Err(CopyError::Usage),
        Ok([from, to]) if !host => Ok((from, to)),
        Ok(_) => Err(CopyError::Usage),
    }
}

fn copy_between(sys: &Sys, args: &[String]) -> Result<(), CopyError> {
    let (from, to) = copy_locations(args)?;
    let data = match &from {
        Location::Fs(path) => read_file(sys, path)?,
        Location::Host(path) => std::fs::read(path)?,
    };
    match &to {
        Location::Fs(path) => write_file(sys, path, &data)?,
        Location::Host(path) => std::fs::write(path, &data)?,
    }
    Ok(())
}

/// `cp [-h] SOURCE [-h] DEST`; `-h` marks a host path
pub async fn cp(sys: Sys, args: Vec<String>) {
    if let Err(err) = copy_between(&sys, args.get(1..).unwrap_or_default()) {
        say(&sys, &format!("cp: {err}\n"));
    }
}

/// Parses `+rw`, `-x` and the like
fn permission_change(mode: &str) -> Option<(bool, Permissions)> {
    let mut chars = mode.chars();
    let grant = match chars.next()? {
        '+' => true,
        '-' => false,
        _ => return None,
    };
    let mut bits = Permissions::empty();
    for c in chars {
        bits |= match c {
            'r' => Permissions::READ,
            'w' => Permissions::WRITE,
            'x' => Permissions::EXECUTE,
            _ => return None,
        };
    }
    (!bits.is_empty()).then_some((grant, bits))
}

/// `chmod [+-][rwx] FILE...`
pub async fn chmod(sys: Sys, args: Vec<String>) {
    let change = args.get(1).and_then(|mode| permission_change(mode));
    let Some((grant, bits)) = change.filter(|_| args.len() > 2) else {
        say(&sys, "usage: chmod [+-][rwx] FILE...\n");
        return;
    };
    for path in &args[2..] {
        let result = sys.stat(path).and_then(|info| {
            let permissions = if grant {
                info.permissions | bits
            } else {
                info.permissions - bits
            };
            sys.chmod(path, permissions)
        });
        if let Err(err) = result {
            say(&sys, &format!("chmod: {path}: {err}\n"));
        }
    }
}

// ============================================================================
// Process programs
// ============================================================================

/// `sleep SECONDS`
pub async fn sleep(sys: Sys, args: Vec<String>) {
    let Some(seconds) = args.get(1).and_then(|arg| arg.parse::<u64>().ok()) else {
        say(&sys, "usage: sleep SECONDS\n");
        return;
    };
    sys.sleep(seconds.saturating_mul(sys.ticks_per_second())).await;
}

/// Spins until killed
pub async fn busy(sys: Sys, _args: Vec<String>) {
    loop {
        sys.checkpoint().await;
    }
}

pub async fn ps(sys: Sys, _args: Vec<String>) {
    let mut table = format!("{:<5}{:<6}{:<5}{:<6}{}\n", "PID", "PPID", "PRI", "STAT", "CMD");
    for info in sys.ps() {
        table.push_str(&format!(
            "{:<5}{:<6}{:<5}{:<6}{}\n",
            info.pid,
            info.ppid,
            info.priority.nice(),
            info.status.letter(),
            info.name
        ));
    }
    say(&sys, &table);
}

fn parse_signal(flag: &str) -> Option<Signal> {
    match flag {
        "-term" => Some(Signal::Terminate),
        "-stop" => Some(Signal::Stop),
        "-cont" => Some(Signal::Continue),
        _ => None,
    }
}

/// `kill [-term|-stop|-cont] PID...`; terminates by default
pub async fn kill(sys: Sys, args: Vec<String>) {
    let mut rest: &[String] = args.get(1..).unwrap_or_default();
    let signal = match rest.first() {
        Some(flag) if flag.starts_with('-') => {
            let Some(signal) = parse_signal(flag) else {
                say(&sys, &format!("kill: unknown signal {flag}\n"));
                return;
            };
            rest = &rest[1..];
            signal
        }
        _ => Signal::Terminate,
    };
    if rest.is_empty() {
        say(&sys, "usage: kill [-term|-stop|-cont] PID...\n");
        return;
    }
    for arg in rest {
        let Ok(pid) = arg.parse::<Pid>() else {
            say(&sys, &format!("kill: {arg}: not a pid\n"));
            continue;
        };
        if let Err(err) = sys.kill(pid, signal).await {
            say(&sys, &format!("kill: {pid}: {err}\n"));
        }
    }
}

async fn zombie_child(_sys: Sys, _args: Vec<String>) {}

/// Leaves an unreaped child behind, then spins
pub async fn zombify(sys: Sys, _args: Vec<String>) {
    let child = sys.spawn(zombie_child, vec!["zombie_child".into()], sys.stdin(), sys.stdout());
    if let Err(err) = child {
        say(&sys, &format!("zombify: {err}\n"));
    }
    busy(sys, Vec::new()).await;
}

/// Exits while its child is still running
pub async fn orphanify(sys: Sys, _args: Vec<String>) {
    let child = sys.spawn(busy, vec!["orphan_child".into()], sys.stdin(), sys.stdout());
    if let Err(err) = child {
        say(&sys, &format!("orphanify: {err}\n"));
    }
}

// ============================================================================
// Wait demonstrations, run inline by the shell
// ============================================================================

/// Children started by `hang` and `nohang`
const NAPPERS: usize = 10;

/// Last generation started by `recur`
const LAST_GENERATION: char = 'Z';

/// Sleeps one tick
async fn nap(sys: Sys, _args: Vec<String>) {
    sys.sleep(1).await;
}

/// How one wait on a demo child turned out
enum Reaped {
    Yes,
    NotYet,
    /// Stopped, or no longer waitable; the demo gives up on it
    Lost,
}

async fn reap_child(sys: &Sys, pid: Pid, name: &str, nohang: bool) -> Reaped {
    match sys.wait(WaitTarget::Pid(pid), nohang).await {
        Ok(WaitOutcome::Changed { status, .. }) if status.is_terminated() => {
            say(sys, &format!("{name} was reaped\n"));
            Reaped::Yes
        }
        Ok(WaitOutcome::Changed { status: ProcessStatus::Stopped, .. }) => {
            say(sys, &format!("{name} stopped\n"));
            Reaped::Lost
        }
        Ok(WaitOutcome::Changed { .. }) | Ok(WaitOutcome::NoChange { .. }) => Reaped::NotYet,
        Err(err) => {
            log::warn!("pid {}: waiting for {name} failed: {err}", sys.getpid());
            Reaped::Lost
        }
    }
}

/// Spawns ten nappers and reaps them all: `hang` blocks in each wait,
/// `nohang` polls and sleeps a tick between rounds
pub(crate) async fn spawn_nappers(sys: &Sys, nohang: bool) {
    let mut pending = Vec::with_capacity(NAPPERS);
    for i in 0..NAPPERS {
        let name = format!("child_{i}");
        match sys.spawn(nap, vec![name.clone()], sys.stdin(), sys.stdout()) {
            Ok(pid) => {
                say(sys, &format!("{name} was spawned\n"));
                pending.push((pid, name));
            }
            Err(err) => say(sys, &format!("{name}: {err}\n")),
        }
    }
    while !pending.is_empty() {
        let mut still_running = Vec::with_capacity(pending.len());
        for (pid, name) in pending {
            if let Reaped::NotYet = reap_child(sys, pid, &name, nohang).await {
                still_running.push((pid, name));
            }
        }
        pending = still_running;
        if !pending.is_empty() {
            sys.sleep(1).await;
        }
    }
}

/// Starts generation `name`, naps, then waits for it
async fn spawn_generation(sys: &Sys, name: String) {
    let pid = match sys.spawn(program!(generation), vec![name.clone()], sys.stdin(), sys.stdout()) {
        Ok(pid) => pid,
        Err(err) => {
            say(sys, &format!("{name}: {err}\n"));
            return;
        }
    };
    say(sys, &format!("{name} was spawned\n"));
    sys.sleep(1).await;
    reap_child(sys, pid, &name, false).await;
}

/// `Gen_X` starts `Gen_Y`, one letter on, until the last generation
async fn generation(sys: Sys, args: Vec<String>) {
    let next = args
        .first()
        .and_then(|name| name.chars().last())
        .filter(|&letter| letter.is_ascii_uppercase() && letter < LAST_GENERATION)
        .and_then(|letter| char::from_u32(letter as u32 + 1));
    if let Some(letter) = next {
        spawn_generation(&sys, format!("Gen_{letter}")).await;
    }
}

/// Chain of 26 generations, each waiting for the next
pub(crate) async fn recur(sys: &Sys) {
    spawn_generation(sys, "Gen_A".to_string()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn every_listed_program_resolves() {
        for name in ["cat", "sleep", "busy", "echo", "ls", "touch", "mv", "cp", "rm", "chmod", "ps",
            "kill", "zombify", "orphanify"]
        {
            assert!(lookup(name).is_some(), "{name}");
        }
        assert!(lookup("jobs").is_none());
    }

    #[test]
    fn permission_modes() {
        assert_eq!(permission_change("+x"), Some((true, Permissions::EXECUTE)));
        assert_eq!(
            permission_change("-rw"),
            Some((false, Permissions::READ | Permissions::WRITE))
        );
        assert_eq!(permission_change("+"), None);
        assert_eq!(permission_change("rw"), None);
        assert_eq!(permission_change("+q"), None);
    }

    #[test]
    fn copy_argument_forms() {
        let (from, to) = copy_locations(&strings(&["-h", "host.txt", "notes"])).unwrap();
        assert_eq!(from, Location::Host("host.txt".into()));
        assert_eq!(to, Location::Fs("notes".into()));

        let (from, to) = copy_locations(&strings(&["notes", "-h", "out.txt"])).unwrap();
        assert_eq!(from, Location::Fs("notes".into()));
        assert_eq!(to, Location::Host("out.txt".into()));

        assert!(copy_locations(&strings(&["-h", "a", "-h", "b"])).is_err());
        assert!(copy_locations(&strings(&["a"])).is_err());
        assert!(copy_locations(&strings(&["a", "b", "-h"])).is_err());
    }

    #[test]
    fn signal_flags() {
        assert_eq!(parse_signal("-stop"), Some(Signal::Stop));
        assert_eq!(parse_signal("-cont"), Some(Signal::Continue));
        assert_eq!(parse_signal("-term"), Some(Signal::Terminate));
        assert_eq!(parse_signal("-9"), None);
    }
}
