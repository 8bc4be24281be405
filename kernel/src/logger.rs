//! Diagnostic logger
//!
//! Backend for the `log` facade that prints `[E]`/`[W]`/`[I]`/`[D]`/`[T]`
//! prefixed lines to stderr. The level can be changed at runtime.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use static_assertions::assert_impl_all;

/// Environment variable read by [`level_from_env`]
pub const LOG_ENV: &str = "TICKOS_LOG";

static LOGGER: KernelLogger = KernelLogger::new();

// binaries wrap `init` failures with anyhow
assert_impl_all!(SetLoggerError: std::error::Error, Send, Sync);

pub struct KernelLogger {
    level: AtomicUsize,
}

impl KernelLogger {
    pub const fn new() -> Self {
        Self { level: AtomicUsize::new(LevelFilter::Info as usize) }
    }

    pub fn set_level(&self, level: LevelFilter) {
        self.level.store(level as usize, Ordering::SeqCst);
    }

    pub fn level(&self) -> LevelFilter {
        match self.level.load(Ordering::SeqCst) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl Default for KernelLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn prefix(level: Level) -> &'static str {
    match level {
        Level::Error => "[E]",
        Level::Warn => "[W]",
        Level::Info => "[I]",
        Level::Debug => "[D]",
        Level::Trace => "[T]",
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{} {}", prefix(record.level()), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs the logger at `level`. Fails if another logger is installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.set_level(level);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Changes the level of the installed logger
pub fn set_level(level: LevelFilter) {
    LOGGER.set_level(level);
    log::set_max_level(level);
}

/// Level named by `TICKOS_LOG`, if set to something recognisable
pub fn level_from_env() -> Option<LevelFilter> {
    std::env::var(LOG_ENV).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_round_trips() {
        let logger = KernelLogger::new();
        assert_eq!(logger.level(), LevelFilter::Info);
        logger.set_level(LevelFilter::Trace);
        assert_eq!(logger.level(), LevelFilter::Trace);
        logger.set_level(LevelFilter::Off);
        assert_eq!(logger.level(), LevelFilter::Off);
    }

    #[test]
    fn prefixes() {
        assert_eq!(prefix(Level::Error), "[E]");
        assert_eq!(prefix(Level::Trace), "[T]");
    }
}
