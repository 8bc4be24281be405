//! tickos - boots the kernel and runs the shell on the host terminal
//!
//! Usage: `tickos [--image FILE] [--log FILE] [--virtual] [--verbose]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::LevelFilter;
use signal_hook::consts::{SIGINT, SIGTSTP};

use kernel::{logger, FileEventLog, Kernel, KernelConfig, RunOutcome};
use tickos_fs::{HostTerminal, MemFs};

#[derive(Debug, Default)]
struct Options {
    /// File-system image, loaded at boot and saved at shutdown
    image: Option<PathBuf>,
    /// Process event log file
    log: Option<PathBuf>,
    /// Tick on preemption points instead of wall time
    virtual_timer: bool,
    verbose: bool,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>> {
        let mut options = Options::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--log" => {
                    let path = args.next().context("--log needs a file name")?;
                    options.log = Some(PathBuf::from(path));
                }
                "--image" => {
                    let path = args.next().context("--image needs a file name")?;
                    options.image = Some(PathBuf::from(path));
                }
                "--virtual" => options.virtual_timer = true,
                "--verbose" => options.verbose = true,
                "-h" | "--help" => return Ok(None),
                other => bail!("unknown argument `{other}`"),
            }
        }
        Ok(Some(options))
    }
}

fn print_help() {
    println!("usage: tickos [--image FILE] [--log FILE] [--virtual] [--verbose]");
    println!("  --image FILE keep the file system in FILE across runs");
    println!("  --log FILE   append process events to FILE");
    println!("  --virtual    tick on preemption points instead of every 100ms");
    println!("  --verbose    debug-level diagnostics on stderr (or set TICKOS_LOG)");
}

fn main() -> Result<()> {
    let Some(options) = Options::parse(std::env::args().skip(1))? else {
        print_help();
        return Ok(());
    };

    let level = if options.verbose {
        LevelFilter::Debug
    } else {
        logger::level_from_env().unwrap_or(LevelFilter::Warn)
    };
    logger::init(level).context("installing the logger")?;

    let config = if options.virtual_timer {
        KernelConfig::deterministic()
    } else {
        KernelConfig::default()
    };
    let terminal = HostTerminal::spawn().context("starting the terminal reader")?;
    let file_system = match &options.image {
        Some(path) => MemFs::with_image(terminal, path)
            .with_context(|| format!("mounting image {}", path.display()))?,
        None => MemFs::new(terminal),
    };
    let mut builder = Kernel::builder().config(config).file_system(file_system);
    if let Some(path) = &options.log {
        let sink = FileEventLog::create(path)
            .with_context(|| format!("creating event log {}", path.display()))?;
        builder = builder.event_sink(sink);
    }
    let kernel = builder.build().context("building the kernel")?;

    // Ctrl-C and Ctrl-Z go to the foreground process, not to tickos
    let interrupts = kernel.interrupts();
    signal_hook::flag::register(SIGINT, interrupts.interrupt_flag())
        .context("catching SIGINT")?;
    signal_hook::flag::register(SIGTSTP, interrupts.stop_flag())
        .context("catching SIGTSTP")?;

    kernel
        .spawn_shell(user::shell, vec!["shell".into()])
        .context("spawning the shell")?;
    let outcome = kernel.run();
    log::info!("kernel returned to main: {outcome:?}");
    kernel.shutdown();

    if outcome != RunOutcome::Logout {
        eprintln!("tickos: stopped with {outcome:?}");
    }
    Ok(())
}
