use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use crossbeam::channel;
use tidsmaskin_config::{ClockChain, ClockConfig, ClockSpec};
use tidsmaskin_core::format;
use tidsmaskin_core::host;
use tidsmaskin_core::intercept::{InterceptSet, Interceptor};
use tidsmaskin_core::state::{OffsetState, DEFAULT_WRITE_INTERVAL};
use tidsmaskin_core::time::ManualClock;
use tidsmaskin_telemetry::ClockLogger;
use tracing::{debug, info};

use crate::error::CliError;

const SLEEPER_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a clock and print what it reports
    Show(ShowArgs),
    /// Sleep on a clock and compare virtual and real elapsed time
    Sleep(SleepArgs),
    /// Inspect or seed a persisted offset state file
    #[command(subcommand)]
    State(StateCommand),
    /// Advance a manual clock step by step while threads sleep on it
    Drive(DriveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Clock parameters, e.g. `offset=5000,scaled=2`; configuration files when omitted
    #[arg(short, long)]
    pub clock: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SleepArgs {
    #[arg(short, long)]
    pub clock: String,
    /// Virtual milliseconds to sleep
    #[arg(long)]
    pub millis: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StateCommand {
    /// Print the instant stored in a state file
    Read { path: PathBuf },
    /// Store an instant, pushed ahead by two write intervals
    Write {
        path: PathBuf,
        /// `yyyyMMdd'T'HHmmss`; the current host time when omitted
        #[arg(long)]
        at: Option<String>,
        #[arg(long, default_value_t = 60_000)]
        interval_millis: u64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DriveArgs {
    /// Manual clock start, in millis or `@yyyyMMdd'T'HHmmss`
    #[arg(long, default_value = "0")]
    pub start: String,
    /// Virtual milliseconds per step
    #[arg(long, default_value_t = 1_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub step: u64,
    #[arg(long, default_value_t = 5)]
    pub steps: u32,
    /// Sleeper `i` sleeps for `(i + 1) * step`
    #[arg(long, default_value_t = 3)]
    pub sleepers: u32,
}

/// Outcome of one `advance` while driving a manual clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub virtual_millis: i64,
    pub woken: Vec<u32>,
}

pub fn run_command(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Show(args) => show(args),
        Commands::Sleep(args) => sleep(args),
        Commands::State(command) => state(command),
        Commands::Drive(args) => drive(args),
    }
}

fn load_chain(clock: Option<&str>) -> Result<ClockChain, CliError> {
    let config = match clock {
        Some(args) => ClockConfig::from_args(args)?,
        None => ClockConfig::load()?,
    };
    debug!(?config, "clock configuration loaded");
    Ok(config.build()?)
}

fn show(args: ShowArgs) -> Result<(), CliError> {
    let installed = load_chain(args.clock.as_deref())?.install()?;
    ClockLogger::log_reading(installed);

    let wall = installed.current_time_millis();
    println!("clock:         {}", installed.clock());
    println!("wall:          {} ({wall})", display_date(wall));
    println!("monotonic ns:  {}", installed.nano_time());
    println!("process start: {}", display_date(installed.process_start_millis()));
    println!("intercepts:    {:?}", installed.sites());
    Ok(())
}

fn sleep(args: SleepArgs) -> Result<(), CliError> {
    let chain = load_chain(Some(&args.clock))?;
    if chain.manual().is_some() {
        return Err(CliError::ManualSleep);
    }
    let installed = chain.install()?;

    let virtual_start = installed.current_time_millis();
    let real_start = Instant::now();
    installed.sleep(Duration::from_millis(args.millis))?;
    let real = real_start.elapsed();
    let virtual_elapsed = installed.current_time_millis() - virtual_start;

    info!(requested = args.millis, ?real, virtual_elapsed, "sleep finished");
    println!("requested: {} ms", args.millis);
    println!("virtual:   {virtual_elapsed} ms");
    println!("real:      {} ms", real.as_millis());
    Ok(())
}

fn state(command: StateCommand) -> Result<(), CliError> {
    match command {
        StateCommand::Read { path } => {
            let state = OffsetState::new(path, DEFAULT_WRITE_INTERVAL)?;
            match state.read()? {
                Some(at) => println!("{} ({at})", display_date(at)),
                None => println!("no state at {}", state.path().display()),
            }
        }
        StateCommand::Write {
            path,
            at,
            interval_millis,
        } => {
            let state = OffsetState::new(path, Duration::from_millis(interval_millis))?;
            let wall = match at {
                Some(date) => format::parse_date(&date)?,
                None => host::wall_millis(),
            };
            let stored = state.write(wall)?;
            println!("stored {} in {}", display_date(stored), state.path().display());
        }
    }
    Ok(())
}

fn drive(args: DriveArgs) -> Result<(), CliError> {
    let chain = ClockChain::build(&[ClockSpec::parse("manual", &args.start)?], InterceptSet::all())?;
    let manual = chain.manual().cloned().ok_or(CliError::NotManual)?;
    let installed = chain.install()?;

    let reports = drive_sleepers(
        installed,
        &manual,
        Duration::from_millis(args.step),
        args.steps,
        args.sleepers,
    )?;
    for (index, report) in reports.iter().enumerate() {
        println!(
            "step {:>3}: {} woke {:?}",
            index + 1,
            display_date(report.virtual_millis),
            report.woken
        );
    }
    let still_sleeping = manual.pending_waiters();
    if still_sleeping > 0 {
        println!("{still_sleeping} sleeper(s) still waiting at {}", manual.now_nanos());
    }
    Ok(())
}

/// Spawns `sleepers` threads sleeping through `interceptor` for staggered
/// durations, then advances `manual` `steps` times by `step`.
///
/// Sleepers that are still blocked when the steps run out are left behind.
pub fn drive_sleepers(
    interceptor: &Interceptor,
    manual: &ManualClock,
    step: Duration,
    steps: u32,
    sleepers: u32,
) -> Result<Vec<StepReport>, CliError> {
    let (tx, rx) = channel::unbounded();
    for index in 0..sleepers {
        let interceptor = interceptor.clone();
        let tx = tx.clone();
        let duration = step.saturating_mul(index + 1);
        thread::Builder::new()
            .name(format!("sleeper-{index}"))
            .spawn(move || {
                if interceptor.sleep(duration).is_ok() {
                    let _ = tx.send(index);
                }
            })
            .map_err(CliError::Spawn)?;
    }
    drop(tx);

    while manual.pending_waiters() < sleepers as usize {
        thread::yield_now();
    }

    let mut reports = Vec::with_capacity(steps as usize);
    for _ in 0..steps {
        let before = manual.pending_waiters();
        manual.advance(step)?;
        let woken_count = before - manual.pending_waiters();

        let mut woken = Vec::with_capacity(woken_count);
        for _ in 0..woken_count {
            woken.push(
                rx.recv_timeout(SLEEPER_REPORT_TIMEOUT)
                    .map_err(|_| CliError::SleeperLost)?,
            );
        }
        woken.sort_unstable();
        reports.push(StepReport {
            virtual_millis: interceptor.current_time_millis(),
            woken,
        });
    }
    Ok(reports)
}

fn display_date(millis: i64) -> String {
    format::format_date(millis).unwrap_or_else(|_| millis.to_string())
}
