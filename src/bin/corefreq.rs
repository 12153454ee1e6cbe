use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corefreq::config::{ProbeConfig, MONITOR_INTERVAL};
use corefreq::monitor::FleetMonitor;
use corefreq::report::{self, LinePrinter};
use corefreq::schema::{FleetMode, JsonReport, RunMeta};
use corefreq::{BenchmarkRequest, LinuxPlatform, NoopObserver, Orchestrator, Platform, WorkloadKind};
use log::{error, info};
use serde::Serialize;

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one core and sample its frequency.
    Run {
        /// Instruction set to run.
        #[arg(long, value_enum, default_value_t = WorkloadKind::Avx256)]
        instr: WorkloadKind,

        /// Duration of the benchmark in seconds.
        #[arg(long, default_value_t = 5)]
        time: u64,

        /// CPU core to run the benchmark on.
        #[arg(long, default_value_t = 0)]
        core: usize,
    },

    /// Load every logical core, in parallel or one after another.
    Fleet {
        #[arg(long, value_enum, default_value_t = WorkloadKind::Avx256)]
        instr: WorkloadKind,

        /// Duration per core in seconds.
        #[arg(long, default_value_t = 5)]
        time: u64,

        /// Run cores one at a time to avoid cross-core thermal interference.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Also record an all-cores frequency timeline at this cadence.
        #[arg(long, value_name = "MS", env = "COREFREQ_MONITOR_MS")]
        monitor_ms: Option<u64>,
    },

    /// Show CPU model, core count and instruction set support.
    Info,

    /// Print the frequency of every core at a fixed cadence, without load.
    Monitor {
        /// How long to watch, in seconds.
        #[arg(long, default_value_t = 10)]
        time: u64,

        #[arg(long, value_name = "MS", default_value_t = MONITOR_INTERVAL.as_millis() as u64)]
        every_ms: u64,
    },
}

#[derive(Parser, Debug)]
#[command(name = "corefreq")]
#[command(about = "Per-core CPU stress and frequency probe")]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the result as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Frequency sampling interval.
    #[arg(long, value_name = "MS", global = true, env = "COREFREQ_INTERVAL_MS", default_value_t = 100)]
    interval_ms: u64,

    /// Delay between starting the sampler and applying load.
    #[arg(long, value_name = "MS", global = true, env = "COREFREQ_GRACE_MS", default_value_t = 100)]
    grace_ms: u64,

    /// Primitive operations per compute batch.
    #[arg(long, global = true, env = "COREFREQ_BATCH", default_value_t = corefreq::config::BATCH_ITERATIONS)]
    batch: u64,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: u8) -> Result<()> {
    let llv = match verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn print_json<T: Serialize>(config: &ProbeConfig, result: T) -> Result<()> {
    let report = JsonReport {
        run: RunMeta {
            schema_version: 1,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp_utc: now_utc(),
            config: config.clone(),
        },
        result,
    };
    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let mut config = ProbeConfig::default()
        .with_sample_interval(Duration::from_millis(args.interval_ms))
        .with_startup_grace(Duration::from_millis(args.grace_ms))
        .with_batch_iterations(args.batch);

    let platform = LinuxPlatform::new();
    let stdout = io::stdout();

    match args.cmd {
        Command::Run { instr, time, core } => {
            let orch = Orchestrator::new(platform, config.clone());
            let request = BenchmarkRequest::new(instr, Duration::from_secs(time), core);
            orch.validate(&request)?;
            if !args.json {
                report::write_cpu_info(&mut stdout.lock(), &orch.platform().cpu_info())?;
            }

            let result = orch.run_single(&request)?;
            if args.json {
                print_json(&config, &result)?;
            } else {
                report::write_result(&mut stdout.lock(), &result)?;
            }
        }
        Command::Fleet {
            instr,
            time,
            sequential,
            monitor_ms,
        } => {
            config = config.with_monitor_interval(monitor_ms.map(Duration::from_millis));
            let orch = Orchestrator::new(platform, config.clone());
            let mode = if sequential {
                FleetMode::Sequential
            } else {
                FleetMode::Parallel
            };
            let duration = Duration::from_secs(time);

            let report = if args.json {
                orch.run_fleet(instr, duration, mode, &NoopObserver)?
            } else {
                let printer = LinePrinter::new(io::stdout());
                orch.run_fleet(instr, duration, mode, &printer)?
            };

            if args.json {
                print_json(&config, &report)?;
            } else {
                report::write_fleet(&mut stdout.lock(), &report)?;
            }
        }
        Command::Info => {
            let info = platform.cpu_info();
            if args.json {
                print_json(&config, &info)?;
            } else {
                report::write_cpu_info(&mut stdout.lock(), &info)?;
            }
        }
        Command::Monitor { time, every_ms } => {
            let monitor = FleetMonitor::new(Duration::from_millis(every_ms));
            info!(
                "monitoring {} cores every {}ms for {}s",
                platform.logical_core_count(),
                every_ms,
                time
            );
            let json = args.json;
            let rows = monitor.watch(&platform, Duration::from_secs(time), |row| {
                if !json {
                    let mut out = io::stdout().lock();
                    let _ = writeln!(out, "{}", report::monitor_line(row));
                }
            })?;
            if json {
                print_json(&config, &rows)?;
            }
        }
    }

    stdout.lock().flush().context("flushing stdout")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    if let Err(e) = run(args) {
        match e.downcast_ref::<corefreq::Error>() {
            Some(ce) if ce.is_fatal() => {
                error!("unusable environment: {ce}");
                std::process::exit(1);
            }
            _ => return Err(e),
        }
    }
    Ok(())
}
