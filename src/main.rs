#[macro_use]
extern crate log;

mod engine;
mod partition;
mod primality;
mod progress_reporter;
mod shared_types;
mod transport;

use std::error::Error;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::LevelFilter;
use tokio::{sync::mpsc, time::Instant};

use engine::{count_parallel, ParallelPreferences};
use progress_reporter::ProgressReporter;
use transport::TransportMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    mode: Mode,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Count primes in [2, N] on a single thread
    Seq {
        #[arg(value_name = "N", value_parser = clap::value_parser!(u64).range(2..))]
        limit: u64,
    },
    /// Count primes in [2, N] with P workers reporting over pipes or shared memory
    Par {
        #[arg(value_name = "N", value_parser = clap::value_parser!(u64).range(2..))]
        limit: u64,

        #[arg(value_name = "P", value_parser = clap::value_parser!(u64).range(1..))]
        workers: u64,

        #[arg(value_name = "TRANSPORT", value_enum)]
        transport: TransportMode,

        /// Show a progress bar while workers run
        #[arg(long)]
        progress: bool,

        /// Fail instead of printing a partial total when a worker fails
        #[arg(long)]
        strict: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn init_logging(level: LevelFilter, multi: MultiProgress) -> Result<(), Box<dyn Error>> {
    let logger = simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
    LogWrapper::new(multi, *logger).try_init()?;
    log::set_max_level(level);
    Ok(())
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    let multi = MultiProgress::new();
    init_logging(args.log_level.into(), multi.clone())?;

    match args.mode {
        Mode::Seq { limit } => {
            let started = Instant::now();
            let primes = primality::count_up_to(limit);
            let time_ms = elapsed_ms(started);

            println!("mode=seq N={limit} primes={primes} time_ms={time_ms:.3}");
        }

        Mode::Par {
            limit,
            workers,
            transport,
            progress,
            strict,
        } => {
            let prefs = ParallelPreferences {
                limit,
                worker_hint: usize::try_from(workers)?,
                transport,
            };

            let (s_progress, reporter) = if progress {
                let capacity = engine::resolve_worker_count(limit, prefs.worker_hint);
                let (s_progress, r_progress) = mpsc::channel::<u64>(capacity);
                let reporter = ProgressReporter::new(r_progress, limit - 1, multi.clone());
                (Some(s_progress), Some(reporter.spawn()))
            } else {
                (None, None)
            };

            let started = Instant::now();
            let result = count_parallel(prefs, s_progress).await;
            let time_ms = elapsed_ms(started);

            if let Some(reporter) = reporter {
                reporter.await?;
            }

            if result.is_degraded() && !strict {
                warn!(
                    "{} of {} workers failed; total is partial",
                    result.failures.len(),
                    result.workers
                );
            }
            let primes = if strict { result.strict()? } else { result.total };

            println!(
                "mode=par N={limit} P={workers} ipc={transport} primes={primes} time_ms={time_ms:.3}"
            );
        }
    }

    Ok(())
}
