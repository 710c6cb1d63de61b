use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use treeprof::error::Error;
use treeprof::report::{diff_reports, format_table, latest_report, load_report};
use treeprof_runtime::{Communicator, Profiler, ProfilerConfig, ThreadGroup};

#[derive(Parser)]
#[command(
    name = "treeprof",
    about = "Read, compare and simulate call-tree profiler reports",
    version,
    after_help = "Reports are the <label>_time.csv files written by Profiler::disp."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a report (the most recent one by default).
    Report {
        /// Path to a specific report file. If omitted, shows the latest in --dir.
        file: Option<PathBuf>,

        /// Directory searched for reports (defaults to TREEPROF_DIR or ./prof).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compare the mean times of two reports, region by region.
    Diff {
        /// First report file.
        a: PathBuf,
        /// Second report file.
        b: PathBuf,
    },
    /// Profile a synthetic workload on a group of thread ranks.
    Demo {
        /// Number of ranks.
        #[arg(long, default_value_t = 4)]
        ranks: usize,

        /// Report label.
        #[arg(long, default_value = "demo")]
        name: String,

        /// Directory receiving the report file (defaults to TREEPROF_DIR or ./prof).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("TREEPROF_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Report { file, dir, json } => cmd_report(file, dir, json),
        Commands::Diff { a, b } => cmd_diff(a, b),
        Commands::Demo { ranks, name, dir } => cmd_demo(ranks, name, dir),
    }
}

fn cmd_report(file: Option<PathBuf>, dir: Option<PathBuf>, json: bool) -> Result<(), Error> {
    let path = match file {
        Some(p) => p,
        None => latest_report(&dir.unwrap_or_else(default_report_dir))?,
    };
    tracing::debug!(path = %path.display(), "loading report");
    let report = load_report(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        anstream::print!("{}", format_table(&report));
    }
    Ok(())
}

fn cmd_diff(a: PathBuf, b: PathBuf) -> Result<(), Error> {
    let report_a = load_report(&a)?;
    let report_b = load_report(&b)?;
    anstream::print!("{}", diff_reports(&report_a, &report_b));
    Ok(())
}

fn cmd_demo(ranks: usize, name: String, dir: Option<PathBuf>) -> Result<(), Error> {
    if ranks == 0 {
        return Err(Error::NoRanks);
    }
    let mut config = ProfilerConfig::from_env();
    if let Some(dir) = dir {
        config.report_dir = dir;
    }
    let report_path = config.sidecar_path(&name);
    tracing::debug!(ranks, label = %name, dir = %config.report_dir.display(), "starting demo");

    ThreadGroup::run(ranks, |comm| {
        let mut prof = Profiler::with_config(&name, comm, config.clone());
        workload(&mut prof);
        let mut out = anstream::stdout();
        prof.disp_to(&mut out);
    });

    if config.sidecar {
        eprintln!("report written to {}", report_path.display());
    }
    Ok(())
}

/// Nested regions whose durations grow with the rank, so the report shows a
/// non-zero spread. Odd ranks never run `checkpoint`, and `post` is never
/// timed itself, only its children.
fn workload<C: Communicator>(prof: &mut Profiler<C>) {
    let rank = prof.comm().rank() as u64;
    let ms = Duration::from_millis;

    for _ in 0..3 {
        let mut step = prof.scope("step");
        {
            let _assemble = step.scope("assemble");
            thread::sleep(ms(2 + rank));
        }
        {
            let mut solve = step.scope("solve");
            for _ in 0..2 {
                let _kernel = solve.scope("kernel");
                thread::sleep(ms(3 + 2 * rank));
            }
        }
        if rank % 2 == 0 {
            let _checkpoint = step.scope("checkpoint");
            thread::sleep(ms(1));
        } else {
            step.init_leave("checkpoint");
        }
    }

    prof.init("post");
    {
        let _reduce = prof.scope("reduce");
        thread::sleep(ms(1));
    }
    prof.leave("post");
}

fn default_report_dir() -> PathBuf {
    ProfilerConfig::from_env().report_dir
}
