// CORESWEEP -- CORE-BUDGETED BENCHMARK DRIVER
// LAUNCHES EVERY POINT OF AN EXPERIMENT GRID AS AN EXTERNAL WORKER PROCESS
// WITHOUT EVER COMMITTING MORE CORES THAN THE BUDGET, THEN FOLDS THE
// ONE-LINE WORKER OUTPUTS INTO PER-GROUP MEAN/STDDEV TABLES.
//
// launch:  GENERATE -> SCHEDULE -> MONITOR -> DRAIN
// process: SCAN OUTPUTS -> PARSE -> GROUP -> .dat REPORTS
// check:   WORKER, TIMER, DIRECTORIES, CORE BUDGET

mod cli;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use coresweep::config::Config;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "coresweep")]
#[command(about = "CORESWEEP -- CORE-BUDGETED BENCHMARK DRIVER")]
struct Cli {
    // key=value EXPERIMENT FILE (DEFAULTS WHEN ABSENT)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    // DEBUG-LEVEL LOGGING (OVERRIDDEN BY RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    // RUN THE WHOLE GRID WITHIN THE CORE BUDGET
    Launch {
        // PRINT THE JOB PLAN, LAUNCH NOTHING
        #[arg(long)]
        dry_run: bool,

        // DUMP THE FULL LAUNCH/REAP TRACE ON EXIT
        #[arg(long)]
        dump_trace: bool,
    },
    // AGGREGATE WORKER OUTPUTS INTO PER-GROUP REPORTS
    Process,
    // VERIFY WORKER, TIMER AND OUTPUT DIRECTORIES
    Check,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "coresweep=debug" } else { "coresweep=info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let cfg = Config::load(cli.config.as_deref())?;

    match cli.command {
        Cmd::Launch { dry_run, dump_trace } => {
            cli::launch::run_launch(&cfg, dry_run, dump_trace, &SHUTDOWN)
        }
        Cmd::Process => cli::process::run_process(&cfg),
        Cmd::Check => cli::check::run_check(&cfg),
    }
}
