use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use coresweep::config::Config;
use coresweep::jobspec;
use coresweep::launcher::ProcessLauncher;
use coresweep::monitor::Monitor;
use coresweep::terminal::{self, EchoGuard};

pub fn run_launch(
    cfg: &Config,
    dry_run: bool,
    dump_trace: bool,
    shutdown: &'static AtomicBool,
) -> Result<()> {
    let jobs = jobspec::generate(cfg);
    let launcher = ProcessLauncher::from_config(cfg);

    if dry_run {
        for job in &jobs {
            println!("{} > {}", launcher.command_line(job).join(" "),
                     job.output_path(&cfg.tmp_dir).display());
        }
        println!("{} JOBS", jobs.len());
        return Ok(());
    }

    std::fs::create_dir_all(&cfg.tmp_dir)
        .with_context(|| format!("CREATING {}", cfg.tmp_dir.display()))?;

    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::Relaxed);
    })?;

    let sep = "#".repeat(72);
    println!("{}", sep);
    println!("CORESWEEP v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", sep);
    println!("JOBS:            {}", jobs.len());
    println!("CORES:           {}", cfg.cores);
    println!("THREAD CLASSES:  {:?}", cfg.all_threads);
    println!("WORKER:          {}", cfg.worker.display());
    println!("OUTPUT DIR:      {}", cfg.tmp_dir.display());
    println!();

    let live = cfg.enable_log && terminal::stdout_is_tty();
    let mut monitor = Monitor::new(launcher, jobs, cfg.cores, cfg.poll_interval, live);

    let report = {
        // ECHO OFF FOR THE WHOLE POLLING LOOP, RESTORED ON ANY EXIT
        let _echo = EchoGuard::disable_echo();
        monitor.run(shutdown)
    };

    if dump_trace {
        monitor.trace().dump();
    }
    monitor.trace().summary(monitor.scheduler().budget().total());

    if report.not_launched > 0 {
        println!("\nINTERRUPTED: {} JOBS NEVER LAUNCHED", report.not_launched);
    }
    Ok(())
}
