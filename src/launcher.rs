// CORESWEEP LAUNCHER
// THE SEAM BETWEEN THE MONITOR LOOP AND THE OPERATING SYSTEM.
// THE MONITOR ONLY EVER SEES Launcher/Worker, SO THE SCHEDULING LOGIC RUNS
// UNCHANGED AGAINST SCRIPTED WORKERS IN TESTS.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::jobspec::JobSpec;

pub trait Worker {
    // NON-BLOCKING. None WHILE RUNNING, Some(success) ONCE EXITED.
    fn try_finish(&mut self) -> Result<Option<bool>>;
}

pub trait Launcher {
    type Worker: Worker;

    fn launch(&mut self, job: &JobSpec) -> Result<Self::Worker>;
}

pub struct ProcessLauncher {
    command: Vec<String>,
    out_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(timer: &[String], worker: &Path, out_dir: &Path) -> Self {
        let mut command = timer.to_vec();
        command.push(worker.to_string_lossy().into_owned());
        Self {
            command,
            out_dir: out_dir.to_path_buf(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.timer, &cfg.worker, &cfg.tmp_dir)
    }

    // FULL ARGV FOR ONE JOB (USED BY --dry-run)
    pub fn command_line(&self, job: &JobSpec) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.extend(job.args());
        argv
    }
}

impl Launcher for ProcessLauncher {
    type Worker = ProcessWorker;

    fn launch(&mut self, job: &JobSpec) -> Result<ProcessWorker> {
        let path = job.output_path(&self.out_dir);
        let output = File::create(&path)
            .with_context(|| format!("CREATING OUTPUT {}", path.display()))?;
        let stdout = output.try_clone()?;
        let stderr = output.try_clone()?;

        let argv = self.command_line(job);
        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .with_context(|| format!("SPAWNING {}", argv[0]))?;

        Ok(ProcessWorker {
            child,
            output: Some(output),
        })
    }
}

pub struct ProcessWorker {
    child: Child,
    output: Option<File>,
}

impl ProcessWorker {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Worker for ProcessWorker {
    fn try_finish(&mut self) -> Result<Option<bool>> {
        match self.child.try_wait()? {
            Some(status) => {
                // CLOSE THE OUTPUT HANDLE AS SOON AS THE EXIT IS OBSERVED
                self.output.take();
                Ok(Some(status.success()))
            }
            None => Ok(None),
        }
    }
}
