// CORESWEEP PROCESS POOL MONITOR
// SINGLE-THREADED COOPERATIVE LOOP. NO LOCKS: THE CORE BUDGET IS ONLY EVER
// TOUCHED FROM HERE.
//
// EACH ITERATION:
//   1. ONE SCHEDULING DECISION. IF A JOB WAS CONSUMED, GO AGAIN AT ONCE.
//   2. OTHERWISE REDRAW STATUS, SLEEP ONE POLL INTERVAL.
//   3. NON-BLOCKING LIVENESS CHECK OF EVERY RUNNING JOB. EXITED JOBS GIVE
//      BACK THEIR CORES AND CLOSE THEIR OUTPUT HANDLES.
// ONCE THE QUEUE IS EMPTY: POLL + SLEEP UNTIL EVERY CORE IS BACK.
// NOTHING IS EVER KILLED. COMPLETION IS PURELY OBSERVED.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::jobspec::JobSpec;
use crate::launcher::{Launcher, Worker};
use crate::progress::{Progress, ProgressKey};
use crate::scheduler::Scheduler;
use crate::trace::{EventKind, LaunchTrace};

pub struct RunningJob<W> {
    worker: W,
    seq: usize,
    threads: u32,
    key: ProgressKey,
    name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub launched: usize,
    pub launch_failures: usize,
    pub not_launched: usize,
    pub unclean_exits: usize,
    pub elapsed: Duration,
}

pub struct Monitor<L: Launcher> {
    launcher: L,
    scheduler: Scheduler,
    progress: Progress,
    trace: LaunchTrace,
    running: Vec<RunningJob<L::Worker>>,
    poll_interval: Duration,
    report: RunReport,
    next_seq: usize,
}

impl<L: Launcher> Monitor<L> {
    pub fn new(
        launcher: L,
        jobs: Vec<JobSpec>,
        cores: u32,
        poll_interval: Duration,
        live_status: bool,
    ) -> Self {
        let progress = Progress::new(&jobs, live_status);
        Self {
            launcher,
            scheduler: Scheduler::new(cores, jobs),
            progress,
            trace: LaunchTrace::new(),
            running: Vec::new(),
            poll_interval,
            report: RunReport::default(),
            next_seq: 0,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn trace(&self) -> &LaunchTrace {
        &self.trace
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    // ONE SCHEDULING DECISION. TRUE IF A JOB LEFT THE QUEUE (LAUNCHED OR
    // FAILED TO SPAWN).
    pub fn try_launch(&mut self) -> bool {
        let job = match self.scheduler.dispatch() {
            Some(j) => j,
            None => return false,
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = ProgressKey::of(&job);

        match self.launcher.launch(&job) {
            Ok(worker) => {
                let available = self.scheduler.budget().available();
                self.trace.record(EventKind::Launch, seq, job.threads, available);
                self.progress.launched(&key);
                self.report.launched += 1;
                log_debug!("LAUNCH #{} {} (FREE CORES {})", seq, job.output_name(), available);
                self.running.push(RunningJob {
                    worker,
                    seq,
                    threads: job.threads,
                    key,
                    name: job.output_name(),
                });
            }
            Err(e) => {
                // NEVER RAN: HAND THE CORES STRAIGHT BACK
                self.scheduler.complete(job.threads);
                let available = self.scheduler.budget().available();
                self.trace.record(EventKind::LaunchFailed, seq, job.threads, available);
                self.progress.failed(&key);
                self.report.launch_failures += 1;
                log_error!("LAUNCH FAILED FOR {}: {:#}", job.output_name(), e);
            }
        }
        true
    }

    // NON-BLOCKING LIVENESS CHECK. RETURNS HOW MANY JOBS WERE REAPED.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        let mut i = 0;
        while i < self.running.len() {
            let finished = match self.running[i].worker.try_finish() {
                Ok(state) => state,
                Err(e) => {
                    // CAN'T OBSERVE IT ANY MORE. COUNT IT AS EXITED SO THE
                    // DRAIN PHASE TERMINATES.
                    log_warn!("LIVENESS CHECK FAILED FOR {}: {:#}", self.running[i].name, e);
                    Some(false)
                }
            };
            let success = match finished {
                Some(ok) => ok,
                None => {
                    i += 1;
                    continue;
                }
            };

            // DROPPING THE JOB CLOSES ITS OUTPUT HANDLE
            let job = self.running.swap_remove(i);
            if !success {
                self.report.unclean_exits += 1;
                log_warn!("JOB #{} {} EXITED WITH FAILURE", job.seq, job.name);
            }
            self.scheduler.complete(job.threads);
            self.progress.returned(&job.key);
            self.trace.record(
                EventKind::Reap, job.seq, job.threads, self.scheduler.budget().available(),
            );
            reaped += 1;
        }
        reaped
    }

    fn redraw(&mut self) {
        let budget = self.scheduler.budget();
        self.progress.draw(budget.in_use(), budget.total());
    }

    // RUN EVERY QUEUED JOB TO COMPLETION. A SET shutdown FLAG STOPS NEW
    // LAUNCHES; IN-FLIGHT JOBS ARE STILL DRAINED.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RunReport {
        let start = Instant::now();
        let budget = self.scheduler.budget();
        log_info!(
            "{} JOBS, {} CORES, CLASSES {:?}",
            self.scheduler.pending(), budget.total(), self.scheduler.classes()
        );

        while self.scheduler.pending() > 0 {
            if shutdown.load(Ordering::Relaxed) {
                self.report.not_launched = self.scheduler.abandon();
                self.progress.abandon();
                log_warn!(
                    "INTERRUPTED: {} JOBS NOT LAUNCHED, DRAINING {} RUNNING",
                    self.report.not_launched, self.running.len()
                );
                break;
            }
            if self.try_launch() {
                continue;
            }
            self.redraw();
            std::thread::sleep(self.poll_interval);
            self.reap();
        }

        // DRAIN: WAIT FOR EVERY CORE TO COME BACK
        while !self.scheduler.budget().is_idle() {
            if self.running.is_empty() {
                log_error!(
                    "BUDGET LEAK: {} CORES IN USE WITH NOTHING RUNNING",
                    self.scheduler.budget().in_use()
                );
                break;
            }
            if self.reap() == 0 {
                std::thread::sleep(self.poll_interval);
            }
            self.redraw();
        }

        self.report.elapsed = start.elapsed();
        log_info!(
            "ALL JOBS DRAINED: {} LAUNCHED, {} FAILED TO LAUNCH, {} UNCLEAN EXITS IN {:.1}s",
            self.report.launched,
            self.report.launch_failures,
            self.report.unclean_exits,
            self.report.elapsed.as_secs_f64()
        );
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use anyhow::{bail, Result};

    // FINISHES AFTER A FIXED NUMBER OF POLLS
    struct Countdown(u32);

    impl Worker for Countdown {
        fn try_finish(&mut self) -> Result<Option<bool>> {
            if self.0 == 0 {
                return Ok(Some(true));
            }
            self.0 -= 1;
            Ok(None)
        }
    }

    struct Scripted {
        polls: u32,
        fail_threads: Option<u32>,
    }

    impl Launcher for Scripted {
        type Worker = Countdown;

        fn launch(&mut self, job: &JobSpec) -> Result<Countdown> {
            if Some(job.threads) == self.fail_threads {
                bail!("NO SUCH BINARY");
            }
            Ok(Countdown(self.polls))
        }
    }

    fn jobs(text: &str) -> Vec<JobSpec> {
        crate::jobspec::generate(&Config::parse(text).unwrap())
    }

    #[test]
    fn drains_everything() {
        let jobs = jobs("core=4\nall_threads=1,2,4\niterations=2\n");
        let n = jobs.len();
        let mut m = Monitor::new(
            Scripted { polls: 2, fail_threads: None }, jobs, 4, Duration::ZERO, false,
        );
        let report = m.run(&AtomicBool::new(false));
        assert_eq!(report.launched, n);
        assert_eq!(report.launch_failures, 0);
        assert_eq!(m.running(), 0);
        assert!(m.scheduler().is_drained());
        assert_eq!(m.progress().remaining(), 0);
        assert_eq!(m.progress().running(), 0);
    }

    #[test]
    fn spawn_failure_returns_cores() {
        let jobs = jobs("core=4\nall_threads=1,4\n");
        let n = jobs.len();
        let mut m = Monitor::new(
            Scripted { polls: 1, fail_threads: Some(4) }, jobs, 4, Duration::ZERO, false,
        );
        let report = m.run(&AtomicBool::new(false));
        assert_eq!(report.launch_failures, n / 2);
        assert_eq!(report.launched, n / 2);
        assert!(m.scheduler().budget().is_idle());
    }

    #[test]
    fn shutdown_stops_launching_but_drains() {
        let jobs = jobs("core=2\nall_threads=2\niterations=3\n");
        let n = jobs.len();
        let mut m = Monitor::new(
            Scripted { polls: 3, fail_threads: None }, jobs, 2, Duration::ZERO, false,
        );
        assert!(m.try_launch());
        let report = m.run(&AtomicBool::new(true));
        assert_eq!(report.launched, 1);
        assert_eq!(report.not_launched, n - 1);
        assert_eq!(m.progress().remaining(), 0);
        assert_eq!(m.progress().running(), 0);
        assert_eq!(m.running(), 0);
        assert!(m.scheduler().budget().is_idle());
    }
}
