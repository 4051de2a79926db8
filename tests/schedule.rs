// CORESWEEP SCHEDULING TESTS
// MONITOR + SCHEDULER AGAINST SCRIPTED WORKERS. NO PROCESSES ARE SPAWNED:
// EACH FAKE WORKER EXITS AFTER A FIXED NUMBER OF LIVENESS CHECKS.
//
// ALL TESTS USE THE PUBLIC coresweep API. RUN OFFLINE.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;
use proptest::prelude::*;

use coresweep::config::Config;
use coresweep::jobspec::{self, JobSpec};
use coresweep::launcher::{Launcher, Worker};
use coresweep::monitor::Monitor;
use coresweep::trace::EventKind;

#[derive(Default)]
struct Ledger {
    cores_in_flight: u32,
    peak: u32,
    launched: Vec<String>,
    over_budget: bool,
}

struct FakeWorker {
    polls_left: u32,
    threads: u32,
    ledger: Rc<RefCell<Ledger>>,
}

impl Worker for FakeWorker {
    fn try_finish(&mut self) -> Result<Option<bool>> {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return Ok(None);
        }
        self.ledger.borrow_mut().cores_in_flight -= self.threads;
        Ok(Some(true))
    }
}

struct FakeLauncher {
    total: u32,
    polls: Box<dyn Fn(&JobSpec) -> u32>,
    ledger: Rc<RefCell<Ledger>>,
}

impl FakeLauncher {
    fn new(total: u32, polls: impl Fn(&JobSpec) -> u32 + 'static) -> Self {
        Self {
            total,
            polls: Box::new(polls),
            ledger: Rc::new(RefCell::new(Ledger::default())),
        }
    }
}

impl Launcher for FakeLauncher {
    type Worker = FakeWorker;

    fn launch(&mut self, job: &JobSpec) -> Result<FakeWorker> {
        let mut l = self.ledger.borrow_mut();
        l.cores_in_flight += job.threads;
        l.peak = l.peak.max(l.cores_in_flight);
        if l.cores_in_flight > self.total {
            l.over_budget = true;
        }
        l.launched.push(job.output_name());
        Ok(FakeWorker {
            polls_left: (self.polls)(job),
            threads: job.threads,
            ledger: self.ledger.clone(),
        })
    }
}

fn job(threads: u32, repetition: u32) -> JobSpec {
    let base = jobspec::generate(&Config::default()).remove(0);
    JobSpec { threads, repetition, ..base }
}

fn run(cores: u32, jobs: Vec<JobSpec>, polls: impl Fn(&JobSpec) -> u32 + 'static)
    -> Monitor<FakeLauncher>
{
    let widest = jobs.iter().map(|j| j.threads).max().unwrap_or(1);
    let launcher = FakeLauncher::new(cores.max(widest), polls);
    let mut m = Monitor::new(launcher, jobs, cores, Duration::ZERO, false);
    m.run(&AtomicBool::new(false));
    m
}

// === WIDE JOB SATURATES THE BUDGET ===

#[test]
fn wide_job_never_overlaps_narrow_jobs() {
    // 4 CORES, CLASSES {4, 2, 2}: THE WIDE JOB RUNS ALONE
    let m = run(4, vec![job(2, 0), job(4, 1), job(2, 2)], |_| 3);
    let trace = m.trace();

    let events: Vec<_> = trace.iter().copied().collect();
    let wide_launch = events.iter().position(|e| e.kind == EventKind::Launch && e.threads == 4).unwrap();
    let wide_seq = events[wide_launch].seq;
    let wide_reap = events.iter()
        .position(|e| e.kind == EventKind::Reap && e.seq == wide_seq)
        .unwrap();

    // NO NARROW JOB IS IN FLIGHT WHILE THE WIDE ONE RUNS
    for e in &events[..wide_launch] {
        if e.kind == EventKind::Launch {
            assert!(events[..wide_launch].iter().any(|r| r.kind == EventKind::Reap && r.seq == e.seq));
        }
    }
    for e in &events[wide_launch + 1..wide_reap] {
        assert_ne!(e.kind, EventKind::Launch);
    }

    // GREEDY WIDEST-FIRST: THE 4 GOES FIRST, THEN BOTH 2s TOGETHER
    assert_eq!(trace.launch_order(), vec![4, 2, 2]);
    let ledger = m.launcher().ledger.borrow();
    assert_eq!(ledger.peak, 4);
    assert!(!ledger.over_budget);
}

#[test]
fn narrow_jobs_pack_side_by_side() {
    let m = run(4, vec![job(2, 0), job(2, 1), job(2, 2), job(2, 3)], |_| 5);
    let events: Vec<_> = m.trace().iter().copied().collect();
    // FIRST TWO LAUNCHES BACK TO BACK, BUDGET FULL AFTER THE SECOND
    assert_eq!(events[0].kind, EventKind::Launch);
    assert_eq!(events[1].kind, EventKind::Launch);
    assert_eq!(events[1].available, 0);
    assert_eq!(events[2].kind, EventKind::Reap);
}

#[test]
fn budget_returns_to_total() {
    let m = run(6, vec![job(1, 0), job(3, 1), job(6, 2), job(2, 3)], |j| j.threads);
    let budget = m.scheduler().budget();
    assert_eq!(budget.available(), budget.total());
    assert!(m.scheduler().is_drained());
    assert_eq!(m.running(), 0);
}

#[test]
fn oversubscribed_class_still_runs() {
    let m = run(2, vec![job(8, 0), job(1, 1)], |_| 1);
    assert_eq!(m.scheduler().budget().total(), 8);
    assert_eq!(m.launcher().ledger.borrow().launched.len(), 2);
}

#[test]
fn generated_grid_runs_once_each() {
    let cfg = Config::parse(
        "core=4\nall_threads=1,2,4\nlook_pool=1.0,10.0\ndata_type=N,C\n\
         distribution=U,E\niterations=2\n",
    ).unwrap();
    let jobs = jobspec::generate(&cfg);
    let names: HashSet<String> = jobs.iter().map(|j| j.output_name()).collect();
    let m = run(cfg.cores, jobs, |j| j.repetition + 1);
    let ledger = m.launcher().ledger.borrow();
    assert_eq!(ledger.launched.len(), names.len());
    let launched: HashSet<String> = ledger.launched.iter().cloned().collect();
    assert_eq!(launched, names);
}

// === PROPERTIES ===

proptest! {
    #[test]
    fn never_over_budget_and_every_job_once(
        cores in 1u32..=8,
        classes in prop::collection::vec(1u32..=8, 1..24),
        polls in prop::collection::vec(0u32..4, 24),
    ) {
        let jobs: Vec<JobSpec> = classes.iter()
            .enumerate()
            .map(|(i, &t)| job(t, i as u32))
            .collect();
        let n = jobs.len();
        let m = run(cores, jobs, move |j| polls[j.repetition as usize]);

        let ledger = m.launcher().ledger.borrow();
        prop_assert!(!ledger.over_budget);
        prop_assert_eq!(ledger.cores_in_flight, 0);
        prop_assert_eq!(ledger.launched.len(), n);
        let unique: HashSet<&String> = ledger.launched.iter().collect();
        prop_assert_eq!(unique.len(), n);

        let budget = m.scheduler().budget();
        prop_assert_eq!(budget.available(), budget.total());

        // EVERY LAUNCH FIT THE CORES FREE JUST BEFORE IT
        let mut free = budget.total();
        for e in m.trace().iter() {
            match e.kind {
                EventKind::Launch => {
                    prop_assert!(e.threads <= free);
                    free -= e.threads;
                }
                EventKind::Reap => free += e.threads,
                EventKind::LaunchFailed => {}
            }
            prop_assert_eq!(free, e.available);
        }
    }

    #[test]
    fn fifo_within_each_class(
        classes in prop::collection::vec(1u32..=4, 1..16),
    ) {
        let jobs: Vec<JobSpec> = classes.iter()
            .enumerate()
            .map(|(i, &t)| job(t, i as u32))
            .collect();
        let m = run(4, jobs, |_| 1);
        let ledger = m.launcher().ledger.borrow();
        for t in 1u32..=4 {
            let expected: Vec<String> = classes.iter()
                .enumerate()
                .filter(|&(_, &c)| c == t)
                .map(|(i, _)| job(t, i as u32).output_name())
                .collect();
            let got: Vec<String> = ledger.launched.iter()
                .filter(|name| expected.contains(name))
                .cloned()
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
