// CORESWEEP PROGRESS BOOKKEEPING
// PER (THREADS, LOOKAHEAD, VARIANT, DISTRIBUTION) COUNTERS:
//   REMAINING: NOT YET LAUNCHED
//   RUNNING:   LAUNCHED, EXIT NOT YET OBSERVED
//   RETURNED:  EXIT OBSERVED
// REDRAWN IN PLACE ON A TTY WHEN enable_log=1.

use std::collections::BTreeMap;
use std::io::Write;

use crate::jobspec::{fmt_float, JobSpec};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgressKey {
    pub threads: u32,
    pub lookahead: String,
    pub variant: String,
    pub distribution: String,
}

impl ProgressKey {
    pub fn of(job: &JobSpec) -> Self {
        Self {
            threads: job.threads,
            lookahead: fmt_float(job.lookahead),
            variant: job.variant.clone(),
            distribution: job.distribution.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub remaining: u32,
    pub running: u32,
    pub returned: u32,
}

pub struct Progress {
    counters: BTreeMap<ProgressKey, Counters>,
    total: usize,
    drawn_lines: usize,
    live: bool,
}

impl Progress {
    pub fn new(jobs: &[JobSpec], live: bool) -> Self {
        let mut counters: BTreeMap<ProgressKey, Counters> = BTreeMap::new();
        for job in jobs {
            counters.entry(ProgressKey::of(job)).or_default().remaining += 1;
        }
        Self {
            counters,
            total: jobs.len(),
            drawn_lines: 0,
            live,
        }
    }

    pub fn launched(&mut self, key: &ProgressKey) {
        if let Some(c) = self.counters.get_mut(key) {
            c.remaining = c.remaining.saturating_sub(1);
            c.running += 1;
        }
    }

    // SPAWN FAILED: THE JOB IS CONSUMED BUT NEVER RUNS
    pub fn failed(&mut self, key: &ProgressKey) {
        if let Some(c) = self.counters.get_mut(key) {
            c.remaining = c.remaining.saturating_sub(1);
            c.returned += 1;
        }
    }

    pub fn returned(&mut self, key: &ProgressKey) {
        if let Some(c) = self.counters.get_mut(key) {
            c.running = c.running.saturating_sub(1);
            c.returned += 1;
        }
    }

    // INTERRUPT: QUEUED JOBS WILL NEVER RUN
    pub fn abandon(&mut self) {
        for c in self.counters.values_mut() {
            c.remaining = 0;
        }
    }

    pub fn get(&self, key: &ProgressKey) -> Option<Counters> {
        self.counters.get(key).copied()
    }

    pub fn remaining(&self) -> u32 {
        self.counters.values().map(|c| c.remaining).sum()
    }

    pub fn running(&self) -> u32 {
        self.counters.values().map(|c| c.running).sum()
    }

    pub fn render(&self, cores_in_use: u32, total_cores: u32) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.counters.len() + 3);
        lines.push(format!(
            "JOBS LEFT: {}/{}  CORES IN USE: {}/{}",
            self.remaining(), self.total, cores_in_use, total_cores
        ));
        lines.push("-".repeat(72));
        lines.push(format!(
            "{:>7} {:>10} {:>8} {:>12} {:>9} {:>8} {:>9}",
            "THREADS", "LOOKAHEAD", "VARIANT", "DIST", "REMAINING", "RUNNING", "RETURNED"
        ));
        for (k, c) in &self.counters {
            lines.push(format!(
                "{:>7} {:>10} {:>8} {:>12} {:>9} {:>8} {:>9}",
                k.threads, k.lookahead, k.variant, k.distribution,
                c.remaining, c.running, c.returned
            ));
        }
        lines.push("-".repeat(72));
        lines
    }

    // REDRAW OVER THE PREVIOUS TABLE (ANSI: CURSOR UP + CLEAR LINE)
    pub fn draw(&mut self, cores_in_use: u32, total_cores: u32) {
        if !self.live {
            return;
        }
        let lines = self.render(cores_in_use, total_cores);
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for _ in 0..self.drawn_lines {
            let _ = write!(out, "\x1b[1A\x1b[K");
        }
        for line in &lines {
            let _ = writeln!(out, "{}\r", line);
        }
        let _ = out.flush();
        self.drawn_lines = lines.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn jobs() -> Vec<JobSpec> {
        crate::jobspec::generate(
            &Config::parse("all_threads=1,2\nlook_pool=1.0\ndata_type=N\niterations=2\n").unwrap(),
        )
    }

    #[test]
    fn counts_follow_lifecycle() {
        let jobs = jobs();
        let mut p = Progress::new(&jobs, false);
        let key = ProgressKey::of(&jobs[0]);
        assert_eq!(p.get(&key), Some(Counters { remaining: 2, running: 0, returned: 0 }));

        p.launched(&key);
        assert_eq!(p.get(&key), Some(Counters { remaining: 1, running: 1, returned: 0 }));
        assert_eq!(p.running(), 1);

        p.returned(&key);
        assert_eq!(p.get(&key), Some(Counters { remaining: 1, running: 0, returned: 1 }));

        p.failed(&key);
        assert_eq!(p.get(&key), Some(Counters { remaining: 0, running: 0, returned: 2 }));
        assert_eq!(p.remaining(), 2);
    }

    #[test]
    fn abandon_clears_remaining_only() {
        let jobs = jobs();
        let mut p = Progress::new(&jobs, false);
        let key = ProgressKey::of(&jobs[0]);
        p.launched(&key);
        p.abandon();
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.running(), 1);
        assert_eq!(p.get(&key), Some(Counters { remaining: 0, running: 1, returned: 0 }));
        assert!(p.render(2, 8)[0].contains("JOBS LEFT: 0/4"));
    }

    #[test]
    fn repetitions_share_a_key() {
        let jobs = jobs();
        assert_eq!(ProgressKey::of(&jobs[0]), ProgressKey::of(&jobs[2]));
        assert_ne!(ProgressKey::of(&jobs[0]), ProgressKey::of(&jobs[1]));
    }

    #[test]
    fn render_has_row_per_key() {
        let jobs = jobs();
        let p = Progress::new(&jobs, false);
        let lines = p.render(0, 8);
        assert!(lines[0].contains("JOBS LEFT: 4/4"));
        assert_eq!(lines.len(), 2 + 3 + 1);
    }
}
