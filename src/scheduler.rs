// CORESWEEP CORE-BUDGET SCHEDULER
// GREEDY LARGEST-FITS-FIRST PACKING OF THREAD-COUNT CLASSES ONTO A FIXED
// CORE BUDGET. ONE DECISION PER CALL: PICK THE WIDEST CLASS THAT FITS THE
// FREE CORES, POP ITS HEAD JOB, CHARGE THE BUDGET.
//
// NOT OPTIMAL BIN PACKING. WORKER RUNTIMES DOMINATE, SO MAXIMAL UTILIZATION
// PER STEP IS WHAT MATTERS.

use std::collections::{BTreeMap, VecDeque};

use crate::jobspec::JobSpec;

// INVARIANT: 0 <= total - available <= total
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceBudget {
    total: u32,
    available: u32,
}

impl ResourceBudget {
    // A CLASS WIDER THAN THE MACHINE COULD NEVER FIT. RAISE THE BUDGET TO THE
    // WIDEST CLASS AND TIME-SHARE INSTEAD OF STALLING.
    pub fn new(cores: u32, widest: u32) -> Self {
        let total = if widest > cores {
            log_warn!(
                "MORE THREADS ({}) THAN CORES AVAILABLE ({}). USING TIME-SHARING!",
                widest, cores
            );
            widest
        } else {
            cores
        };
        Self { total, available: total }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn in_use(&self) -> u32 {
        self.total - self.available
    }

    pub fn is_idle(&self) -> bool {
        self.available == self.total
    }

    fn acquire(&mut self, cores: u32) {
        self.available = self.available.saturating_sub(cores);
    }

    fn release(&mut self, cores: u32) {
        self.available = (self.available + cores).min(self.total);
    }
}

pub struct Scheduler {
    budget: ResourceBudget,
    classes: BTreeMap<u32, VecDeque<JobSpec>>,
    pending: usize,
}

impl Scheduler {
    pub fn new(cores: u32, jobs: Vec<JobSpec>) -> Self {
        let mut classes: BTreeMap<u32, VecDeque<JobSpec>> = BTreeMap::new();
        let pending = jobs.len();
        for job in jobs {
            classes.entry(job.threads).or_default().push_back(job);
        }
        let widest = classes.keys().next_back().copied().unwrap_or(0);
        Self {
            budget: ResourceBudget::new(cores, widest),
            classes,
            pending,
        }
    }

    pub fn budget(&self) -> ResourceBudget {
        self.budget
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    // REMAINING CLASSES, NARROWEST FIRST
    pub fn classes(&self) -> Vec<u32> {
        self.classes.keys().copied().collect()
    }

    // WIDEST CLASS t WITH 0 < t <= available. None = STALL.
    pub fn select(&self) -> Option<u32> {
        let available = self.budget.available;
        self.classes
            .keys()
            .rev()
            .copied()
            .find(|&t| t > 0 && t <= available && t <= self.budget.total)
    }

    // ONE SCHEDULING DECISION. THE CALLER OWNS THE RETURNED JOB AND MUST
    // HAND ITS CORES BACK THROUGH complete().
    pub fn dispatch(&mut self) -> Option<JobSpec> {
        let t = self.select()?;
        let queue = self.classes.get_mut(&t)?;
        let job = queue.pop_front()?;
        if queue.is_empty() {
            // EMPTY CLASSES LEAVE CONSIDERATION FOR GOOD
            self.classes.remove(&t);
        }
        self.budget.acquire(t);
        self.pending -= 1;
        Some(job)
    }

    pub fn complete(&mut self, threads: u32) {
        self.budget.release(threads);
    }

    // DROP EVERY QUEUED JOB (INTERRUPT PATH). RETURNS HOW MANY WERE DROPPED.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.pending;
        self.classes.clear();
        self.pending = 0;
        dropped
    }

    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.budget.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn jobs(threads: &[u32]) -> Vec<JobSpec> {
        let base = crate::jobspec::generate(&Config::parse("all_threads=1\n").unwrap()).remove(0);
        threads
            .iter()
            .enumerate()
            .map(|(i, &t)| JobSpec { threads: t, repetition: i as u32, ..base.clone() })
            .collect()
    }

    #[test]
    fn widest_fit_first() {
        let mut s = Scheduler::new(8, jobs(&[1, 2, 4, 8]));
        assert_eq!(s.select(), Some(8));
        assert_eq!(s.dispatch().unwrap().threads, 8);
        assert_eq!(s.budget().available(), 0);
        assert_eq!(s.select(), None);
        assert!(s.dispatch().is_none());
        s.complete(8);
        assert_eq!(s.dispatch().unwrap().threads, 4);
        assert_eq!(s.dispatch().unwrap().threads, 2);
        assert_eq!(s.dispatch().unwrap().threads, 1);
        assert_eq!(s.budget().available(), 1);
        assert_eq!(s.pending(), 0);
        assert!(s.classes().is_empty());
    }

    #[test]
    fn fifo_within_class() {
        let mut s = Scheduler::new(2, jobs(&[2, 2, 2]));
        let mut order = Vec::new();
        while let Some(j) = s.dispatch() {
            order.push(j.repetition);
            s.complete(j.threads);
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert!(s.is_drained());
    }

    #[test]
    fn empty_class_removed() {
        let mut s = Scheduler::new(4, jobs(&[2, 1]));
        s.dispatch();
        assert_eq!(s.classes(), vec![1]);
    }

    #[test]
    fn oversubscription_raises_total() {
        let s = Scheduler::new(4, jobs(&[16, 2]));
        assert_eq!(s.budget().total(), 16);
        assert_eq!(s.select(), Some(16));
    }

    #[test]
    fn budget_release_clamped() {
        let mut b = ResourceBudget::new(4, 4);
        b.acquire(3);
        assert_eq!(b.in_use(), 3);
        b.release(10);
        assert_eq!(b.available(), 4);
        b.acquire(10);
        assert_eq!(b.available(), 0);
        assert_eq!(b.in_use(), 4);
    }

    #[test]
    fn abandon_clears_queue() {
        let mut s = Scheduler::new(1, jobs(&[1, 1, 1]));
        s.dispatch();
        assert_eq!(s.abandon(), 2);
        assert!(!s.is_drained());
        s.complete(1);
        assert!(s.is_drained());
    }
}
