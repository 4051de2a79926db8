// CORESWEEP LAUNCH TRACE
// RECORDS EVERY LAUNCH AND REAP WITH THE BUDGET STATE AFTER THE EVENT.
// PRE-ALLOCATED RING BUFFER. WRAPS AROUND AT CAPACITY -- OLDEST ENTRIES
// OVERWRITTEN.

const MAX_EVENTS: usize = 8192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Launch,
    Reap,
    LaunchFailed,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Launch => "LAUNCH",
            Self::Reap => "REAP",
            Self::LaunchFailed => "FAILED",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub ts_ns:     u64,
    pub kind:      EventKind,
    pub seq:       usize,
    pub threads:   u32,
    pub available: u32,
}

pub struct LaunchTrace {
    events: Vec<Event>,
    head:   usize,
    len:    usize,
}

impl Default for LaunchTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchTrace {
    pub fn new() -> Self {
        Self {
            events: vec![
                Event { ts_ns: 0, kind: EventKind::Launch, seq: 0, threads: 0, available: 0 };
                MAX_EVENTS
            ],
            head: 0,
            len: 0,
        }
    }

    // seq IS THE JOB'S LAUNCH ORDINAL, SO A REAP CAN BE MATCHED TO ITS LAUNCH
    pub fn record(&mut self, kind: EventKind, seq: usize, threads: u32, available: u32) {
        self.events[self.head] = Event {
            ts_ns: now_ns(),
            kind,
            seq,
            threads,
            available,
        };
        self.head = (self.head + 1) % MAX_EVENTS;
        if self.len < MAX_EVENTS {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // ITERATE EVENTS IN CHRONOLOGICAL ORDER
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let start = if self.len < MAX_EVENTS { 0 } else { self.head };
        (0..self.len).map(move |i| &self.events[(start + i) % MAX_EVENTS])
    }

    // THREAD CLASSES IN LAUNCH ORDER
    pub fn launch_order(&self) -> Vec<u32> {
        self.iter()
            .filter(|e| e.kind == EventKind::Launch)
            .map(|e| e.threads)
            .collect()
    }

    pub fn dump(&self) {
        let mut iter = self.iter();
        let first = match iter.next() {
            Some(e) => e,
            None => return,
        };
        let base_ts = first.ts_ns;

        println!("\n{:<10} {:<8} {:<6} {:<8} {:<10}",
            "TIME_S", "EVENT", "JOB", "THREADS", "FREE_CORES");
        println!("{}", "-".repeat(46));

        for e in std::iter::once(first).chain(iter) {
            let elapsed_s = (e.ts_ns - base_ts) as f64 / 1_000_000_000.0;
            println!("{:<10.1} {:<8} {:<6} {:<8} {:<10}",
                elapsed_s, e.kind.label(), e.seq, e.threads, e.available);
        }

        if self.len == MAX_EVENTS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} EVENTS)", MAX_EVENTS);
        }
        println!("TOTAL EVENTS: {}", self.len);
    }

    pub fn summary(&self, total_cores: u32) {
        if self.len < 2 {
            return;
        }

        let events: Vec<&Event> = self.iter().collect();
        let launches = events.iter().filter(|e| e.kind == EventKind::Launch).count();
        let failures = events.iter().filter(|e| e.kind == EventKind::LaunchFailed).count();
        let peak_used = events.iter()
            .map(|e| total_cores.saturating_sub(e.available))
            .max()
            .unwrap_or(0);

        // CORE-SECONDS COMMITTED: INTEGRATE IN-USE CORES BETWEEN EVENTS
        let mut core_ns: u128 = 0;
        for pair in events.windows(2) {
            let used = total_cores.saturating_sub(pair[0].available) as u128;
            core_ns += used * (pair[1].ts_ns - pair[0].ts_ns) as u128;
        }

        let elapsed_ns = events[events.len() - 1].ts_ns - events[0].ts_ns;
        let elapsed_s = elapsed_ns as f64 / 1_000_000_000.0;

        println!("\n{}", "=".repeat(50));
        println!("CORESWEEP SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  JOBS LAUNCHED:     {}", launches);
        println!("  LAUNCH FAILURES:   {}", failures);
        println!("  PEAK CORES IN USE: {}/{}", peak_used, total_cores);
        if elapsed_s > 0.0 && total_cores > 0 {
            let util = core_ns as f64 / (elapsed_ns as f64 * total_cores as f64) * 100.0;
            println!("  CORE UTILIZATION:  {:.1}%", util);
        }
        println!("  ELAPSED:           {:.1}s", elapsed_s);
    }
}

fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}
