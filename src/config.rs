// CORESWEEP CONFIGURATION
// LINE-ORIENTED key=value FILE, '#' STARTS A COMMENT.
// EVERY VALUE IS VALIDATED AT LOAD TIME: A BAD THREAD CLASS NEVER REACHES
// THE SCHEDULER (IT WOULD STALL THE DISPATCH LOOP FOREVER).

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;

// THREAD CLASSES MUST SATISFY 0 < t < MAX_THREAD_CLASS
pub const MAX_THREAD_CLASS: u32 = 128;

// DEFAULTS MIRROR THE REFERENCE EXPERIMENT
const DEFAULT_CORES: u32           = 8;
const DEFAULT_THREADS: [u32; 1]    = [32];
const DEFAULT_OPS: u64             = 50_000;
const DEFAULT_ITERATIONS: u32      = 1;
const DEFAULT_PRUNE_PERIOD: u64    = 50_000;
const DEFAULT_INIT_SIZE: u64       = 32_768;
const DEFAULT_PROB_ROLL: f64       = 0.0;
const DEFAULT_PROB_DEQUEUE: f64    = 0.49;
const DEFAULT_PRUNE_TRESH: f64     = 0.9;
const DEFAULT_WIDTH: f64           = 1.0;
const DEFAULT_LOOK_POOL: [f64; 2]  = [1.0, 10.0];
const DEFAULT_DATA_TYPES: [&str; 2] = ["C", "N"];
const DEFAULT_DISTRIBUTIONS: [&str; 1] = ["0"];
const DEFAULT_WORKER: &str         = "../Debug/NBPQueue";
const DEFAULT_TIMER: &str          = "time -f R:%e,U:%U,S:%S";
const DEFAULT_TMP_DIR: &str        = "tmp";
const DEFAULT_RES_DIR: &str        = "res";
const DEFAULT_POLL_MS: u64         = 1_000;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub cores: u32,
    pub all_threads: Vec<u32>,
    pub ops: u64,
    pub iterations: u32,
    pub verbose: u32,
    pub log: u32,
    pub prune_period: u64,
    pub init_size: u64,
    pub collaborative: u32,
    pub safety: u32,
    pub empty_queue: u32,
    pub prob_roll: f64,
    pub prune_threshold: f64,
    pub bucket_width: f64,
    pub prob_dequeue: f64,
    pub look_pool: Vec<f64>,
    pub data_types: Vec<String>,
    pub distributions: Vec<String>,
    pub enable_log: bool,
    pub worker: PathBuf,
    pub timer: Vec<String>,
    pub tmp_dir: PathBuf,
    pub res_dir: PathBuf,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cores: DEFAULT_CORES,
            all_threads: DEFAULT_THREADS.to_vec(),
            ops: DEFAULT_OPS,
            iterations: DEFAULT_ITERATIONS,
            verbose: 0,
            log: 0,
            prune_period: DEFAULT_PRUNE_PERIOD,
            init_size: DEFAULT_INIT_SIZE,
            collaborative: 0,
            safety: 0,
            empty_queue: 0,
            prob_roll: DEFAULT_PROB_ROLL,
            prune_threshold: DEFAULT_PRUNE_TRESH,
            bucket_width: DEFAULT_WIDTH,
            prob_dequeue: DEFAULT_PROB_DEQUEUE,
            look_pool: DEFAULT_LOOK_POOL.to_vec(),
            data_types: DEFAULT_DATA_TYPES.iter().map(|s| s.to_string()).collect(),
            distributions: DEFAULT_DISTRIBUTIONS.iter().map(|s| s.to_string()).collect(),
            enable_log: false,
            worker: PathBuf::from(DEFAULT_WORKER),
            timer: split_command(DEFAULT_TIMER),
            tmp_dir: PathBuf::from(DEFAULT_TMP_DIR),
            res_dir: PathBuf::from(DEFAULT_RES_DIR),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }
}

impl Config {
    // MISSING PATH MEANS "DEFAULTS ONLY"
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("READING CONFIG {}", p.display()))?;
                Self::parse(&text).with_context(|| format!("IN CONFIG {}", p.display()))?
            }
            None => Self::default(),
        };
        Ok(cfg)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let line_re = Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$")?;
        let mut cfg = Self::default();

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            if line.trim().is_empty() {
                continue;
            }
            let caps = match line_re.captures(line) {
                Some(c) => c,
                None => bail!("LINE {}: EXPECTED key=value, GOT {:?}", lineno, raw.trim()),
            };
            let key = &caps[1];
            let value = &caps[2];
            cfg.apply(key, value)
                .with_context(|| format!("LINE {}: BAD VALUE FOR {}", lineno, key))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "core" => self.cores = scalar(value)?,
            "all_threads" => self.all_threads = list(value)?,
            "ops" => self.ops = scalar(value)?,
            "iterations" => self.iterations = scalar(value)?,
            "verbose" => self.verbose = scalar(value)?,
            "log" => self.log = scalar(value)?,
            "prune_period" => self.prune_period = scalar(value)?,
            "init_size" => self.init_size = scalar(value)?,
            "collaborative" => self.collaborative = scalar(value)?,
            "safety" => self.safety = scalar(value)?,
            "empty_queue" => self.empty_queue = scalar(value)?,
            "prob_roll" => self.prob_roll = scalar(value)?,
            "prune_tresh" => self.prune_threshold = scalar(value)?,
            "width" => self.bucket_width = scalar(value)?,
            "prob_dequeue" => self.prob_dequeue = scalar(value)?,
            "look_pool" => self.look_pool = list(value)?,
            "data_type" => self.data_types = list(value)?,
            "distribution" => self.distributions = list(value)?,
            "enable_log" => self.enable_log = value == "1",
            "worker" => self.worker = PathBuf::from(value),
            "timer" => self.timer = split_command(value),
            "tmp_dir" => self.tmp_dir = PathBuf::from(value),
            "res_dir" => self.res_dir = PathBuf::from(value),
            "poll_interval_ms" => self.poll_interval = Duration::from_millis(scalar(value)?),
            _ => log_warn!("UNKNOWN CONFIG KEY {:?} (IGNORED)", key),
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.cores == 0 {
            bail!("core MUST BE AT LEAST 1");
        }
        if self.iterations == 0 {
            bail!("iterations MUST BE AT LEAST 1");
        }
        if self.all_threads.is_empty() {
            bail!("all_threads IS EMPTY");
        }
        for &t in &self.all_threads {
            if t == 0 || t >= MAX_THREAD_CLASS {
                bail!("THREAD CLASS {} OUTSIDE 1..{}", t, MAX_THREAD_CLASS);
            }
        }
        // WORKERS GET ops SCALED BY THE WIDEST CLASS
        if self.ops.checked_mul(self.max_threads() as u64).is_none() {
            bail!(
                "ops ({}) TIMES WIDEST CLASS ({}) OVERFLOWS",
                self.ops, self.max_threads()
            );
        }
        if self.look_pool.is_empty() {
            bail!("look_pool IS EMPTY");
        }
        if self.data_types.is_empty() {
            bail!("data_type IS EMPTY");
        }
        if self.distributions.is_empty() {
            bail!("distribution IS EMPTY");
        }
        // DASH IS THE OUTPUT FILENAME SEPARATOR
        for name in self.data_types.iter().chain(self.distributions.iter()) {
            if name.is_empty() || name.contains('-') || name.contains('/') {
                bail!("LABEL {:?} MUST BE NON-EMPTY WITHOUT '-' OR '/'", name);
            }
        }
        if self.worker.as_os_str().is_empty() {
            bail!("worker IS EMPTY");
        }

        // DUPLICATE CLASSES WOULD WRITE THE SAME OUTPUT FILE TWICE
        let before = self.all_threads.len();
        let mut seen = Vec::with_capacity(before);
        self.all_threads.retain(|t| {
            if seen.contains(t) {
                false
            } else {
                seen.push(*t);
                true
            }
        });
        if self.all_threads.len() != before {
            log_warn!("DUPLICATE THREAD CLASSES DROPPED: {:?}", self.all_threads);
        }
        Ok(())
    }

    pub fn max_threads(&self) -> u32 {
        self.all_threads.iter().copied().max().unwrap_or(1)
    }

    // WORKERS RECEIVE ops SCALED BY THE WIDEST CLASS SO EVERY CLASS
    // PERFORMS THE SAME TOTAL WORK
    pub fn effective_ops(&self) -> u64 {
        self.ops.saturating_mul(self.max_threads() as u64)
    }
}

fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn scalar<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{:?}: {}", value, e))
}

fn list<T>(value: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(scalar)
        .collect()
}
