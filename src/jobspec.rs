// CORESWEEP JOB PLAN
// EXPANDS THE EXPERIMENT CROSS-PRODUCT INTO JOB DESCRIPTORS.
// ORDER: REPETITION -> LOOKAHEAD -> VARIANT -> DISTRIBUTION -> THREADS.
// THE SCHEDULER PARTITIONS THEM BY THREAD COUNT; WITHIN A CLASS THIS ORDER
// IS THE LAUNCH ORDER.

use std::path::{Path, PathBuf};

use crate::config::Config;

#[derive(Clone, Debug, PartialEq)]
pub struct JobSpec {
    pub variant: String,
    pub ops: u64,
    pub threads: u32,
    pub prune_period: u64,
    pub prob_roll: f64,
    pub prob_dequeue: f64,
    pub lookahead: f64,
    pub distribution: String,
    pub init_size: u64,
    pub verbose: u32,
    pub log: u32,
    pub prune_threshold: f64,
    pub bucket_width: f64,
    pub collaborative: u32,
    pub safety: u32,
    pub empty_queue: u32,
    pub repetition: u32,
}

impl JobSpec {
    // WORKER ARGUMENT CONTRACT. THE REPETITION INDEX IS NOT PASSED.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.variant.clone(),
            self.ops.to_string(),
            self.threads.to_string(),
            self.prune_period.to_string(),
            fmt_float(self.prob_roll),
            fmt_float(self.prob_dequeue),
            fmt_float(self.lookahead),
            self.distribution.clone(),
            self.init_size.to_string(),
            self.verbose.to_string(),
            self.log.to_string(),
            fmt_float(self.prune_threshold),
            fmt_float(self.bucket_width),
            self.collaborative.to_string(),
            self.safety.to_string(),
            self.empty_queue.to_string(),
        ]
    }

    // DASH-JOINED ARGUMENTS PLUS REPETITION: UNIQUE PER JOB
    pub fn output_name(&self) -> String {
        let mut parts = self.args();
        parts.push(self.repetition.to_string());
        parts.join("-")
    }

    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.output_name())
    }
}

// SHORTEST ROUND-TRIP FORM, ALWAYS WITH A FRACTIONAL PART ("1.0", "0.49")
pub fn fmt_float(v: f64) -> String {
    format!("{:?}", v)
}

pub fn generate(cfg: &Config) -> Vec<JobSpec> {
    let ops = cfg.effective_ops();
    let mut jobs = Vec::with_capacity(
        cfg.iterations as usize
            * cfg.look_pool.len()
            * cfg.data_types.len()
            * cfg.distributions.len()
            * cfg.all_threads.len(),
    );

    for repetition in 0..cfg.iterations {
        for &lookahead in &cfg.look_pool {
            for variant in &cfg.data_types {
                for distribution in &cfg.distributions {
                    for &threads in &cfg.all_threads {
                        jobs.push(JobSpec {
                            variant: variant.clone(),
                            ops,
                            threads,
                            prune_period: cfg.prune_period,
                            prob_roll: cfg.prob_roll,
                            prob_dequeue: cfg.prob_dequeue,
                            lookahead,
                            distribution: distribution.clone(),
                            init_size: cfg.init_size,
                            verbose: cfg.verbose,
                            log: cfg.log,
                            prune_threshold: cfg.prune_threshold,
                            bucket_width: cfg.bucket_width,
                            collaborative: cfg.collaborative,
                            safety: cfg.safety,
                            empty_queue: cfg.empty_queue,
                            repetition,
                        });
                    }
                }
            }
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::parse(
            "all_threads=1,4\nlook_pool=1.0,10.0\ndata_type=N,C\n\
             distribution=U\niterations=3\nops=10\n",
        )
        .unwrap()
    }

    #[test]
    fn cross_product_size() {
        let jobs = generate(&cfg());
        assert_eq!(jobs.len(), 24);
        assert!(jobs.iter().all(|j| j.ops == 40));
    }

    #[test]
    fn output_names_unique() {
        let jobs = generate(&cfg());
        let mut names: Vec<String> = jobs.iter().map(|j| j.output_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), jobs.len());
    }

    #[test]
    fn argument_layout() {
        let jobs = generate(&cfg());
        let j = &jobs[0];
        assert_eq!(
            j.args(),
            vec![
                "N", "40", "1", "50000", "0.0", "0.49", "1.0", "U", "32768",
                "0", "0", "0.9", "1.0", "0", "0", "0",
            ]
        );
        assert_eq!(j.output_name(), "N-40-1-50000-0.0-0.49-1.0-U-32768-0-0-0.9-1.0-0-0-0-0");
    }

    #[test]
    fn repetition_is_outermost() {
        let jobs = generate(&cfg());
        let per_rep = jobs.len() / 3;
        assert!(jobs[..per_rep].iter().all(|j| j.repetition == 0));
        assert!(jobs[per_rep..].iter().all(|j| j.repetition > 0));
    }

    #[test]
    fn float_format() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(0.49), "0.49");
        assert_eq!(fmt_float(10.0), "10.0");
    }
}
