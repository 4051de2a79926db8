// CORESWEEP GROUPING + AGGREGATION
// A RESULT LINE IS A COMMA-SEPARATED LIST OF KEY:VALUE TOKENS, E.G.
//
//   D:N,T:4,OPS:200000,PRUNE_PER:50000,PRUNE_T:0.9,P_DEQUEUE:0.49,
//   LK_AHD:1.0,SIZE:32768,B_WIDTH:1.0,CHECK:0,MALLOC_T:0.1,FREE_T:0.1,
//   0:50000,1:50000,...,R:1.93,U:7.12,S:0.31
//
// CATEGORICAL TOKENS FORM THE GROUP KEY, T PICKS THE BUCKET INSIDE THE
// GROUP, R/U/S/OPS FORM THE SAMPLE. S CLOSES THE LINE: KEY FINALIZED,
// SAMPLE COMMITTED. ONE .dat FILE PER GROUP, ONE ROW PER THREAD COUNT.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::jobspec::fmt_float;
use crate::results::{self, ErrorLog, ScanReport, AGGREGATED_NAME, ERROR_LOG_NAME};
use crate::stats::Moments;

pub const REPORT_HEADER: &str =
    "T, R_mean, R_stddev, US_mean, US_stddev, OPSR_mean, OPSR_stddev, OPSUS_mean, OPSUS_stddev";

// GROUP KEY TOKENS, IN KEY ORDER
const KEY_FIELDS: [&str; 9] = [
    "OPS",
    "PRUNE_PER",
    "PRUNE_T",
    "P_DEQUEUE",
    "MEAN_INTERARRIVAL_TIME",
    "PROB_DIST",
    "SIZE",
    "B_WIDTH",
    "EMPTY_QUEUE",
];

// PER-TOKEN FAILURE: THE TOKEN IS SKIPPED, THE LINE GOES ON
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("MALFORMED TOKEN {0:?}")]
    MalformedToken(String),
    #[error("REPEATED S TOKEN {0:?} AFTER COMMIT")]
    RepeatedCommit(String),
}

// WHOLE-LINE FAILURE: NOTHING FROM THE LINE IS COMMITTED
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("BAD VALUE FOR {key}: {value:?}")]
    BadValue { key: String, value: String },
    #[error("CHECK:{0} WITHOUT EMPTY_QUEUE")]
    InconsistentCheck(String),
    #[error("S BEFORE ANY D TOKEN")]
    MissingDistribution,
    #[error("S BEFORE ANY T TOKEN")]
    MissingThreads,
    #[error("NO S TOKEN")]
    Uncommitted,
}

// THE CONCATENATED LABEL IS THE IDENTITY: EQUAL LABELS, SAME GROUP
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    label: String,
}

impl GroupKey {
    // EVERY PRESENT FIELD FOLLOWED BY '-', THEN THE DISTRIBUTION TAG
    fn build(fields: &[Option<String>; 9], distribution: &str) -> Self {
        let mut label = String::new();
        for v in fields.iter().flatten() {
            label.push_str(v);
            label.push('-');
        }
        label.push_str(distribution);
        Self { label }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    // LOSSY: DISTINCT LABELS CAN SHARE A FILE NAME
    pub fn file_name(&self) -> String {
        format!("{}.dat", self.label.replace(['.', '/'], "_"))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub r: f64,
    pub u: f64,
    pub s: f64,
    pub ops: u64,
}

impl Sample {
    pub fn cpu(&self) -> f64 {
        self.u + self.s
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Committed {
    pub key: GroupKey,
    pub threads: u32,
    pub sample: Sample,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineReport {
    pub committed: Committed,
    pub token_errors: Vec<ParseError>,
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, LineError> {
    value.parse::<T>().map_err(|_| LineError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

pub fn parse_line(line: &str) -> Result<LineReport, LineError> {
    let mut fields: [Option<String>; 9] = Default::default();
    let mut distribution: Option<String> = None;
    let mut threads: Option<u32> = None;
    let mut empty_queue: i64 = 0;
    let mut ops: u64 = 0;
    let mut r = 0.0;
    let mut u = 0.0;
    let mut committed: Option<Committed> = None;
    let mut token_errors = Vec::new();

    for token in line.trim().split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let mut parts = token.split(':');
        let (key, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(v), None) => (k, v),
            _ => {
                token_errors.push(ParseError::MalformedToken(token.to_string()));
                continue;
            }
        };

        if let Some(idx) = KEY_FIELDS.iter().position(|k| *k == key) {
            match key {
                "OPS" => ops = number(key, value)?,
                "EMPTY_QUEUE" => empty_queue = number(key, value)?,
                _ => {}
            }
            fields[idx] = Some(value.to_string());
            continue;
        }

        match key {
            "T" => threads = Some(number(key, value)?),
            "D" => distribution = Some(value.to_string()),
            "R" => r = number(key, value)?,
            "U" => u = number(key, value)?,
            "CHECK" => {
                if value != "0" && empty_queue == 0 {
                    return Err(LineError::InconsistentCheck(value.to_string()));
                }
            }
            "S" => {
                if committed.is_some() {
                    token_errors.push(ParseError::RepeatedCommit(token.to_string()));
                    continue;
                }
                let s: f64 = number(key, value)?;
                let distribution = distribution.clone().ok_or(LineError::MissingDistribution)?;
                let threads = threads.ok_or(LineError::MissingThreads)?;
                committed = Some(Committed {
                    key: GroupKey::build(&fields, &distribution),
                    threads,
                    sample: Sample { r, u, s, ops },
                });
            }
            // MALLOC_T, FREE_T, LK_AHD, PER-THREAD COUNTERS
            _ => {}
        }
    }

    let committed = committed.ok_or(LineError::Uncommitted)?;
    Ok(LineReport {
        committed,
        token_errors,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateRow {
    pub threads: u32,
    pub count: usize,
    // SAMPLES WITH R > (U+S)/T. KEPT IN EVERY SERIES.
    pub suspicious: usize,
    pub r: Moments,
    pub us: Moments,
    pub ops_r: Moments,
    pub ops_us: Moments,
}

impl AggregateRow {
    // group ONLY LABELS THE WARNINGS
    pub fn compute(group: &str, threads: u32, samples: &[Sample]) -> Self {
        let mut r = Vec::with_capacity(samples.len());
        let mut us = Vec::with_capacity(samples.len());
        let mut ops_r = Vec::with_capacity(samples.len());
        let mut ops_us = Vec::with_capacity(samples.len());
        let mut suspicious = 0;

        for smp in samples {
            let cpu = smp.cpu();
            // WALL TIME SHOULD NOT EXCEED PER-THREAD CPU TIME. FLAG ONLY.
            if threads > 0 && smp.r > cpu / threads as f64 {
                log_warn!(
                    "SUSPICIOUS SAMPLE IN {} T={}: R:{} U+S:{}",
                    group, threads, smp.r, cpu
                );
                suspicious += 1;
            }
            r.push(smp.r);
            us.push(cpu);
            // A ZERO DENOMINATOR DROPS THE SAMPLE FROM THAT ONE SERIES
            if smp.r != 0.0 {
                ops_r.push(smp.ops as f64 / smp.r);
            } else {
                log_warn!("R=0 IN {} T={}: EXCLUDED FROM OPS/R", group, threads);
            }
            if cpu != 0.0 {
                ops_us.push(smp.ops as f64 / cpu);
            } else {
                log_warn!("U+S=0 IN {} T={}: EXCLUDED FROM OPS/(U+S)", group, threads);
            }
        }

        let row = Self {
            threads,
            count: samples.len(),
            suspicious,
            r: Moments::of(&r),
            us: Moments::of(&us),
            ops_r: Moments::of(&ops_r),
            ops_us: Moments::of(&ops_us),
        };
        if row.ops_r.is_empty() || row.ops_us.is_empty() {
            log_warn!("{} T={}: THROUGHPUT SERIES WITHOUT VALID SAMPLES (nan)", group, threads);
        }
        row
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}, {}, {}, {}",
            self.threads,
            fmt_stat(self.r.mean), fmt_stat(self.r.stddev),
            fmt_stat(self.us.mean), fmt_stat(self.us.stddev),
            fmt_stat(self.ops_r.mean), fmt_stat(self.ops_r.stddev),
            fmt_stat(self.ops_us.mean), fmt_stat(self.ops_us.stddev),
        )
    }
}

fn fmt_stat(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        fmt_float(v)
    }
}

#[derive(Default)]
pub struct Aggregator {
    groups: BTreeMap<GroupKey, BTreeMap<u32, Vec<Sample>>>,
    committed: usize,
    rejected: usize,
    token_errors: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&mut self, c: Committed) {
        self.groups
            .entry(c.key)
            .or_default()
            .entry(c.threads)
            .or_default()
            .push(c.sample);
        self.committed += 1;
    }

    // PARSE ONE WELL-FORMED OUTPUT LINE. TRUE IF A SAMPLE WAS COMMITTED.
    pub fn ingest<W: Write>(&mut self, line: &str, errors: &mut ErrorLog<W>) -> Result<bool> {
        match parse_line(line) {
            Ok(report) => {
                for e in &report.token_errors {
                    errors.rejected_line(e, line)?;
                }
                self.token_errors += report.token_errors.len();
                self.commit(report.committed);
                Ok(true)
            }
            Err(e) => {
                log_debug!("REJECTED LINE ({}): {}", e, line);
                errors.rejected_line(&e, line)?;
                self.rejected += 1;
                Ok(false)
            }
        }
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn token_errors(&self) -> usize {
        self.token_errors
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    pub fn samples(&self, key: &GroupKey, threads: u32) -> Option<&[Sample]> {
        self.groups.get(key)?.get(&threads).map(Vec::as_slice)
    }

    // ROWS ASCENDING BY THREAD COUNT
    pub fn rows(&self, key: &GroupKey) -> Vec<AggregateRow> {
        match self.groups.get(key) {
            Some(buckets) => buckets
                .iter()
                .map(|(&t, samples)| AggregateRow::compute(key.label(), t, samples))
                .collect(),
            None => Vec::new(),
        }
    }

    // BUCKETS PER OUTPUT FILE. GROUPS WHOSE LABELS COLLAPSE TO THE SAME
    // FILE NAME ARE POOLED, SO NO FILE IS EVER WRITTEN TWICE.
    pub fn report_files(&self) -> BTreeMap<String, BTreeMap<u32, Vec<Sample>>> {
        let mut files: BTreeMap<String, BTreeMap<u32, Vec<Sample>>> = BTreeMap::new();
        let mut owners: BTreeMap<String, &GroupKey> = BTreeMap::new();
        for (key, buckets) in &self.groups {
            let name = key.file_name();
            match owners.entry(name.clone()) {
                Entry::Occupied(first) => log_warn!(
                    "GROUPS {} AND {} BOTH MAP TO {}: SAMPLES POOLED",
                    first.get(), key, name
                ),
                Entry::Vacant(slot) => {
                    slot.insert(key);
                }
            }
            let file = files.entry(name).or_default();
            for (&t, samples) in buckets {
                file.entry(t).or_default().extend_from_slice(samples);
            }
        }
        files
    }

    pub fn write_reports(&self, res_dir: &Path) -> Result<Vec<PathBuf>> {
        let files = self.report_files();
        let mut written = Vec::with_capacity(files.len());
        for (name, buckets) in &files {
            let path = res_dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("CREATING {}", path.display()))?;
            let mut out = BufWriter::new(file);
            writeln!(out, "{}", REPORT_HEADER)?;
            for (&t, samples) in buckets {
                writeln!(out, "{}", AggregateRow::compute(name, t, samples).to_line())?;
            }
            out.flush()?;
            println!("{}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub scan: ScanReport,
    pub committed: usize,
    pub rejected: usize,
    pub token_errors: usize,
    pub error_entries: usize,
    pub reports: Vec<PathBuf>,
}

// SCAN tmp_dir, WRITE res_dir/{aggregated,error_log,<group>.dat}
pub fn process(tmp_dir: &Path, res_dir: &Path, variants: &[String]) -> Result<ProcessReport> {
    std::fs::create_dir_all(res_dir)
        .with_context(|| format!("CREATING {}", res_dir.display()))?;

    let agg_path = res_dir.join(AGGREGATED_NAME);
    let mut aggregated = BufWriter::new(
        File::create(&agg_path).with_context(|| format!("CREATING {}", agg_path.display()))?,
    );
    let mut errors = ErrorLog::create(&res_dir.join(ERROR_LOG_NAME))?;

    let (lines, scan) = results::collect(tmp_dir, variants, &mut aggregated, &mut errors)?;
    aggregated.flush()?;

    let mut agg = Aggregator::new();
    for line in &lines {
        agg.ingest(line, &mut errors)?;
    }
    errors.flush()?;

    let reports = agg.write_reports(res_dir)?;
    let report = ProcessReport {
        scan,
        committed: agg.committed(),
        rejected: agg.rejected(),
        token_errors: agg.token_errors(),
        error_entries: errors.entries(),
        reports,
    };
    log_info!(
        "{} OUTPUTS ({} MALFORMED), {} SAMPLES IN {} GROUPS, {} LINES REJECTED, {} ERROR LOG ENTRIES",
        scan.well_formed + scan.malformed,
        scan.malformed,
        report.committed,
        report.reports.len(),
        report.rejected,
        report.error_entries
    );
    Ok(report)
}
