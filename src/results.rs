// CORESWEEP RESULT PARSER
// A WELL-BEHAVED WORKER PRINTS EXACTLY ONE SUMMARY LINE. ANYTHING ELSE
// (NOTHING, A CRASH TRACE, INTERLEAVED DEBUG OUTPUT) MEANS THE RUN DIED OR
// MISBEHAVED: THE WHOLE OUTPUT GOES TO THE ERROR LOG, NEVER TO STATISTICS.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

pub const AGGREGATED_NAME: &str = "aggregated";
pub const ERROR_LOG_NAME: &str = "error_log";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Line(String),
    Malformed(String),
}

// LINES ARE STRIPPED AND SPACE-JOINED FOR THE LOGS
pub fn classify(content: &str) -> Output {
    let lines: Vec<&str> = content.lines().map(str::trim).collect();
    if lines.len() == 1 {
        Output::Line(lines[0].to_string())
    } else {
        Output::Malformed(lines.join(" "))
    }
}

pub struct ErrorLog<W: Write> {
    out: W,
    entries: usize,
}

impl ErrorLog<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("CREATING ERROR LOG {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ErrorLog<W> {
    pub fn new(out: W) -> Self {
        Self { out, entries: 0 }
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    // RAW CONTENT OF A JOB WHOSE OUTPUT WAS NOT EXACTLY ONE LINE
    pub fn malformed_output(&mut self, raw: &str) -> Result<()> {
        writeln!(self.out, "{} ", raw)?;
        self.entries += 1;
        Ok(())
    }

    pub fn rejected_line(&mut self, reason: &dyn std::fmt::Display, line: &str) -> Result<()> {
        writeln!(self.out, "{}: {}", reason, line)?;
        self.entries += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub well_formed: usize,
    pub malformed: usize,
    pub skipped: usize,
}

// A JOB OUTPUT FILE STARTS WITH ITS STRUCTURE VARIANT ("N-...", "C-...")
fn is_job_output(name: &str, variants: &[String]) -> bool {
    if name == AGGREGATED_NAME || name == ERROR_LOG_NAME {
        return false;
    }
    match name.split('-').next() {
        Some(first) => variants.iter().any(|v| v == first),
        None => false,
    }
}

// SCAN tmp_dir IN NAME ORDER. WELL-FORMED LINES ARE WRITTEN TO aggregated
// AND RETURNED; THE REST GO TO errors.
pub fn collect<A: Write, E: Write>(
    tmp_dir: &Path,
    variants: &[String],
    aggregated: &mut A,
    errors: &mut ErrorLog<E>,
) -> Result<(Vec<String>, ScanReport)> {
    let mut entries: Vec<_> = std::fs::read_dir(tmp_dir)
        .with_context(|| format!("READING {}", tmp_dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut report = ScanReport::default();
    let mut lines = Vec::new();

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type()?.is_file() || !is_job_output(&name, variants) {
            log_debug!("SKIPPING {}", name);
            report.skipped += 1;
            continue;
        }
        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("READING {}", entry.path().display()))?;
        let content = String::from_utf8_lossy(&bytes);

        match classify(&content) {
            Output::Line(line) => {
                writeln!(aggregated, "{} ", line)?;
                lines.push(line);
                report.well_formed += 1;
            }
            Output::Malformed(raw) => {
                log_warn!("MALFORMED OUTPUT IN {}", name);
                errors.malformed_output(&raw)?;
                report.malformed += 1;
            }
        }
    }

    Ok((lines, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_is_well_formed() {
        assert_eq!(classify("T:1,R:2\n"), Output::Line("T:1,R:2".into()));
        assert_eq!(classify("  T:1,R:2  "), Output::Line("T:1,R:2".into()));
    }

    #[test]
    fn zero_or_many_lines_malformed() {
        assert_eq!(classify(""), Output::Malformed(String::new()));
        assert_eq!(
            classify("Segmentation fault\nR:1.0,U:0.1,S:0.0\n"),
            Output::Malformed("Segmentation fault R:1.0,U:0.1,S:0.0".into())
        );
    }

    #[test]
    fn job_output_filter() {
        let v = vec!["N".to_string(), "C".to_string()];
        assert!(is_job_output("N-10-2-0", &v));
        assert!(is_job_output("C", &v));
        assert!(!is_job_output("L-10-2-0", &v));
        assert!(!is_job_output("aggregated", &v));
        assert!(!is_job_output("Nope-1", &v));
    }

    #[test]
    fn collect_routes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("N-1-0"), "D:N,T:1,S:0.1\n").unwrap();
        std::fs::write(dir.path().join("N-2-0"), "crash\ncore dumped\n").unwrap();
        std::fs::write(dir.path().join("N-3-0"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::create_dir(dir.path().join("N-sub")).unwrap();

        let variants = vec!["N".to_string()];
        let mut agg = Vec::new();
        let mut errors = ErrorLog::new(Vec::new());
        let (lines, report) = collect(dir.path(), &variants, &mut agg, &mut errors).unwrap();

        assert_eq!(lines, vec!["D:N,T:1,S:0.1"]);
        assert_eq!(report, ScanReport { well_formed: 1, malformed: 2, skipped: 2 });
        assert_eq!(String::from_utf8(agg).unwrap(), "D:N,T:1,S:0.1 \n");
        assert_eq!(errors.entries(), 2);
        let err_text = String::from_utf8(errors.into_inner()).unwrap();
        assert_eq!(err_text, "crash core dumped \n \n");
    }
}
