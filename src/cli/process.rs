use anyhow::Result;

use coresweep::aggregate;
use coresweep::config::Config;

pub fn run_process(cfg: &Config) -> Result<()> {
    let report = aggregate::process(&cfg.tmp_dir, &cfg.res_dir, &cfg.data_types)?;

    println!("\n{}", "=".repeat(50));
    println!("CORESWEEP RESULTS");
    println!("{}", "=".repeat(50));
    println!("  WELL-FORMED OUTPUTS: {}", report.scan.well_formed);
    println!("  MALFORMED OUTPUTS:   {}", report.scan.malformed);
    println!("  SAMPLES COMMITTED:   {}", report.committed);
    println!("  LINES REJECTED:      {}", report.rejected);
    println!("  BAD TOKENS:          {}", report.token_errors);
    println!("  GROUP REPORTS:       {}", report.reports.len());
    println!("  ERROR LOG ENTRIES:   {}", report.error_entries);
    Ok(())
}
