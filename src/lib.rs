// CORESWEEP LIBRARY
// PURE-RUST CORE: CONFIG, JOB PLAN, CORE-BUDGET SCHEDULER, PROCESS MONITOR,
// RESULT PARSER, GROUPING + STATISTICS.
// SHARED BETWEEN THE BINARY CRATE (main.rs, cli/) AND THE INTEGRATION TESTS.

#[macro_use]
pub mod log;

pub mod aggregate;
pub mod config;
pub mod jobspec;
pub mod launcher;
pub mod monitor;
pub mod progress;
pub mod results;
pub mod scheduler;
pub mod stats;
pub mod terminal;
pub mod trace;
