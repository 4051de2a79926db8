use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use anyhow::Result;

use coresweep::config::Config;

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// PATHS WITH A SLASH ARE CHECKED DIRECTLY, BARE NAMES VIA $PATH
fn check_executable(path: &Path) -> bool {
    if path.components().count() == 1 && !path.has_root() {
        return check_tool(&path.to_string_lossy());
    }
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn check_dir(path: &Path) -> bool {
    if std::fs::create_dir_all(path).is_err() {
        return false;
    }
    let probe = path.join(".coresweep-probe");
    let ok = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

fn online_cpus() -> u32 {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 { 1 } else { n as u32 }
}

pub fn run_check(cfg: &Config) -> Result<()> {
    println!("CORESWEEP DEPENDENCY CHECK");
    println!();

    let mut ok = true;

    if let Some(timer) = cfg.timer.first() {
        if check_tool(timer) {
            println!("  {:<24}OK", timer);
        } else {
            println!("  {:<24}MISSING", timer);
            ok = false;
        }
    } else {
        println!("  {:<24}DISABLED", "timer");
    }

    let worker = cfg.worker.display().to_string();
    if check_executable(&cfg.worker) {
        println!("  {:<24}OK", worker);
    } else {
        println!("  {:<24}MISSING OR NOT EXECUTABLE", worker);
        ok = false;
    }
    println!();

    println!("DIRECTORIES:");
    for dir in [&cfg.tmp_dir, &cfg.res_dir] {
        let label = dir.display().to_string();
        if check_dir(dir) {
            println!("  {:<24}WRITABLE", label);
        } else {
            println!("  {:<24}NOT WRITABLE", label);
            ok = false;
        }
    }
    println!();

    println!("CORE BUDGET:");
    let online = online_cpus();
    println!("  CONFIGURED            {}", cfg.cores);
    println!("  ONLINE                {}", online);
    println!("  WIDEST CLASS          {}", cfg.max_threads());
    if cfg.cores > online {
        println!("  BUDGET EXCEEDS ONLINE CPUS -- RESULTS WILL BE SKEWED BY TIME-SHARING");
    }
    if cfg.max_threads() > cfg.cores {
        println!("  WIDEST CLASS EXCEEDS BUDGET -- BUDGET WILL BE RAISED TO {}", cfg.max_threads());
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        std::process::exit(1);
    }

    Ok(())
}
