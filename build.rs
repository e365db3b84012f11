//! Build script for lamco-selection-sync
//!
//! Sets compile-time environment variables for the startup banner.

use std::process::Command;

fn main() {
    println!("cargo:rustc-env=BUILD_DATE={}", capture("date", &["+%Y-%m-%d"], "unknown"));
    println!("cargo:rustc-env=BUILD_TIME={}", capture("date", &["+%H:%M:%S"], ""));
    println!(
        "cargo:rustc-env=GIT_HASH={}",
        capture("git", &["rev-parse", "--short", "HEAD"], "unknown")
    );

    // Re-run if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
}

/// Trimmed stdout of a command, or `fallback` if it fails or prints nothing
fn capture(program: &str, args: &[&str], fallback: &str) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
