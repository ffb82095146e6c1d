//! Build script for the realtime client
//!
//! Embeds git revision, build time and target triple into the binary so
//! `realtime-client version` can report exactly what is running.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let git_dirty = match git(&["status", "--porcelain"]) {
        Some(status) if !status.is_empty() => "true",
        Some(_) => "false",
        None => "unknown",
    };

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let rustc_version = command_output("rustc", &["--version"]).unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=RTC_CLIENT_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=RTC_CLIENT_GIT_DIRTY={}", git_dirty);
    println!("cargo:rustc-env=RTC_CLIENT_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=RTC_CLIENT_TARGET={}", target);
    println!("cargo:rustc-env=RTC_CLIENT_PROFILE={}", profile);
    println!("cargo:rustc-env=RTC_CLIENT_RUSTC_VERSION={}", rustc_version);

    eprintln!("Building realtime client:");
    eprintln!("  Git:     {}{}", git_hash, if git_dirty == "true" { " (dirty)" } else { "" });
    eprintln!("  Target:  {}", target);
    eprintln!("  Profile: {}", profile);
}

fn git(args: &[&str]) -> Option<String> {
    command_output("git", args)
}

/// Trimmed stdout of a successful command
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
}
