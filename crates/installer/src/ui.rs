//! Console output for bring-up and teardown.
//!
//! Diagnostics go through `tracing`; this module only prints what the
//! operator follows: phase markers, tool checks, outcomes, and the final
//! banner of each workflow.

use std::fmt::Display;
use std::path::Path;

use colored::{ColoredString, Colorize};

use crate::state::Phase;

const RULE_WIDTH: usize = 70;

fn status(symbol: ColoredString, message: impl Display) {
    println!("{symbol} {message}");
}

fn banner(title: &str, color: fn(&str) -> ColoredString) {
    let rule = "═".repeat(RULE_WIDTH);
    println!();
    println!("{}", rule.bright_black());
    println!("{}", color(title).bold());
    println!("{}", rule.bright_black());
    println!();
}

/// Lines of the fatal-exit report: what failed, its kind, and the hint.
pub fn failure_report<P: Phase>(
    workflow: &str,
    phase: P,
    kind: &str,
    err: &anyhow::Error,
) -> Vec<String> {
    let mut lines = vec![format!("{workflow} failed at '{phase}' [{kind}]: {err:#}")];
    if !phase.hint().is_empty() {
        lines.push(phase.hint().to_string());
    }
    lines
}

/// Header printed when a workflow starts.
pub fn print_workflow_start(title: &str, workdir: &Path) {
    banner(title, |s| s.cyan());
    print_detail("Working directory", &workdir.display().to_string());
}

/// Progress marker for the phase about to run.
pub fn print_phase<P: Phase>(phase: P) {
    println!();
    println!(
        "{} {} {}",
        format!("[{}/{}]", phase.position(), P::TOTAL).bright_black(),
        "▶".cyan(),
        phase.to_string().bold()
    );
}

/// Fatal-exit report; the hint is the manual-recovery step.
pub fn print_failure<P: Phase>(workflow: &str, phase: P, kind: &str, err: &anyhow::Error) {
    let mut lines = failure_report(workflow, phase, kind, err).into_iter();
    if let Some(headline) = lines.next() {
        eprintln!("{} {}", "✗".red().bold(), headline.red());
    }
    for hint in lines {
        eprintln!("{} {}", "ℹ".blue().bold(), hint.yellow());
    }
}

pub fn print_tunnel_established(proxy_url: &str) {
    print_success(&format!("SOCKS5 tunnel established on {proxy_url}"));
}

pub fn print_setup_complete() {
    banner("CLUSTER SETUP COMPLETE", |s| s.green());
}

pub fn print_teardown_complete() {
    banner("CLUSTER TEARDOWN COMPLETE", |s| s.green());
}

/// Prerequisite line: where the tool was found, or that it is missing.
pub fn print_tool_check(name: &str, location: Option<&Path>) {
    match location {
        Some(path) => println!("  {} {name} - {}", "✓".green(), path.display().to_string().bright_black()),
        None => println!("  {} {name}", "✗".red()),
    }
}

pub fn print_success(message: &str) {
    status("✓".green().bold(), message.green());
}

pub fn print_warning(message: &str) {
    status("⚠".yellow().bold(), message.yellow());
}

pub fn print_info(message: &str) {
    status("ℹ".blue().bold(), message);
}

/// Sub-step inside a phase.
pub fn print_progress(message: &str) {
    status("  →".cyan(), message);
}

pub fn print_detail(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}
