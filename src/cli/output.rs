use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use trellis_cli::{RunReport, TestStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Print `value` as JSON/YAML, or hand it to `human` for the plain format.
pub fn emit<T, F>(value: &T, format: OutputFormat, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Human => human(value),
    }
    Ok(())
}

pub fn print_report(report: &RunReport) {
    for suite in &report.suites {
        println!("{}", suite.name);
        for test in &suite.tests {
            let mark = match test.status {
                TestStatus::Passed => "✓",
                TestStatus::Failed => "✗",
                TestStatus::Skipped => "-",
            };
            println!("  {} {} ({} ms)", mark, test.name, test.duration_ms);
            if let Some(failure) = &test.failure {
                match (&failure.command, failure.command_index) {
                    (Some(command), Some(index)) => {
                        println!("      command #{} `{}`", index, command)
                    }
                    _ => println!("      test setup"),
                }
                println!("      {}", failure.error);
            }
        }
    }
    println!();
    println!(
        "{} passing, {} failing, {} skipped ({} ms)",
        report.totals.passed, report.totals.failed, report.totals.skipped, report.duration_ms
    );
    println!(
        "commands: {} completed, {} failed, {} discarded; retry polls: {}",
        report.metrics.queue.completed,
        report.metrics.queue.failed,
        report.metrics.queue.discarded,
        report.metrics.retry.polls
    );
}
