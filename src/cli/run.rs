use std::sync::Arc;

use anyhow::{bail, Context, Result};
use app_sim::SimFactory;
use clap::Args;
use tracing::{info, warn};
use trellis_cli::{suites, Runner, TestFilter};

use super::context::CliContext;
use super::output::{emit, print_report};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Only run suites whose name contains this text
    #[arg(short, long)]
    pub suite: Option<String>,

    /// Only run tests whose full title contains this text
    #[arg(short, long)]
    pub grep: Option<String>,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    config.validate().context("refusing to run with invalid configuration")?;
    let factory = Arc::new(SimFactory::new(config.sim_config()));
    let runner = Runner::new(config.engine_config(), factory);

    let cancel = runner.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining tests");
            cancel.cancel();
        }
    });

    let filter = TestFilter {
        suite: args.suite,
        grep: args.grep,
    };
    let report = runner.run(&suites::all(), &filter).await;
    interrupt.abort();

    emit(&report, ctx.output(), print_report)?;
    info!(
        passed = report.totals.passed,
        failed = report.totals.failed,
        skipped = report.totals.skipped,
        "run finished"
    );

    if report.totals.total() == 0 {
        bail!("no tests matched the given filters");
    }
    if !report.is_success() {
        bail!("{} test(s) failed", report.totals.failed);
    }
    Ok(())
}
