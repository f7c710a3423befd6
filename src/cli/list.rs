use anyhow::Result;
use serde::Serialize;
use trellis_cli::suites;

use super::context::CliContext;
use super::output::emit;

#[derive(Serialize)]
struct SuiteListing {
    suite: String,
    tests: Vec<String>,
}

pub fn cmd_list(ctx: &CliContext) -> Result<()> {
    let listing: Vec<SuiteListing> = suites::all()
        .iter()
        .map(|suite| SuiteListing {
            suite: suite.name().to_string(),
            tests: suite.tests().iter().map(|t| t.name.clone()).collect(),
        })
        .collect();

    emit(&listing, ctx.output(), |listing| {
        for entry in listing {
            println!("{}", entry.suite);
            for test in &entry.tests {
                println!("  {}", test);
            }
        }
    })
}
