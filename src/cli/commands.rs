use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run the bundled suites against the simulated account page
    Run(RunArgs),

    /// List suites and their tests
    List,

    /// Inspect the effective configuration
    Config(ConfigArgs),
}
