use std::path::{Path, PathBuf};

use trellis_cli::RunnerConfig;

use super::output::OutputFormat;

pub struct CliContext {
    config: RunnerConfig,
    config_path: PathBuf,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: RunnerConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config,
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}
