use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;
use tokio::fs;
use trellis_cli::RunnerConfig;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file, defaults and environment)
    Show,

    /// Get one configuration value, e.g. `engine.command_timeout_ms`
    Get {
        /// Configuration key
        key: String,
    },

    /// Validate the configuration file and the effective values
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => {
            emit(ctx.config(), ctx.output(), |config| {
                println!("Effective configuration ({}):", path.display());
                match serde_yaml::to_string(config) {
                    Ok(yaml) => print!("{}", yaml),
                    Err(err) => eprintln!("failed to render configuration: {}", err),
                }
            })?;
        }
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(ctx.config())?;
            let segments = split_key(&key)?;
            match get_json_value(&json, &segments) {
                Some(value) => emit(value, ctx.output(), |value| match value {
                    JsonValue::String(s) => println!("{}", s),
                    other => println!("{}", other),
                })?,
                None => bail!("{} not found in configuration", key),
            }
        }
        ConfigAction::Validate => {
            if fs::try_exists(path).await? {
                let raw = fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                RunnerConfig::from_yaml(&raw, path)?;
                println!("Configuration file {} is valid", path.display());
            } else {
                println!(
                    "No configuration file at {}; using defaults",
                    path.display()
                );
            }
            ctx.config()
                .validate()
                .context("effective configuration is invalid")?;
            println!("Effective configuration is valid");
        }
    }

    Ok(())
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        bail!("configuration key cannot be empty");
    }
    Ok(segments)
}

fn get_json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for segment in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*segment)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keys_resolve() {
        let json = serde_json::to_value(RunnerConfig::default()).unwrap();
        let segments = split_key("engine.poll_interval_ms").unwrap();
        assert_eq!(
            get_json_value(&json, &segments),
            Some(&JsonValue::from(50u64))
        );
        assert!(get_json_value(&json, &["engine", "missing"]).is_none());
        assert!(split_key("..").is_err());
    }
}
