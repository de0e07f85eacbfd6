//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use readmark_core::{Config, RecoveryPolicy};

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, debounce_ms, max_attempts, retry_base_ms, recovery, \
                          seconds_per_page, notification_secs, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "debounce_ms": config.debounce_ms,
                    "max_attempts": config.max_attempts,
                    "retry_base_ms": config.retry_base_ms,
                    "recovery": config.recovery.to_string(),
                    "seconds_per_page": config.seconds_per_page,
                    "notification_secs": config.notification_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:          {}", config.data_dir.display());
            println!("  debounce_ms:       {}", config.debounce_ms);
            println!("  max_attempts:      {}", config.max_attempts);
            println!("  retry_base_ms:     {}", config.retry_base_ms);
            println!("  recovery:          {}", config.recovery);
            println!("  seconds_per_page:  {}", config.seconds_per_page);
            println!("  notification_secs: {}", config.notification_secs);
            println!(
                "  log_file:          {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;
    config.validate()?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let number = || -> Result<u64> {
        value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}. Use a whole number.", key))
    };

    match key {
        "data_dir" => config.data_dir = value.into(),
        "debounce_ms" => config.debounce_ms = number()?,
        "max_attempts" => {
            config.max_attempts = u32::try_from(number()?)
                .context("Invalid value for max_attempts. Value is too large.")?
        }
        "retry_base_ms" => config.retry_base_ms = number()?,
        "recovery" => config.recovery = value.parse::<RecoveryPolicy>()?,
        "seconds_per_page" => config.seconds_per_page = number()?,
        "notification_secs" => config.notification_secs = number()?,
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}
