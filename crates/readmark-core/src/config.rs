//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/readmark/config.toml)
//! 3. Environment variables (READMARK_* prefix)
//!
//! Environment variables take precedence over config file values.
//!
//! Incognito mode is intentionally absent: it is a per-session switch and
//! always starts disabled.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "READMARK";

/// What the progress file does when a save or delete fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Copy the backup over the primary file, then return the original error
    #[default]
    Restore,
    /// Return the error and leave the files untouched
    Propagate,
}

impl std::str::FromStr for RecoveryPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "restore" => Ok(RecoveryPolicy::Restore),
            "propagate" => Ok(RecoveryPolicy::Propagate),
            other => bail!("Unknown recovery policy '{}'. Use 'restore' or 'propagate'.", other),
        }
    }
}

impl std::fmt::Display for RecoveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryPolicy::Restore => write!(f, "restore"),
            RecoveryPolicy::Propagate => write!(f, "propagate"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the progress file and its backup
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Delay before a burst of saves for one manga is written
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Write attempts per flush before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay, doubled after every failed attempt
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Recovery behaviour on failed writes
    #[serde(default)]
    pub recovery: RecoveryPolicy,

    /// Assumed reading speed used for estimated reading time
    #[serde(default = "default_seconds_per_page")]
    pub seconds_per_page: u64,

    /// How long failure notifications stay visible
    #[serde(default = "default_notification_secs")]
    pub notification_secs: u64,

    /// Log file path (defaults to {data_dir}/debug.log)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            debounce_ms: default_debounce_ms(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            recovery: RecoveryPolicy::default(),
            seconds_per_page: default_seconds_per_page(),
            notification_secs: default_notification_secs(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (READMARK_DATA_DIR, READMARK_DEBOUNCE_MS, ...)
    /// 2. Config file (~/.config/readmark/config.toml or READMARK_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable numeric values are ignored and the previous value kept.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_number(&format!("{}_DEBOUNCE_MS", ENV_PREFIX)) {
            self.debounce_ms = val;
        }

        if let Some(val) = env_number(&format!("{}_MAX_ATTEMPTS", ENV_PREFIX)) {
            if let Ok(attempts) = u32::try_from(val) {
                self.max_attempts = attempts;
            }
        }

        if let Some(val) = env_number(&format!("{}_RETRY_BASE_MS", ENV_PREFIX)) {
            self.retry_base_ms = val;
        }

        if let Ok(val) = std::env::var(format!("{}_RECOVERY", ENV_PREFIX)) {
            if let Ok(policy) = val.parse() {
                self.recovery = policy;
            }
        }

        if let Some(val) = env_number(&format!("{}_SECONDS_PER_PAGE", ENV_PREFIX)) {
            self.seconds_per_page = val;
        }

        if let Some(val) = env_number(&format!("{}_NOTIFICATION_SECS", ENV_PREFIX)) {
            self.notification_secs = val;
        }
    }

    /// Reject values the sync engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with READMARK_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readmark")
            .join("config.toml")
    }

    /// Get the path to the progress database file
    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join("progress.json")
    }

    /// Get the path to the single-generation backup
    pub fn backup_path(&self) -> PathBuf {
        self.data_dir.join("progress.backup.json")
    }

    /// Get the log file path
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_secs(self.notification_secs)
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("readmark")
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_seconds_per_page() -> u64 {
    20
}

fn default_notification_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "READMARK_DATA_DIR",
        "READMARK_DEBOUNCE_MS",
        "READMARK_MAX_ATTEMPTS",
        "READMARK_RETRY_BASE_MS",
        "READMARK_RECOVERY",
        "READMARK_SECONDS_PER_PAGE",
        "READMARK_NOTIFICATION_SECS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.debounce(), Duration::from_millis(1000));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base(), Duration::from_secs(1));
        assert_eq!(config.recovery, RecoveryPolicy::Restore);
        assert!(config.data_dir.ends_with("readmark"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();

        assert!(config.progress_path().ends_with("progress.json"));
        assert!(config.backup_path().ends_with("progress.backup.json"));
        assert!(config.log_path().ends_with("debug.log"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("READMARK_DATA_DIR", "/tmp/readmark-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/readmark-test"));
    }

    #[test]
    fn test_env_override_timing() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("READMARK_DEBOUNCE_MS", "250");
        env::set_var("READMARK_MAX_ATTEMPTS", "5");
        env::set_var("READMARK_RETRY_BASE_MS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.max_attempts, 5);
        // Invalid value keeps the previous setting
        assert_eq!(config.retry_base_ms, 1000);
    }

    #[test]
    fn test_env_override_out_of_range_and_notifications() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("READMARK_MAX_ATTEMPTS", "4294967297");
        env::set_var("READMARK_NOTIFICATION_SECS", "12");
        config.apply_env_overrides();

        // Too large for u32: kept rather than wrapped to 1
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.notification_secs, 12);
        assert_eq!(config.notification_duration(), Duration::from_secs(12));
    }

    #[test]
    fn test_env_override_recovery() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("READMARK_RECOVERY", "Propagate");
        config.apply_env_overrides();
        assert_eq!(config.recovery, RecoveryPolicy::Propagate);

        env::set_var("READMARK_RECOVERY", "bogus");
        config.apply_env_overrides();
        assert_eq!(config.recovery, RecoveryPolicy::Propagate);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/readmark"),
            debounce_ms: 500,
            recovery: RecoveryPolicy::Propagate,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("recovery = \"propagate\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.debounce_ms, 500);
        assert_eq!(parsed.recovery, RecoveryPolicy::Propagate);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            debounce_ms = 100
            seconds_per_page = 30
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.seconds_per_page, 30);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let _guard = EnvGuard::new(ENV_VARS);

        let result = Config::load_from_str("max_attempts = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("READMARK_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.debounce_ms, 1000);
        assert!(config.data_dir.exists());
    }
}
