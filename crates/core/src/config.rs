use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchedError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str) -> Option<T> {
    profiled_env_opt(profile, key).and_then(|v| v.parse().ok())
}

/// On-disk encoding of the persisted process blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFormat {
    #[default]
    Json,
    Msgpack,
}

impl FromStr for StateFormat {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" => Ok(Self::Msgpack),
            other => Err(SchedError::Config(format!("unknown state format '{other}'"))),
        }
    }
}

/// Runtime configuration, typically parsed from TOML with env overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Real-time seconds represented by one tick (used by `sleep_seconds`).
    #[serde(default = "default_tick_period")]
    pub tick_period_secs: f64,
    /// Random jitter, in ticks either way, added to `sleep_seconds`.
    #[serde(default = "default_sleep_jitter")]
    pub sleep_jitter_ticks: u64,
    /// Upper bound on dirty re-passes within one cycle.
    #[serde(default = "default_max_passes")]
    pub max_passes_per_cycle: usize,
    /// Where the CLI keeps the durable process blob.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default)]
    pub state_format: StateFormat,
}

fn default_tick_period() -> f64 { 1.0 }
fn default_sleep_jitter() -> u64 { 2 }
fn default_max_passes() -> usize { 1000 }
fn default_state_path() -> PathBuf { PathBuf::from("data/process.json") }

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_period_secs: default_tick_period(),
            sleep_jitter_ticks: default_sleep_jitter(),
            max_passes_per_cycle: default_max_passes(),
            state_path: default_state_path(),
            state_format: StateFormat::default(),
        }
    }
}

impl RuntimeConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RETHREAD_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt("RETHREAD_PROFILE").unwrap_or_default().to_uppercase();
        let mut config = Self::default();
        config.apply_env_overrides(&profile);
        config
    }

    /// Parse config from a TOML string, then apply env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedError> {
        let mut config: Self = toml::from_str(toml_str)?;
        let profile = env_opt("RETHREAD_PROFILE").unwrap_or_default().to_uppercase();
        config.apply_env_overrides(&profile);
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn apply_env_overrides(&mut self, profile: &str) {
        if let Some(v) = profiled_env_parse(profile, "RETHREAD_TICK_PERIOD") {
            self.tick_period_secs = v;
        }
        if let Some(v) = profiled_env_parse(profile, "RETHREAD_SLEEP_JITTER") {
            self.sleep_jitter_ticks = v;
        }
        if let Some(v) = profiled_env_parse(profile, "RETHREAD_MAX_PASSES") {
            self.max_passes_per_cycle = v;
        }
        if let Some(v) = profiled_env_opt(profile, "RETHREAD_STATE_PATH") {
            self.state_path = PathBuf::from(v);
        }
        if let Some(v) = profiled_env_parse(profile, "RETHREAD_STATE_FORMAT") {
            self.state_format = v;
        }
    }

    pub fn validate(&self) -> Result<(), SchedError> {
        if !(self.tick_period_secs.is_finite() && self.tick_period_secs > 0.0) {
            return Err(SchedError::Config(format!(
                "tick_period_secs must be positive, got {}",
                self.tick_period_secs
            )));
        }
        if self.max_passes_per_cycle == 0 {
            return Err(SchedError::Config("max_passes_per_cycle must be at least 1".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Runtime config loaded:");
        tracing::info!("  ticks:   period={}s, sleep_jitter=±{}", self.tick_period_secs, self.sleep_jitter_ticks);
        tracing::info!("  passes:  max_per_cycle={}", self.max_passes_per_cycle);
        tracing::info!("  state:   path={}, format={:?}", self.state_path.display(), self.state_format);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.tick_period_secs, 1.0);
        assert_eq!(config.sleep_jitter_ticks, 2);
        assert_eq!(config.max_passes_per_cycle, 1000);
        assert_eq!(config.state_path, PathBuf::from("data/process.json"));
        assert_eq!(config.state_format, StateFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = RuntimeConfig::from_toml(
            r#"
            tick_period_secs = 3.3
            state_format = "msgpack"
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_period_secs, 3.3);
        assert_eq!(config.state_format, StateFormat::Msgpack);
        assert_eq!(config.max_passes_per_cycle, 1000);
    }

    #[test]
    fn rejects_non_positive_tick_period() {
        let err = RuntimeConfig::from_toml("tick_period_secs = 0.0").unwrap_err();
        assert!(matches!(err, SchedError::Config(_)));
    }

    #[test]
    fn profiled_env_overrides_only_apply_to_that_profile() {
        std::env::set_var("CFGTEST_RETHREAD_MAX_PASSES", "25");
        std::env::set_var("CFGTEST_RETHREAD_STATE_FORMAT", "msgpack");

        let mut config = RuntimeConfig::default();
        config.apply_env_overrides("CFGTEST");
        assert_eq!(config.max_passes_per_cycle, 25);
        assert_eq!(config.state_format, StateFormat::Msgpack);

        let mut unprofiled = RuntimeConfig::default();
        unprofiled.apply_env_overrides("");
        assert_eq!(unprofiled.max_passes_per_cycle, 1000);

        std::env::remove_var("CFGTEST_RETHREAD_MAX_PASSES");
        std::env::remove_var("CFGTEST_RETHREAD_STATE_FORMAT");
    }

    #[test]
    fn state_format_parsing() {
        assert_eq!("JSON".parse::<StateFormat>().unwrap(), StateFormat::Json);
        assert_eq!("messagepack".parse::<StateFormat>().unwrap(), StateFormat::Msgpack);
        assert!("yaml".parse::<StateFormat>().is_err());
    }
}
