//! Environment variable configuration
//!
//! Provides `STEPRUN_*` overrides for the execution configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "STEPRUN";

/// Overrides read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// STEPRUN_PARALLEL
    pub parallel: Option<bool>,
    /// STEPRUN_STREAMS
    pub streams: Option<usize>,
    /// STEPRUN_STRATEGY
    pub strategy: Option<String>,
    /// STEPRUN_MAX_RETRIES_COUNT
    pub max_retries_count: Option<u32>,
    /// STEPRUN_RETRY_ONLY
    pub retry_only: Option<String>,
    /// STEPRUN_TAGS
    pub tags: Option<String>,
    /// STEPRUN_TABLE_ROWS
    pub table_rows: Option<String>,
    /// STEPRUN_RUNNER
    pub runner: Option<String>,
    /// STEPRUN_RUNNER_TIMEOUT_MS
    pub runner_timeout_ms: Option<u64>,
    /// STEPRUN_LOG_LEVEL
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            parallel: get_env_bool("PARALLEL"),
            streams: get_env_parse("STREAMS"),
            strategy: get_env("STRATEGY"),
            max_retries_count: get_env_parse("MAX_RETRIES_COUNT"),
            retry_only: get_env("RETRY_ONLY"),
            tags: get_env("TAGS"),
            table_rows: get_env("TABLE_ROWS"),
            runner: get_env("RUNNER"),
            runner_timeout_ms: get_env_parse("RUNNER_TIMEOUT_MS"),
            log_level: get_env("LOG_LEVEL"),
        }
    }

    /// Check if any override is set
    pub fn has_any(&self) -> bool {
        self.parallel.is_some()
            || self.streams.is_some()
            || self.strategy.is_some()
            || self.max_retries_count.is_some()
            || self.retry_only.is_some()
            || self.tags.is_some()
            || self.table_rows.is_some()
            || self.runner.is_some()
            || self.runner_timeout_ms.is_some()
            || self.log_level.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print the recognised STEPRUN variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PARALLEL           Run specifications in parallel (true/false)");
    println!("  {ENV_PREFIX}_STREAMS            Number of parallel streams");
    println!("  {ENV_PREFIX}_STRATEGY           Distribution strategy (eager, lazy)");
    println!("  {ENV_PREFIX}_MAX_RETRIES_COUNT  Attempts per failing scenario");
    println!("  {ENV_PREFIX}_RETRY_ONLY         Tag expression scoping retries");
    println!("  {ENV_PREFIX}_TAGS               Tag expression selecting scenarios");
    println!("  {ENV_PREFIX}_TABLE_ROWS         Data table rows to run (e.g. 1,3-5)");
    println!("  {ENV_PREFIX}_RUNNER             Runner command line");
    println!("  {ENV_PREFIX}_RUNNER_TIMEOUT_MS  Runner response timeout");
    println!("  {ENV_PREFIX}_LOG_LEVEL          Log level (trace, debug, info, warn, error)");
}
