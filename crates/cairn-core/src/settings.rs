//! Runtime configuration, grouped the way the original `pydantic-settings`
//! groups were: `orchestrator`, `executor`, `paths`. Each field reads an
//! optional `CAIRN_<GROUP>_<FIELD>` environment override; explicit
//! constructor arguments (the CLI's clap flags) take precedence over
//! whatever `from_env` resolves.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_MAX_CONCURRENT_AGENTS: u32 = 5;
const DEFAULT_MAX_EXECUTION_TIME_SECS: f64 = 60.0;
const DEFAULT_MAX_MEMORY_BYTES: u64 = 100_000_000;
const DEFAULT_MAX_RECURSION_DEPTH: u32 = 1000;
const MIN_MEMORY_BYTES: u64 = 1024 * 1024;
const MAX_MEMORY_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// How long a terminal lifecycle record is kept before `cleanup_old`
/// reclaims it. The source code's own retention window varied between
/// 5 minutes, 24 hours, and 7 days across iterations; this settles on
/// the longest value attested, 7 days, as the default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrent_agents: u32,
    pub enable_signal_polling: bool,
}

impl OrchestratorSettings {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_agents < 1 {
            return Err(Error::Config(
                "orchestrator.max_concurrent_agents must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: DEFAULT_MAX_CONCURRENT_AGENTS,
            enable_signal_polling: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_execution_time: Duration,
    pub max_memory_bytes: u64,
    pub max_recursion_depth: u32,
}

impl ExecutorSettings {
    fn validate(&self) -> Result<()> {
        if self.max_execution_time.is_zero() {
            return Err(Error::Config(
                "executor.max_execution_time must be > 0".into(),
            ));
        }
        if !(MIN_MEMORY_BYTES..=MAX_MEMORY_BYTES).contains(&self.max_memory_bytes) {
            return Err(Error::Config(format!(
                "executor.max_memory_bytes must be between {MIN_MEMORY_BYTES} and {MAX_MEMORY_BYTES}"
            )));
        }
        if self.max_recursion_depth < 1 {
            return Err(Error::Config(
                "executor.max_recursion_depth must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_execution_time: Duration::from_secs_f64(DEFAULT_MAX_EXECUTION_TIME_SECS),
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub project_root: PathBuf,
    pub cairn_home: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cairn_home = project_root.join(".cairn");
        Self {
            project_root,
            cairn_home,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CairnSettings {
    pub orchestrator: OrchestratorSettings,
    pub executor: ExecutorSettings,
    pub paths: PathSettings,
}

impl CairnSettings {
    /// Resolve settings from environment variables, falling back to the
    /// defaults above for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Some(v) = env_u32("CAIRN_ORCHESTRATOR_MAX_CONCURRENT_AGENTS")? {
            settings.orchestrator.max_concurrent_agents = v;
        }
        if let Some(v) = env_bool("CAIRN_ORCHESTRATOR_ENABLE_SIGNAL_POLLING")? {
            settings.orchestrator.enable_signal_polling = v;
        }
        if let Some(v) = env_f64("CAIRN_EXECUTOR_MAX_EXECUTION_TIME")? {
            settings.executor.max_execution_time = Duration::from_secs_f64(v);
        }
        if let Some(v) = env_u64("CAIRN_EXECUTOR_MAX_MEMORY_BYTES")? {
            settings.executor.max_memory_bytes = v;
        }
        if let Some(v) = env_u32("CAIRN_EXECUTOR_MAX_RECURSION_DEPTH")? {
            settings.executor.max_recursion_depth = v;
        }
        if let Ok(v) = std::env::var("CAIRN_PATHS_PROJECT_ROOT") {
            settings.paths.project_root = PathBuf::from(v);
        }
        settings.paths.cairn_home = settings.paths.project_root.join(".cairn");
        if let Ok(v) = std::env::var("CAIRN_PATHS_CAIRN_HOME") {
            settings.paths.cairn_home = PathBuf::from(v);
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        self.executor.validate()?;
        Ok(())
    }
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(Error::Config(format!("{key}: not a boolean: {other}"))),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CairnSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut s = CairnSettings::default();
        s.orchestrator.max_concurrent_agents = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_memory_below_floor() {
        let mut s = CairnSettings::default();
        s.executor.max_memory_bytes = 10;
        assert!(s.validate().is_err());
    }

    #[test]
    fn cairn_home_defaults_under_project_root() {
        let s = CairnSettings::default();
        assert_eq!(s.paths.cairn_home, s.paths.project_root.join(".cairn"));
    }
}
