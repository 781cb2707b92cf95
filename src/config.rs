use chrono::NaiveTime;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::quota::QuotaPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub quota: QuotaPolicy,
    pub allocation: AllocationConfig,
    pub schedule: ScheduleConfig,
    pub ipc: IpcConfig,
    pub auth: AuthConfig,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("leadflow.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Longest wait for a consumer's lock before a retryable error
    pub lock_timeout_ms: u64,
    /// Consumers allocated concurrently within one batch
    pub batch_parallelism: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            batch_parallelism: 4,
        }
    }
}

impl AllocationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Operator-local offset east of UTC
    pub utc_offset_minutes: i32,
    /// Local time of the daily distribution, "HH:MM"
    pub distribute_at: String,
    /// Local time of the daily recycling run, "HH:MM"
    pub recycle_at: String,
    pub check_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            distribute_at: "06:00".to_string(),
            recycle_at: "00:05".to_string(),
            check_interval_secs: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn distribute_time(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.distribute_at).context("Invalid schedule.distribute_at")
    }

    pub fn recycle_time(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.recycle_at).context("Invalid schedule.recycle_at")
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| eyre!("'{}' is not HH:MM: {}", s, e))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub max_clients: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: data_dir().join("leadflow.sock"),
            max_clients: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// SHA-256 hex digest of the shared secret; empty refuses privileged calls
    pub token_sha256: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            quota: QuotaPolicy::default(),
            allocation: AllocationConfig::default(),
            schedule: ScheduleConfig::default(),
            ipc: IpcConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject values that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.schedule.distribute_time()?;
        self.schedule.recycle_time()?;
        if self.allocation.batch_parallelism == 0 {
            return Err(eyre!("allocation.batch_parallelism must be at least 1"));
        }
        Ok(())
    }
}
