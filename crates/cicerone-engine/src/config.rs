use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Origin of the guide backend (session, event, and chat endpoints).
    pub api_origin: String,
    /// Periodic recorded-event flush interval.
    pub flush_interval_ms: u64,
    /// Buffer size that triggers an immediate flush.
    pub flush_threshold: usize,
    /// Debounce applied to step-list persistence.
    pub step_sync_debounce_ms: u64,
    /// Maximum tool results per guide session before the guide gives up.
    pub retry_budget: u32,
    pub cursor: CursorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_origin: "http://localhost:3000".into(),
            flush_interval_ms: 5000,
            flush_threshold: 50,
            step_sync_debounce_ms: 500,
            retry_budget: 10,
            cursor: CursorConfig::default(),
        }
    }
}

/// Fixed choreography delays. These are the deliberate per-action latency
/// floor that keeps the cursor's movements observable to a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    pub approach_ms: u64,
    pub click_pulse_ms: u64,
    pub scroll_settle_ms: u64,
    pub input_settle_ms: u64,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            approach_ms: 600,
            click_pulse_ms: 200,
            scroll_settle_ms: 1500,
            input_settle_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timings {
    pub approach: Duration,
    pub click_pulse: Duration,
    pub scroll_settle: Duration,
    pub input_settle: Duration,
}

impl EngineConfig {
    pub fn timings(&self) -> Timings {
        Timings {
            approach: Duration::from_millis(self.cursor.approach_ms),
            click_pulse: Duration::from_millis(self.cursor.click_pulse_ms),
            scroll_settle: Duration::from_millis(self.cursor.scroll_settle_ms),
            input_settle: Duration::from_millis(self.cursor.input_settle_ms),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn step_sync_debounce(&self) -> Duration {
        Duration::from_millis(self.step_sync_debounce_ms)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./cicerone.yaml
    /// 2. ~/.cicerone/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<EngineConfig, ConfigError> {
        let local_config = PathBuf::from("./cicerone.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".cicerone").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(EngineConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<EngineConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
