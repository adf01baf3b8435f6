//! Configuration for the smokers table.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordination::{SmokingPolicy, TableConfig};
use crate::driver::DriverConfig;

/// Smokers configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Pauses and durations.
    pub timing: TimingSettings,
    /// Table settings.
    pub table: TableSettings,
    /// Agent settings.
    pub agent: AgentSettings,
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/smokers/smokers.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join("smokers").join("smokers.yml");
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./smokers.yml
        let fallback_config = PathBuf::from("smokers.yml");
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

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.table_config().validate().context("Invalid table settings")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Table part of the configuration.
    pub fn table_config(&self) -> TableConfig {
        TableConfig {
            policy: self.table.policy,
            max_pending_wakes: self.table.max_pending_wakes,
            event_history: self.table.event_history,
        }
    }

    /// Convert to DriverConfig.
    pub fn to_driver_config(&self) -> DriverConfig {
        DriverConfig {
            table: self.table_config(),
            agent_pause: Duration::from_millis(self.timing.agent_pause_ms),
            smoker_pause: Duration::from_millis(self.timing.smoker_pause_ms),
            smoke_duration: Duration::from_millis(self.timing.smoke_duration_ms),
            rounds: self.agent.rounds,
            seed: self.agent.seed,
        }
    }
}

/// Pauses and durations, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Agent pause after each placement.
    pub agent_pause_ms: u64,
    /// Smoker pause after each look at the table.
    pub smoker_pause_ms: u64,
    /// Length of one cigarette.
    pub smoke_duration_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            agent_pause_ms: 100,
            smoker_pause_ms: 1000,
            smoke_duration_ms: 5000,
        }
    }
}

/// Table settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TableSettings {
    /// Whether smokers may overlap.
    pub policy: SmokingPolicy,
    /// Bound on pending wake-ups.
    pub max_pending_wakes: usize,
    /// Events kept in history.
    pub event_history: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        let table = TableConfig::default();
        Self {
            policy: table.policy,
            max_pending_wakes: table.max_pending_wakes,
            event_history: table.event_history,
        }
    }
}

/// Agent settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Stop after this many placements (unset = run forever).
    pub rounds: Option<u64>,
    /// Seed for reproducible placements.
    pub seed: Option<u64>,
}
