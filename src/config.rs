// src/config.rs

//! Manages server configuration: loading, resolving durations, and
//! validation (`SPEC_FULL.md` §2 "Configuration").

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fixed-capacity pool sizes for the four owned kinds (spec §3 "drawn
/// from fixed-capacity pools").
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct PoolConfig {
    #[serde(default = "default_max_slotframes")]
    pub max_slotframes: usize,
    #[serde(default = "default_max_links")]
    pub max_links: usize,
    #[serde(default = "default_max_stats_entries")]
    pub max_stats_entries: usize,
    #[serde(default = "default_max_enhanced_entries")]
    pub max_enhanced_entries: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_slotframes: default_max_slotframes(),
            max_links: default_max_links(),
            max_stats_entries: default_max_stats_entries(),
            max_enhanced_entries: default_max_enhanced_entries(),
        }
    }
}

fn default_max_slotframes() -> usize {
    4
}
fn default_max_links() -> usize {
    64
}
fn default_max_stats_entries() -> usize {
    128
}
fn default_max_enhanced_entries() -> usize {
    64
}

/// Vicinity (pheromone-decay neighbour freshness) tuning, spec §4.E.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct VicinityConfig {
    /// `MAX_PROXIMATES`: capacity of the vicinity table.
    #[serde(default = "default_max_proximates")]
    pub max_proximates: usize,
    /// `PHEROMONE_WINDOW`, seconds since last contact before an entry
    /// starts decaying.
    #[serde(default = "default_pheromone_window_secs", with = "humantime_serde")]
    pub pheromone_window: Duration,
    /// `PHEROMONE_DECAY`: pheromone subtracted per decay tick past the
    /// window.
    #[serde(default = "default_pheromone_decay")]
    pub pheromone_decay: i64,
    /// `PHEROMONE_CHUNK`: pheromone added on every touch.
    #[serde(default = "default_pheromone_chunk")]
    pub pheromone_chunk: i64,
}

impl Default for VicinityConfig {
    fn default() -> Self {
        Self {
            max_proximates: default_max_proximates(),
            pheromone_window: default_pheromone_window_secs(),
            pheromone_decay: default_pheromone_decay(),
            pheromone_chunk: default_pheromone_chunk(),
        }
    }
}

fn default_max_proximates() -> usize {
    16
}
fn default_pheromone_window_secs() -> Duration {
    Duration::from_secs(300)
}
fn default_pheromone_decay() -> i64 {
    10
}
fn default_pheromone_chunk() -> i64 {
    5
}

/// Notification cadence for the observable resources, spec §4.F/§6.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TimersConfig {
    /// `DEBOUNCE_DELAY` for the `rpl/dag` topology resource.
    #[serde(default = "default_debounce_delay", with = "humantime_serde")]
    pub debounce_delay: Duration,
    /// `LINK_UPDATE_PERIOD` for the `6top/cellList` periodic notification.
    #[serde(default = "default_link_update_period", with = "humantime_serde")]
    pub link_update_period: Duration,
    /// `QUEUE_UPDATE_PERIOD` for the `6top/queue` periodic notification.
    #[serde(default = "default_queue_update_period", with = "humantime_serde")]
    pub queue_update_period: Duration,
    /// The `6top/nbrs` notification period, when enabled.
    #[serde(default = "default_nbrs_update_period", with = "humantime_serde")]
    pub nbrs_update_period: Duration,
    /// Whether `6top/nbrs` is observed at all (spec §6: "configurable,
    /// default off").
    #[serde(default)]
    pub nbrs_observable_default: bool,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            debounce_delay: default_debounce_delay(),
            link_update_period: default_link_update_period(),
            queue_update_period: default_queue_update_period(),
            nbrs_update_period: default_nbrs_update_period(),
            nbrs_observable_default: false,
        }
    }
}

fn default_debounce_delay() -> Duration {
    Duration::from_secs(5)
}
fn default_link_update_period() -> Duration {
    Duration::from_secs(10)
}
fn default_queue_update_period() -> Duration {
    Duration::from_secs(10)
}
fn default_nbrs_update_period() -> Duration {
    Duration::from_secs(30)
}

/// Overrides for the fixed URI bases of spec §6 ("exact strings are
/// compile-time constants"). Accepted and validated as config today but
/// not yet consulted by `core::dispatch::ResourceKind::match_path`, which
/// still routes purely on the compiled-in `base_path()` table — staged
/// ahead of the dispatcher wiring for when a second URI namespace is
/// actually needed.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UriPathOverrides {
    #[serde(default)]
    pub rpl_dag: Option<String>,
    #[serde(default)]
    pub nbrs: Option<String>,
    #[serde(default)]
    pub slot_frame: Option<String>,
    #[serde(default)]
    pub cell_list: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub vicinity: Option<String>,
}

/// Demo traffic generator (`SPEC_FULL.md` §10), off by default.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TrafficGeneratorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_traffic_generator_period", with = "humantime_serde")]
    pub period: Duration,
}

impl Default for TrafficGeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period: default_traffic_generator_period(),
        }
    }
}

fn default_traffic_generator_period() -> Duration {
    Duration::from_secs(1)
}

/// Prometheus metrics server settings, mirroring the teacher's
/// `MetricsConfig`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9697
}

/// The final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub pools: PoolConfig,
    #[serde(default)]
    pub vicinity: VicinityConfig,
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub uri_paths: UriPathOverrides,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub traffic_generator: TrafficGeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            log_level: default_log_level(),
            pools: PoolConfig::default(),
            vicinity: VicinityConfig::default(),
            timers: TimersConfig::default(),
            uri_paths: UriPathOverrides::default(),
            metrics: MetricsConfig::default(),
            traffic_generator: TrafficGeneratorConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
    5683
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Reads and parses a TOML config file, then validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    fn validate(&self) -> Result<()> {
        if self.bind_port == 0 {
            return Err(anyhow!("bind_port cannot be 0"));
        }
        if self.bind_address.trim().is_empty() {
            return Err(anyhow!("bind_address cannot be empty"));
        }
        if self.pools.max_slotframes == 0 {
            return Err(anyhow!("pools.max_slotframes cannot be 0"));
        }
        if self.pools.max_links == 0 {
            return Err(anyhow!("pools.max_links cannot be 0"));
        }
        if self.vicinity.max_proximates == 0 {
            return Err(anyhow!("vicinity.max_proximates cannot be 0"));
        }
        if self.vicinity.pheromone_decay <= 0 {
            return Err(anyhow!(
                "vicinity.pheromone_decay must be positive or entries never decay"
            ));
        }
        if self.vicinity.pheromone_chunk <= 0 {
            warn!(
                "vicinity.pheromone_chunk is non-positive ({}): touches will never refresh an entry",
                self.vicinity.pheromone_chunk
            );
        }
        if self.metrics.enabled && self.metrics.port == self.bind_port {
            return Err(anyhow!(
                "metrics.port cannot be the same as bind_port"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_bind_port_is_rejected() {
        let mut config = Config::default();
        config.bind_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn metrics_port_colliding_with_bind_port_is_rejected() {
        let mut config = Config::default();
        config.metrics.port = config.bind_port;
        assert!(config.validate().is_err());
    }
}
