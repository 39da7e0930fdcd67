//! Configuration loading. A single TOML file with `[capture]` and `[bus]`
//! tables; every default below is resolved from
//! `examples/original_source/src/dpdk/packet_capture.py` and
//! `examples/original_source/src/kafka_producer.py`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flow_table::{IDLE_EXPIRY_SECS, SWEEP_INTERVAL_SECS};
use crate::publisher::ProducerTuning;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub port_id: u16,
    pub nb_mbufs: u32,
    pub cache_size: u32,
    pub burst_size: usize,
    pub rx_ring_size: u32,
    pub tx_ring_size: u32,
    pub core_mask: String,
    pub memory_channels: u32,
    pub hugepage_dir: String,
    pub idle_expiry_secs: f64,
    pub sweep_interval_secs: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            port_id: 0,
            nb_mbufs: 8191,
            cache_size: 250,
            burst_size: 32,
            rx_ring_size: 1024,
            tx_ring_size: 1024,
            core_mask: "0-3".to_string(),
            memory_channels: 4,
            hugepage_dir: "/mnt/huge".to_string(),
            idle_expiry_secs: IDLE_EXPIRY_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl CaptureConfig {
    /// The argument vector passed to `DriverAdapter::init_env`, shaped the
    /// way `dpdk_wrapper.py`'s `eal_args` builds it.
    pub fn eal_args(&self) -> Vec<String> {
        vec![
            "flowcapd".to_string(),
            "-l".to_string(),
            self.core_mask.clone(),
            "-n".to_string(),
            self.memory_channels.to_string(),
            "--huge-dir".to_string(),
            self.hugepage_dir.clone(),
            "--proc-type".to_string(),
            "auto".to_string(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub bootstrap_servers: String,
    pub topic: String,
    pub client_id: String,
    pub producer: ProducerTuningConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "network-flows".to_string(),
            client_id: "flowcapd".to_string(),
            producer: ProducerTuningConfig::default(),
        }
    }
}

/// Opaque producer tuning, forwarded verbatim to the bus client
/// constructor. Defaults match [`ProducerTuning::default`]; any key set
/// here overrides the matching field, anything unrecognized is ignored by
/// the mock client and forwarded as-is to `rdkafka` when that feature is
/// enabled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, transparent)]
pub struct ProducerTuningConfig(pub BTreeMap<String, toml::Value>);

impl ProducerTuningConfig {
    pub fn resolve(&self) -> ProducerTuning {
        let mut tuning = ProducerTuning::default();
        if let Some(v) = self.0.get("batch_size").and_then(toml::Value::as_integer) {
            tuning.batch_size = v as u32;
        }
        if let Some(v) = self.0.get("linger_ms").and_then(toml::Value::as_integer) {
            tuning.linger_ms = v as u32;
        }
        if let Some(v) = self.0.get("compression_type").and_then(toml::Value::as_str) {
            tuning.compression_type = v.to_string();
        }
        if let Some(v) = self.0.get("acks").and_then(toml::Value::as_str) {
            tuning.acks = v.to_string();
        }
        if let Some(v) = self.0.get("retries").and_then(toml::Value::as_integer) {
            tuning.retries = v as u32;
        }
        tuning
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub bus: BusConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capture_config_matches_documented_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.port_id, 0);
        assert_eq!(config.nb_mbufs, 8191);
        assert_eq!(config.cache_size, 250);
        assert_eq!(config.burst_size, 32);
        assert_eq!(config.rx_ring_size, 1024);
        assert_eq!(config.tx_ring_size, 1024);
    }

    #[test]
    fn default_bus_config_matches_documented_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.bootstrap_servers, "localhost:9092");
        assert_eq!(config.topic, "network-flows");
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml_str = r#"
            [capture]
            port_id = 1

            [bus]
            topic = "custom-topic"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capture.port_id, 1);
        assert_eq!(config.capture.nb_mbufs, 8191); // unset fields keep their default
        assert_eq!(config.bus.topic, "custom-topic");
    }

    #[test]
    fn missing_file_surfaces_a_read_error() {
        let err = Config::load("/nonexistent/path/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
