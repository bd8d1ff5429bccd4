//! Engine configuration.

use crate::types::{MAX_DEFAULT_PLUGINS, MAX_RACK_PLUGINS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How plugins are wired to the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// One driver client, every plugin owns dedicated ports on it.
    SingleClient,
    /// One driver client per plugin.
    MultipleClients,
    /// All plugins form one linear stereo chain.
    #[default]
    ContinuousRack,
}

impl ProcessMode {
    pub fn max_plugins(self) -> usize {
        match self {
            ProcessMode::ContinuousRack => MAX_RACK_PLUGINS,
            _ => MAX_DEFAULT_PLUGINS,
        }
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of every OSC path and of driver port names.
    pub client_name: String,
    pub process_mode: ProcessMode,
    /// 0 selects the mode's maximum.
    pub max_plugins: usize,
    pub sample_rate: f64,
    pub buffer_size: usize,
    /// Process plugins in 8-frame sub-blocks so control events land closer
    /// to their timestamps.
    pub high_precision: bool,
    /// Run every plugin in a bridge process, even native ones.
    pub prefer_bridges: bool,
    pub poll_interval_ms: u64,
    pub postponed_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_name: "Consort".to_string(),
            process_mode: ProcessMode::default(),
            max_plugins: 0,
            sample_rate: 44100.0,
            buffer_size: 512,
            high_precision: false,
            prefer_bridges: false,
            poll_interval_ms: 50,
            postponed_capacity: 150,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_name.is_empty() || self.client_name.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "client_name '{}' must be non-empty and contain no '/'",
                self.client_name
            )));
        }
        let limit = self.process_mode.max_plugins();
        if self.max_plugins > limit {
            return Err(Error::InvalidConfig(format!(
                "max_plugins {} exceeds the {:?} limit of {}",
                self.max_plugins, self.process_mode, limit
            )));
        }
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > 8192 {
            return Err(Error::InvalidConfig(format!(
                "buffer_size {} out of range (1-8192)",
                self.buffer_size
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be > 0".into()));
        }
        if self.postponed_capacity < 128 {
            return Err(Error::InvalidConfig(format!(
                "postponed_capacity {} must hold at least 128 note-offs",
                self.postponed_capacity
            )));
        }
        Ok(())
    }

    /// Registry size after applying the mode limit.
    pub fn effective_max_plugins(&self) -> usize {
        let limit = self.process_mode.max_plugins();
        if self.max_plugins == 0 {
            limit
        } else {
            self.max_plugins.min(limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.client_name, "Consort");
        assert_eq!(config.process_mode, ProcessMode::ContinuousRack);
        assert_eq!(config.effective_max_plugins(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_limits() {
        let mut config = EngineConfig {
            process_mode: ProcessMode::MultipleClients,
            max_plugins: 99,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_max_plugins(), 99);

        config.process_mode = ProcessMode::ContinuousRack;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values() {
        let config = EngineConfig {
            client_name: "a/b".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"client_name":"Rack","high_precision":true}"#).unwrap();
        assert_eq!(config.client_name, "Rack");
        assert!(config.high_precision);
        assert_eq!(config.poll_interval_ms, 50);
    }
}
