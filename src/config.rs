// Engine configuration
// Serde-backed settings with JSON file load/save

use crate::clock::{Meter, Tempo};
use crate::error::ConfigError;
use crate::voice::QuantizePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Outbound link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// UDP address of the external audio engine
    pub target: String,
    /// Capacity of the lock-free outbound ring
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1:57120".to_string(),
            queue_capacity: 256,
        }
    }
}

/// Network clock synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Discrepancy above which the client jumps phase instead of slewing
    pub jump_threshold_beats: f64,
    /// Horizon over which a slew correction decays the phase error
    pub slew_horizon_secs: f64,
    /// Cadence of sync queries while synchronized
    pub query_interval_ms: u64,
    /// How long to wait for a reply before discarding the sample
    pub reply_timeout_ms: u64,
    /// Consecutive timeouts before the client marks itself unsynchronized
    pub max_missed: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            jump_threshold_beats: 0.25,
            slew_horizon_secs: 2.0,
            query_interval_ms: 1000,
            reply_timeout_ms: 250,
            max_missed: 5,
        }
    }
}

/// Top-level engine settings. Every field has a default, so a config
/// file only needs to spell out what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_tempo_bpm")]
    pub tempo_bpm: f64,
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
    #[serde(default)]
    pub quantize: QuantizePolicy,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_tempo_bpm() -> f64 {
    120.0
}

fn default_beats_per_bar() -> u32 {
    4
}

fn default_notification_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: default_tempo_bpm(),
            beats_per_bar: default_beats_per_bar(),
            quantize: QuantizePolicy::default(),
            transport: TransportConfig::default(),
            sync: SyncConfig::default(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tempo_bpm.is_finite()
            || !(Tempo::MIN_BPM..=Tempo::MAX_BPM).contains(&self.tempo_bpm)
        {
            return Err(ConfigError::Invalid(format!(
                "tempo_bpm must be between {} and {}, got {}",
                Tempo::MIN_BPM,
                Tempo::MAX_BPM,
                self.tempo_bpm
            )));
        }
        if self.beats_per_bar == 0 {
            return Err(ConfigError::Invalid(
                "beats_per_bar must be at least 1".to_string(),
            ));
        }
        if self.transport.queue_capacity == 0 || self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel capacities must be at least 1".to_string(),
            ));
        }
        if self.sync.jump_threshold_beats <= 0.0 || self.sync.slew_horizon_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "sync thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.tempo_bpm)
    }

    pub fn meter(&self) -> Meter {
        Meter::new(self.beats_per_bar)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tempo().bpm(), 120.0);
        assert_eq!(config.meter().beats_per_bar(), 4);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.tempo_bpm = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.beats_per_bar = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.sync.jump_threshold_beats = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"tempo_bpm": 140.0}"#).unwrap();
        assert_eq!(config.tempo_bpm, 140.0);
        assert_eq!(config.beats_per_bar, 4);
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livebeat.json");

        let mut config = EngineConfig::default();
        config.tempo_bpm = 174.0;
        config.quantize = QuantizePolicy::NextBar;
        config.sync.jump_threshold_beats = 0.5;

        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"tempo_bpm": -10.0}"#).unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
