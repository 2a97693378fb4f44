use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ConfigError;
use super::handler::{Window, WordSize};
use super::shot_control::ShotTimeouts;
use super::sim::SimTiming;

/// Timing used for simulated UUTs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub arm_delay_ms: u64,
    pub run_time_ms: u64,
    pub n_samples: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arm_delay_ms: 100,
            run_time_ms: 500,
            n_samples: 1000,
        }
    }
}

/// Structure representing the application configuration. Contains pathing, capture layout
/// and shot information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub nchan: usize,
    pub word_size: WordSize,
    pub handler_config_path: PathBuf,
    pub calibration_path: Option<PathBuf>,
    pub raw_data_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub window: Window,
    pub uuts: Vec<String>,
    pub soft_trigger: bool,
    pub n_shots: u64,
    pub arm_timeout_secs: f64,
    pub shot_timeout_secs: f64,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be placeholders
    fn default() -> Self {
        Self {
            nchan: 32,
            word_size: WordSize::Two,
            handler_config_path: PathBuf::from("None"),
            calibration_path: None,
            raw_data_path: None,
            output_path: PathBuf::from("None"),
            window: Window::default(),
            uuts: vec![String::from("acq2106_001")],
            soft_trigger: true,
            n_shots: 1,
            arm_timeout_secs: 10.0,
            shot_timeout_secs: 60.0,
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check the values shared by every mode
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nchan == 0 {
            return Err(invalid("nchan", "must be at least 1"));
        }
        if self.window.stride == 0 {
            return Err(invalid("window.stride", "must be at least 1"));
        }
        if let Some(stop) = self.window.stop {
            if stop < self.window.start {
                return Err(invalid("window.stop", "must not be before window.start"));
            }
        }
        Ok(())
    }

    /// Check the values needed to run shots
    pub fn validate_shots(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.uuts.is_empty() {
            return Err(invalid("uuts", "at least one UUT is required"));
        }
        if self.n_shots == 0 {
            return Err(invalid("n_shots", "must be at least 1"));
        }
        self.shot_timeouts()?;
        Ok(())
    }

    pub fn get_raw_data_path(&self) -> Result<&Path, ConfigError> {
        match &self.raw_data_path {
            Some(p) if p.exists() => Ok(p.as_path()),
            Some(p) => Err(ConfigError::BadFilePath(p.clone())),
            None => Err(ConfigError::MissingPath(String::from("raw_data_path"))),
        }
    }

    /// Get the path to the decoded CSV for offline decoding
    pub fn get_decode_file_name(&self) -> Result<PathBuf, ConfigError> {
        let raw_path = self.get_raw_data_path()?;
        let stem = raw_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("decoded"));
        if self.output_path.exists() {
            Ok(self.output_path.join(format!("{stem}.csv")))
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    pub fn shot_timeouts(&self) -> Result<ShotTimeouts, ConfigError> {
        Ok(ShotTimeouts {
            arm: timeout_from_secs("arm_timeout_secs", self.arm_timeout_secs)?,
            shot: timeout_from_secs("shot_timeout_secs", self.shot_timeout_secs)?,
        })
    }

    pub fn sim_timing(&self) -> Result<SimTiming, ConfigError> {
        Ok(SimTiming {
            arm_delay: Duration::from_millis(self.simulation.arm_delay_ms),
            run_time: Duration::from_millis(self.simulation.run_time_ms),
            trigger_wait: timeout_from_secs("shot_timeout_secs", self.shot_timeout_secs)?,
        })
    }
}

/// Convert a timeout in seconds, rejecting zero, negative, NaN and values too large for a
/// `Duration`
fn timeout_from_secs(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    if secs.is_nan() || secs <= 0.0 {
        return Err(invalid(field, "must be positive"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(field, &e.to_string()))
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
