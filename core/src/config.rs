//! Serializable configuration for the estimator and the closed-loop simulation.
//!
//! Configurations can be written and read as JSON, YAML, or TOML. The generic [EstimatorConfig::to_file] and
//! [EstimatorConfig::from_file] (and the [SimulationConfig] equivalents) choose the format from the file
//! extension. Every field has a default so partial files are accepted.
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::estimator::AltitudeEstimator;
use crate::params::EstimatorParams;
use crate::ticks::{DEFAULT_MAX_SAMPLE_AGE_MS, DEFAULT_TICK_RATE_HZ, Tick, ms_to_ticks};

fn default_max_sample_age_ms() -> u32 {
    DEFAULT_MAX_SAMPLE_AGE_MS
}
fn default_tick_rate_hz() -> u32 {
    DEFAULT_TICK_RATE_HZ
}
fn default_dt() -> f64 {
    0.01
}
fn default_duration_s() -> f64 {
    70.0
}
fn default_baro_noise_std_m() -> f64 {
    0.1
}
fn default_seed() -> u64 {
    42
}

/// Estimator configuration: coefficients plus the freshness gate settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Maximum age of a range sample before it is stale (milliseconds)
    #[serde(default = "default_max_sample_age_ms")]
    pub max_sample_age_ms: u32,
    /// Scheduler tick rate (ticks per second)
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,
    /// Filter coefficients
    #[serde(default)]
    pub params: EstimatorParams,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            max_sample_age_ms: default_max_sample_age_ms(),
            tick_rate_hz: default_tick_rate_hz(),
            params: EstimatorParams::default(),
        }
    }
}

impl EstimatorConfig {
    /// Maximum sample age converted to scheduler ticks
    pub fn max_sample_age_ticks(&self) -> Tick {
        ms_to_ticks(self.max_sample_age_ms, self.tick_rate_hz)
    }

    /// Build an estimator at rest from this configuration
    pub fn build(&self) -> AltitudeEstimator {
        AltitudeEstimator::new(self.params).with_max_sample_age(self.max_sample_age_ticks())
    }

    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_json(self, path)
    }
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_json(path)
    }
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_yaml(self, path)
    }
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_yaml(path)
    }
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_toml(self, path)
    }
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_toml(path)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_by_extension(self, path.as_ref())
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_by_extension(path.as_ref())
    }
}

/// Closed-loop simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Control loop period (s)
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Total simulated time (s)
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
    /// Standard deviation of the simulated barometer noise (m)
    #[serde(default = "default_baro_noise_std_m")]
    pub baro_noise_std_m: f64,
    /// Constant offset of the simulated barometer from the true altitude (m)
    #[serde(default)]
    pub baro_offset_m: f64,
    /// Random number generator seed for the barometer noise
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Time at which the simulated range sensor stops producing samples (s); never when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_dropout_s: Option<f64>,
    /// Estimator under test
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            dt: default_dt(),
            duration_s: default_duration_s(),
            baro_noise_std_m: default_baro_noise_std_m(),
            baro_offset_m: 0.0,
            seed: default_seed(),
            range_dropout_s: None,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Number of control ticks needed to cover `duration_s`
    pub fn steps(&self) -> usize {
        if self.dt > 0.0 && self.duration_s > 0.0 {
            (self.duration_s / self.dt).round() as usize
        } else {
            0
        }
    }

    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_json(self, path)
    }
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_json(path)
    }
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_yaml(self, path)
    }
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_yaml(path)
    }
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_toml(self, path)
    }
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_toml(path)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        write_by_extension(self, path.as_ref())
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        read_by_extension(path.as_ref())
    }
}

fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value).map_err(io::Error::other)
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(file).map_err(io::Error::other)
}

fn write_yaml<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let mut file = File::create(path)?;
    let s = serde_yaml::to_string(value).map_err(io::Error::other)?;
    file.write_all(s.as_bytes())
}

fn read_yaml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let file = File::open(path)?;
    serde_yaml::from_reader(file).map_err(io::Error::other)
}

fn write_toml<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let mut file = File::create(path)?;
    let s = toml::to_string(value).map_err(io::Error::other)?;
    file.write_all(s.as_bytes())
}

fn read_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let mut s = String::new();
    let mut file = File::open(path)?;
    file.read_to_string(&mut s)?;
    toml::from_str(&s).map_err(io::Error::other)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "unsupported file extension")
}

fn write_by_extension<T: Serialize>(value: &T, path: &Path) -> io::Result<()> {
    match extension(path).as_deref() {
        Some("json") => write_json(value, path),
        Some("yaml") | Some("yml") => write_yaml(value, path),
        Some("toml") => write_toml(value, path),
        _ => Err(unsupported_extension()),
    }
}

fn read_by_extension<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    match extension(path).as_deref() {
        Some("json") => read_json(path),
        Some("yaml") | Some("yml") => read_yaml(path),
        Some("toml") => read_toml(path),
        _ => Err(unsupported_extension()),
    }
}
