pub mod event;
pub mod ingest;
pub mod model;
pub mod sink;

pub use event::{AnomalyEvent, AnomalyEventBuilder, AnomalyType, DeviceType};
pub use model::Reading;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory holding one eDNA export per feeder.
    pub dir: PathBuf,
    pub extension: String,
    /// Walk nested directories (monthly exports are grouped by month).
    pub recursive: bool,
    /// chrono format of the timestamp column, interpreted as UTC.
    pub timestamp_format: String,
    pub start_unit: usize,
    /// Inclusive; `None` scans through the last unit.
    pub end_unit: Option<usize>,
    /// Units scanned in parallel.
    pub jobs: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/edna"),
            extension: "csv".to_string(),
            recursive: false,
            timestamp_format: "%m/%d/%Y %I:%M:%S %p".to_string(),
            start_unit: 0,
            end_unit: None,
            jobs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub epoch_column: bool,
    pub header: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output/edna_anomalies.csv"),
            format: OutputFormat::Csv,
            epoch_column: true,
            header: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Csv,
    JsonLines,
}

/// Which feeder measurement points the windowed families accept, by the `BKR.` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeederGate {
    #[default]
    ExcludeBreaker,
    RequireBreaker,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub enabled: BTreeSet<AnomalyType>,
    pub window: WindowConfig,
    pub feeder_gate: FeederGate,
    pub fault_current: FaultCurrentTiers,
    #[serde(deserialize_with = "zero_band::current")]
    pub zero_current: ZeroSignalConfig,
    #[serde(deserialize_with = "zero_band::power")]
    pub zero_power: ZeroSignalConfig,
    #[serde(deserialize_with = "zero_band::voltage")]
    pub zero_voltage: ZeroSignalConfig,
    pub pf_spikes: PowerFactorConfig,
    pub thd_spikes: HarmonicConfig,
}

impl DetectionConfig {
    pub fn is_enabled(&self, anomaly_type: AnomalyType) -> bool {
        self.enabled.contains(&anomaly_type)
    }

    /// Same thresholds with only the given types enabled.
    pub fn only(types: &[AnomalyType]) -> Self {
        Self {
            enabled: types.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: AnomalyType::ALL.iter().copied().collect(),
            window: WindowConfig::default(),
            feeder_gate: FeederGate::default(),
            fault_current: FaultCurrentTiers::default(),
            zero_current: ZeroSignalConfig::current(),
            zero_power: ZeroSignalConfig::power(),
            zero_voltage: ZeroSignalConfig::voltage(),
            pf_spikes: PowerFactorConfig::default(),
            thd_spikes: HarmonicConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub capacity: usize,
    pub target_span_secs: i64,
}

impl WindowConfig {
    pub fn target_span(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.target_span_secs)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            target_span_secs: 86_400,
        }
    }
}

/// Fault-current tiers shared by AFS and FCI devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultCurrentTiers {
    pub temp: i64,
    pub full: i64,
    pub new: i64,
}

impl Default for FaultCurrentTiers {
    fn default() -> Self {
        Self {
            temp: 600,
            full: 900,
            new: 800,
        }
    }
}

/// A reading inside `(lower, upper)` fires V3 when at least `quantile` of the window is
/// `>= quantile_threshold`, and V4 when the previous sample is `>= previous_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroSignalConfig {
    pub lower: f64,
    pub upper: f64,
    pub quantile: f64,
    pub quantile_threshold: f64,
    pub previous_threshold: f64,
}

impl ZeroSignalConfig {
    pub fn current() -> Self {
        Self {
            lower: -0.5,
            upper: 1.0,
            quantile: 0.01,
            quantile_threshold: 10.0,
            previous_threshold: 1.0,
        }
    }

    pub fn power() -> Self {
        Self {
            lower: -0.5,
            upper: 0.1,
            quantile: 0.01,
            quantile_threshold: 0.5,
            previous_threshold: 0.1,
        }
    }

    pub fn voltage() -> Self {
        Self {
            lower: -0.5,
            upper: 1.0,
            quantile: 0.01,
            quantile_threshold: 90.0,
            previous_threshold: 1.0,
        }
    }
}

/// Partial band settings merged over the defaults of the band they configure.
mod zero_band {
    use super::ZeroSignalConfig;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    struct Overrides {
        lower: Option<f64>,
        upper: Option<f64>,
        quantile: Option<f64>,
        quantile_threshold: Option<f64>,
        previous_threshold: Option<f64>,
    }

    fn merge<'de, D: Deserializer<'de>>(
        deserializer: D,
        base: ZeroSignalConfig,
    ) -> Result<ZeroSignalConfig, D::Error> {
        let overrides = Overrides::deserialize(deserializer)?;
        Ok(ZeroSignalConfig {
            lower: overrides.lower.unwrap_or(base.lower),
            upper: overrides.upper.unwrap_or(base.upper),
            quantile: overrides.quantile.unwrap_or(base.quantile),
            quantile_threshold: overrides.quantile_threshold.unwrap_or(base.quantile_threshold),
            previous_threshold: overrides.previous_threshold.unwrap_or(base.previous_threshold),
        })
    }

    pub fn current<'de, D: Deserializer<'de>>(d: D) -> Result<ZeroSignalConfig, D::Error> {
        merge(d, ZeroSignalConfig::current())
    }

    pub fn power<'de, D: Deserializer<'de>>(d: D) -> Result<ZeroSignalConfig, D::Error> {
        merge(d, ZeroSignalConfig::power())
    }

    pub fn voltage<'de, D: Deserializer<'de>>(d: D) -> Result<ZeroSignalConfig, D::Error> {
        merge(d, ZeroSignalConfig::voltage())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFactorConfig {
    pub below: f64,
    pub quantile: f64,
    pub threshold: f64,
}

impl Default for PowerFactorConfig {
    fn default() -> Self {
        Self {
            below: 0.75,
            quantile: 0.01,
            threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicConfig {
    pub sigma: f64,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self { sigma: 7.0 }
    }
}
