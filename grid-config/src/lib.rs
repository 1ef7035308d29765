use config::{Config, Environment, File};
use grid_core::{GridError, Result, ScanConfig, ZeroSignalConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variables override file settings, e.g. `GRID_SCAN__INPUT__JOBS=4`.
pub const ENV_PREFIX: &str = "GRID_SCAN";
const ENV_SEPARATOR: &str = "__";

pub struct ConfigManager {
    /// File the configuration was read from, `None` for environment only.
    source: Option<PathBuf>,
    scan_config: ScanConfig,
}

impl ConfigManager {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let scan_config = build(Some(path))?;
        info!("Configuration loaded from {}", path.display());

        Ok(Self {
            source: Some(path.to_path_buf()),
            scan_config,
        })
    }

    pub fn from_env() -> Result<Self> {
        let scan_config = build(None)?;
        info!("Configuration loaded from environment");

        Ok(Self {
            source: None,
            scan_config,
        })
    }

    /// The given file if any, otherwise defaults plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    pub fn get_config(&self) -> &ScanConfig {
        &self.scan_config
    }

    pub fn get_config_mut(&mut self) -> &mut ScanConfig {
        &mut self.scan_config
    }

    pub fn into_config(self) -> ScanConfig {
        self.scan_config
    }

    /// Read the file and environment again, discarding in-memory edits.
    pub fn reload(&mut self) -> Result<()> {
        self.scan_config = build(self.source.as_deref())?;
        info!("Configuration reloaded");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let input = &self.scan_config.input;
        if input.extension.is_empty() {
            return invalid("input.extension must not be empty");
        }
        if input.timestamp_format.is_empty() {
            return invalid("input.timestamp_format must not be empty");
        }
        if input.jobs == 0 {
            return invalid("input.jobs must be at least 1");
        }
        if let Some(end) = input.end_unit {
            if end < input.start_unit {
                return invalid(format!(
                    "input.end_unit ({}) is before input.start_unit ({})",
                    end, input.start_unit
                ));
            }
        }

        let detection = &self.scan_config.detection;
        if detection.enabled.is_empty() {
            return invalid("detection.enabled must name at least one anomaly type");
        }
        if detection.window.capacity == 0 {
            return invalid("detection.window.capacity must be positive");
        }
        if detection.window.target_span_secs <= 0 {
            return invalid("detection.window.target_span_secs must be positive");
        }
        if detection.fault_current.temp > detection.fault_current.full {
            return invalid("detection.fault_current.temp must not exceed full");
        }

        for (name, band) in [
            ("zero_current", &detection.zero_current),
            ("zero_power", &detection.zero_power),
            ("zero_voltage", &detection.zero_voltage),
        ] {
            validate_band(name, band)?;
        }

        if !valid_quantile(detection.pf_spikes.quantile) {
            return invalid("detection.pf_spikes.quantile must be in (0, 1]");
        }
        if detection.pf_spikes.below <= 0.0 {
            return invalid("detection.pf_spikes.below must be positive");
        }
        if detection.thd_spikes.sigma.is_nan() || detection.thd_spikes.sigma < 0.0 {
            return invalid("detection.thd_spikes.sigma must be non-negative");
        }

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.scan_config)
            .map_err(|e| GridError::Configuration(e.to_string()))?;

        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| GridError::Configuration(e.to_string()))?;

        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}

fn build(path: Option<&Path>) -> Result<ScanConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    builder
        .add_source(environment())
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| GridError::Configuration(e.to_string()))
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(GridError::Configuration(message.into()))
}

fn valid_quantile(quantile: f64) -> bool {
    quantile > 0.0 && quantile <= 1.0
}

fn validate_band(name: &str, band: &ZeroSignalConfig) -> Result<()> {
    if band.lower >= band.upper {
        return invalid(format!("detection.{}: lower must be below upper", name));
    }
    if !valid_quantile(band.quantile) {
        return invalid(format!("detection.{}.quantile must be in (0, 1]", name));
    }
    Ok(())
}
