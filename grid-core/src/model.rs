use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tokenized telemetry sample, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub signal_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_value: String,
    pub status_text: String,
}

impl Reading {
    pub fn new(
        signal_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        raw_value: impl Into<String>,
        status_text: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            timestamp,
            raw_value: raw_value.into(),
            status_text: status_text.into(),
        }
    }

    /// Numeric value, `0.0` when the raw text is not a number.
    pub fn value(&self) -> f64 {
        self.raw_value.trim().parse().unwrap_or(0.0)
    }

    /// Integral value for counter-style signals; fractional text is truncated and
    /// anything unparseable reads as `0`.
    pub fn integer_value(&self) -> i64 {
        let raw = self.raw_value.trim();
        raw.parse::<i64>()
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(|v| v.trunc() as i64)
            })
            .unwrap_or(0)
    }
}
