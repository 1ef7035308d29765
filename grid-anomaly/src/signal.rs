//! Structural reading of a signal identity.
//!
//! Identities are dot-delimited, e.g. `DAYTONA.803036.AFS.AFS1234.I_FAULT` for a field
//! device or `DAYTONA.FDR.803036_P1.I.A_PH` for a feeder phaser. Segments that are
//! missing yield [`MISSING`] rather than an error.

use grid_core::event::MISSING;
use grid_core::{AnomalyEvent, AnomalyEventBuilder, AnomalyType, DeviceType, FeederGate, Reading};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FEEDER_PATTERN: Regex = Regex::new(r"\.([0-9]{6})[\._]").unwrap();
    static ref PHASE_PATTERN: Regex = Regex::new(r"\.([ABC\-])_PH").unwrap();
}

/// Feeder-level measurement kinds with a windowed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Current,
    RealPower,
    Voltage,
    PowerFactor,
}

impl Measurement {
    fn markers(&self) -> &'static [&'static str] {
        match self {
            Measurement::Current => &[".I.", "_PH"],
            Measurement::RealPower => &[".MW"],
            Measurement::Voltage => &[".V.", "_PH"],
            Measurement::PowerFactor => &[".PF.", "_PH"],
        }
    }
}

/// A reading together with the identity queries the detectors gate on.
#[derive(Debug, Clone, Copy)]
pub struct SignalReading<'a> {
    reading: &'a Reading,
}

impl<'a> SignalReading<'a> {
    pub fn new(reading: &'a Reading) -> Self {
        Self { reading }
    }

    pub fn reading(&self) -> &'a Reading {
        self.reading
    }

    pub fn signal_id(&self) -> &'a str {
        &self.reading.signal_id
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.reading.signal_id.contains(pattern)
    }

    pub fn status_contains(&self, pattern: &str) -> bool {
        self.reading.status_text.contains(pattern)
    }

    pub fn value(&self) -> f64 {
        self.reading.value()
    }

    pub fn integer_value(&self) -> i64 {
        self.reading.integer_value()
    }

    /// Fourth dot segment, the device tag of AFS and FCI identities.
    pub fn field_device_id(&self) -> &'a str {
        self.signal_id().split('.').nth(3).unwrap_or(MISSING)
    }

    /// Part after the first underscore of the third dot segment (`803036_P1` -> `P1`).
    pub fn phaser_device_id(&self) -> &'a str {
        self.signal_id()
            .split('.')
            .nth(2)
            .and_then(|segment| segment.split('_').nth(1))
            .unwrap_or(MISSING)
    }

    /// Six-digit feeder number followed by `.` or `_`.
    pub fn feeder_id(&self) -> &'a str {
        FEEDER_PATTERN
            .captures(self.signal_id())
            .and_then(|caps| caps.get(1))
            .map_or(MISSING, |m| m.as_str())
    }

    pub fn phase(&self) -> &'a str {
        PHASE_PATTERN
            .captures(self.signal_id())
            .and_then(|caps| caps.get(1))
            .map_or(MISSING, |m| m.as_str())
    }

    pub fn is_feeder_point(&self, gate: FeederGate) -> bool {
        if !self.contains(".FDR.") {
            return false;
        }
        match gate {
            FeederGate::ExcludeBreaker => !self.contains("BKR."),
            FeederGate::RequireBreaker => self.contains("BKR."),
            FeederGate::Any => true,
        }
    }

    pub fn measures(&self, measurement: Measurement) -> bool {
        measurement.markers().iter().all(|marker| self.contains(marker))
    }

    /// Harmonic distortion of a current channel (`...THD_Current...`).
    pub fn is_current_harmonic(&self) -> bool {
        self.contains(".THD_") && self.contains("urrent")
    }

    pub fn event(
        &self,
        anomaly_type: AnomalyType,
        device_type: DeviceType,
        device_id: &str,
        value_text: String,
    ) -> AnomalyEvent {
        AnomalyEventBuilder::new(anomaly_type, device_type, self.signal_id(), self.reading.timestamp)
            .with_device_id(device_id)
            .with_phase(self.phase())
            .with_feeder(self.feeder_id())
            .with_value(value_text)
            .build()
    }
}
