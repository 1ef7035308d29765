use crate::signal::{Measurement, SignalReading};
use crate::store::{WindowFamily, WindowStore};
use crate::AnomalyDetector;
use grid_core::{
    AnomalyEvent, AnomalyType, DetectionConfig, DeviceType, FaultCurrentTiers, FeederGate,
    HarmonicConfig, PowerFactorConfig, ZeroSignalConfig,
};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
enum StatusMatch {
    Contains(&'static str),
    Lacks(&'static str),
}

impl StatusMatch {
    fn matches(&self, reading: &SignalReading<'_>) -> bool {
        match self {
            StatusMatch::Contains(pattern) => reading.status_contains(pattern),
            StatusMatch::Lacks(pattern) => !reading.status_contains(pattern),
        }
    }
}

/// Status-driven alarm on a field device.
#[derive(Debug, Clone, Copy)]
struct AlarmGate {
    anomaly_type: AnomalyType,
    marker: &'static str,
    status: StatusMatch,
}

#[derive(Debug, Clone, Copy)]
struct FaultCurrentTypes {
    temp: AnomalyType,
    full: AnomalyType,
    new: AnomalyType,
}

/// AFS and FCI devices. Alarm gates are tried in order and the first match ends
/// evaluation; fault-current tiers are only reached when no alarm fired.
pub struct FieldDeviceRule {
    device_type: DeviceType,
    family_marker: &'static str,
    alarms: Vec<AlarmGate>,
    fault_types: FaultCurrentTypes,
    tiers: FaultCurrentTiers,
    enabled_faults: [bool; 3],
}

impl FieldDeviceRule {
    pub fn afs(config: &DetectionConfig) -> Option<Self> {
        Self::build(
            config,
            DeviceType::Afs,
            ".AFS.",
            &[
                AlarmGate {
                    anomaly_type: AnomalyType::AfsAlarmAlarm,
                    marker: ".ALARM",
                    status: StatusMatch::Contains("ALARM"),
                },
                AlarmGate {
                    anomaly_type: AnomalyType::AfsGroundAlarm,
                    marker: ".GROUND",
                    status: StatusMatch::Contains("ALARM"),
                },
            ],
            FaultCurrentTypes {
                temp: AnomalyType::AfsIFaultTemp,
                full: AnomalyType::AfsIFaultFull,
                new: AnomalyType::AfsIFaultNew,
            },
        )
    }

    pub fn fci(config: &DetectionConfig) -> Option<Self> {
        Self::build(
            config,
            DeviceType::Fci,
            ".FCI.",
            &[AlarmGate {
                anomaly_type: AnomalyType::FciFaultAlarm,
                marker: ".FAULT",
                status: StatusMatch::Lacks("NORMAL"),
            }],
            FaultCurrentTypes {
                temp: AnomalyType::FciIFaultTemp,
                full: AnomalyType::FciIFaultFull,
                new: AnomalyType::FciIFaultNew,
            },
        )
    }

    fn build(
        config: &DetectionConfig,
        device_type: DeviceType,
        family_marker: &'static str,
        alarms: &[AlarmGate],
        fault_types: FaultCurrentTypes,
    ) -> Option<Self> {
        let alarms: Vec<AlarmGate> = alarms
            .iter()
            .copied()
            .filter(|gate| config.is_enabled(gate.anomaly_type))
            .collect();
        let enabled_faults = [
            config.is_enabled(fault_types.temp),
            config.is_enabled(fault_types.full),
            config.is_enabled(fault_types.new),
        ];

        if alarms.is_empty() && !enabled_faults.contains(&true) {
            return None;
        }

        Some(Self {
            device_type,
            family_marker,
            alarms,
            fault_types,
            tiers: config.fault_current.clone(),
            enabled_faults,
        })
    }

    fn emit(&self, reading: &SignalReading<'_>, anomaly_type: AnomalyType, value: i64, out: &mut Vec<AnomalyEvent>) {
        out.push(reading.event(
            anomaly_type,
            self.device_type,
            reading.field_device_id(),
            value.to_string(),
        ));
    }
}

impl AnomalyDetector for FieldDeviceRule {
    fn name(&self) -> &'static str {
        match self.device_type {
            DeviceType::Fci => "fci",
            _ => "afs",
        }
    }

    fn detect(&self, reading: &SignalReading<'_>, _windows: &mut WindowStore, out: &mut Vec<AnomalyEvent>) {
        if !reading.contains(self.family_marker) {
            return;
        }
        let value = reading.integer_value();

        if let Some(gate) = self
            .alarms
            .iter()
            .find(|gate| reading.contains(gate.marker) && gate.status.matches(reading))
        {
            self.emit(reading, gate.anomaly_type, value, out);
            return;
        }

        let [temp_enabled, full_enabled, new_enabled] = self.enabled_faults;
        if !reading.contains(".I_FAULT") {
            return;
        }

        if value >= self.tiers.temp {
            if value >= self.tiers.full {
                if full_enabled {
                    self.emit(reading, self.fault_types.full, value, out);
                }
            } else if temp_enabled {
                self.emit(reading, self.fault_types.temp, value, out);
            }
        }
        if new_enabled && value >= self.tiers.new {
            self.emit(reading, self.fault_types.new, value, out);
        }
    }
}

/// Zero current, power and voltage: a near-zero reading right after activity.
pub struct ZeroSignalRule {
    family: WindowFamily,
    measurement: Measurement,
    gate: FeederGate,
    band: ZeroSignalConfig,
    windowed: Option<AnomalyType>,
    previous: Option<AnomalyType>,
}

impl ZeroSignalRule {
    pub fn current(config: &DetectionConfig) -> Option<Self> {
        Self::build(
            config,
            WindowFamily::ZeroCurrent,
            Measurement::Current,
            &config.zero_current,
            AnomalyType::ZeroCurrentV3,
            AnomalyType::ZeroCurrentV4,
        )
    }

    pub fn power(config: &DetectionConfig) -> Option<Self> {
        Self::build(
            config,
            WindowFamily::ZeroPower,
            Measurement::RealPower,
            &config.zero_power,
            AnomalyType::ZeroPowerV3,
            AnomalyType::ZeroPowerV4,
        )
    }

    pub fn voltage(config: &DetectionConfig) -> Option<Self> {
        Self::build(
            config,
            WindowFamily::ZeroVoltage,
            Measurement::Voltage,
            &config.zero_voltage,
            AnomalyType::ZeroVoltageV3,
            AnomalyType::ZeroVoltageV4,
        )
    }

    fn build(
        config: &DetectionConfig,
        family: WindowFamily,
        measurement: Measurement,
        band: &ZeroSignalConfig,
        windowed: AnomalyType,
        previous: AnomalyType,
    ) -> Option<Self> {
        let windowed = Some(windowed).filter(|t| config.is_enabled(*t));
        let previous = Some(previous).filter(|t| config.is_enabled(*t));
        if windowed.is_none() && previous.is_none() {
            return None;
        }

        Some(Self {
            family,
            measurement,
            gate: config.feeder_gate,
            band: band.clone(),
            windowed,
            previous,
        })
    }
}

impl AnomalyDetector for ZeroSignalRule {
    fn name(&self) -> &'static str {
        match self.family {
            WindowFamily::ZeroPower => "zero_power",
            WindowFamily::ZeroVoltage => "zero_voltage",
            _ => "zero_current",
        }
    }

    fn detect(&self, reading: &SignalReading<'_>, windows: &mut WindowStore, out: &mut Vec<AnomalyEvent>) {
        if !reading.measures(self.measurement) || !reading.is_feeder_point(self.gate) {
            return;
        }

        let value = reading.value();
        let (key, window) = windows.window_mut(self.family, reading.signal_id());
        window.push(reading.reading().timestamp, key, value);
        window.maintain_span();

        if value <= self.band.lower || value >= self.band.upper {
            return;
        }

        if let Some(anomaly_type) = self.windowed {
            let fraction = window.quantile_at_or_above(self.band.quantile_threshold);
            if fraction >= self.band.quantile {
                trace!(signal = reading.signal_id(), fraction, "{} window active", anomaly_type);
                out.push(reading.event(
                    anomaly_type,
                    DeviceType::Phaser,
                    reading.phaser_device_id(),
                    format!("{:.3}", value),
                ));
            }
        }

        if let Some(anomaly_type) = self.previous {
            if window.is_at_or_above_relative(1, self.band.previous_threshold) {
                out.push(reading.event(
                    anomaly_type,
                    DeviceType::Phaser,
                    reading.phaser_device_id(),
                    format!("{:.3}", value),
                ));
            }
        }
    }
}

/// Low power factor while the window shows normal operation. The window holds absolute
/// values; the event keeps the signed reading.
pub struct PowerFactorRule {
    gate: FeederGate,
    config: PowerFactorConfig,
}

impl PowerFactorRule {
    pub fn new(config: &DetectionConfig) -> Option<Self> {
        config.is_enabled(AnomalyType::PfSpikesV3).then(|| Self {
            gate: config.feeder_gate,
            config: config.pf_spikes.clone(),
        })
    }
}

impl AnomalyDetector for PowerFactorRule {
    fn name(&self) -> &'static str {
        "pf_spikes"
    }

    fn detect(&self, reading: &SignalReading<'_>, windows: &mut WindowStore, out: &mut Vec<AnomalyEvent>) {
        if !reading.measures(Measurement::PowerFactor) || !reading.is_feeder_point(self.gate) {
            return;
        }

        let value = reading.value();
        let magnitude = value.abs();
        let (key, window) = windows.window_mut(WindowFamily::PfSpikes, reading.signal_id());
        window.push(reading.reading().timestamp, key, magnitude);
        window.maintain_span();

        if magnitude < self.config.below
            && window.quantile_at_or_above(self.config.threshold) >= self.config.quantile
        {
            out.push(reading.event(
                AnomalyType::PfSpikesV3,
                DeviceType::Phaser,
                reading.phaser_device_id(),
                format!("{:.3}", value),
            ));
        }
    }
}

/// Current harmonic distortion above `mean + sigma * std` of its window, the new
/// sample included.
pub struct HarmonicSpikeRule {
    config: HarmonicConfig,
}

impl HarmonicSpikeRule {
    pub fn new(config: &DetectionConfig) -> Option<Self> {
        config.is_enabled(AnomalyType::ThdSpikesV3).then(|| Self {
            config: config.thd_spikes.clone(),
        })
    }
}

impl AnomalyDetector for HarmonicSpikeRule {
    fn name(&self) -> &'static str {
        "thd_spikes"
    }

    fn detect(&self, reading: &SignalReading<'_>, windows: &mut WindowStore, out: &mut Vec<AnomalyEvent>) {
        if !reading.is_current_harmonic() {
            return;
        }

        let value = reading.value();
        let (key, window) = windows.window_mut(WindowFamily::ThdSpikes, reading.signal_id());
        window.push(reading.reading().timestamp, key, value);
        window.maintain_span();

        let (Some(mean), Some(std_dev)) = (window.mean(), window.std_dev()) else {
            return;
        };
        let threshold = mean + self.config.sigma * std_dev;
        if value > threshold {
            trace!(signal = reading.signal_id(), mean, std_dev, "harmonic spike");
            out.push(reading.event(
                AnomalyType::ThdSpikesV3,
                DeviceType::Phaser,
                reading.phaser_device_id(),
                format!("{:.3}", value),
            ));
        }
    }
}
