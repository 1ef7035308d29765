use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for identity segments that could not be extracted.
pub const MISSING: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    AfsAlarmAlarm,
    AfsGroundAlarm,
    AfsIFaultTemp,
    AfsIFaultFull,
    AfsIFaultNew,
    FciFaultAlarm,
    FciIFaultTemp,
    FciIFaultFull,
    FciIFaultNew,
    ZeroCurrentV3,
    ZeroCurrentV4,
    ZeroPowerV3,
    ZeroPowerV4,
    ZeroVoltageV3,
    ZeroVoltageV4,
    PfSpikesV3,
    ThdSpikesV3,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 17] = [
        AnomalyType::AfsAlarmAlarm,
        AnomalyType::AfsGroundAlarm,
        AnomalyType::AfsIFaultTemp,
        AnomalyType::AfsIFaultFull,
        AnomalyType::AfsIFaultNew,
        AnomalyType::FciFaultAlarm,
        AnomalyType::FciIFaultTemp,
        AnomalyType::FciIFaultFull,
        AnomalyType::FciIFaultNew,
        AnomalyType::ZeroCurrentV3,
        AnomalyType::ZeroCurrentV4,
        AnomalyType::ZeroPowerV3,
        AnomalyType::ZeroPowerV4,
        AnomalyType::ZeroVoltageV3,
        AnomalyType::ZeroVoltageV4,
        AnomalyType::PfSpikesV3,
        AnomalyType::ThdSpikesV3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::AfsAlarmAlarm => "AFS_ALARM_ALARM",
            AnomalyType::AfsGroundAlarm => "AFS_GROUND_ALARM",
            AnomalyType::AfsIFaultTemp => "AFS_I_FAULT_TEMP",
            AnomalyType::AfsIFaultFull => "AFS_I_FAULT_FULL",
            AnomalyType::AfsIFaultNew => "AFS_I_FAULT_NEW",
            AnomalyType::FciFaultAlarm => "FCI_FAULT_ALARM",
            AnomalyType::FciIFaultTemp => "FCI_I_FAULT_TEMP",
            AnomalyType::FciIFaultFull => "FCI_I_FAULT_FULL",
            AnomalyType::FciIFaultNew => "FCI_I_FAULT_NEW",
            AnomalyType::ZeroCurrentV3 => "ZERO_CURRENT_V3",
            AnomalyType::ZeroCurrentV4 => "ZERO_CURRENT_V4",
            AnomalyType::ZeroPowerV3 => "ZERO_POWER_V3",
            AnomalyType::ZeroPowerV4 => "ZERO_POWER_V4",
            AnomalyType::ZeroVoltageV3 => "ZERO_VOLTAGE_V3",
            AnomalyType::ZeroVoltageV4 => "ZERO_VOLTAGE_V4",
            AnomalyType::PfSpikesV3 => "PF_SPIKES_V3",
            AnomalyType::ThdSpikesV3 => "THD_SPIKES_V3",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Afs,
    Fci,
    Phaser,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Afs => "AFS",
            DeviceType::Fci => "FCI",
            DeviceType::Phaser => "PHASER",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected anomaly on one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub anomaly_type: AnomalyType,
    pub device_id: String,
    pub device_phase: String,
    pub device_type: DeviceType,
    pub feeder_id: String,
    pub signal_id: String,
    pub value_text: String,
    pub timestamp: DateTime<Utc>,
    pub epoch_seconds: i64,
}

impl AnomalyEvent {
    /// Column names of [`AnomalyEvent::to_record`].
    pub fn header(epoch_column: bool) -> Vec<&'static str> {
        let mut header = vec![
            "id",
            "anomaly",
            "device_id",
            "device_phase",
            "device_type",
            "feeder_id",
            "signal",
            "value",
            "time",
        ];
        if epoch_column {
            header.push("epoch_time");
        }
        header
    }

    /// `2015-01-01 00:03:07 +0000 UTC`
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S %z UTC").to_string()
    }

    /// Fixed-arity output record. No event key is generated, so `id` is always `0`.
    pub fn to_record(&self, epoch_column: bool) -> Vec<String> {
        let mut record = vec![
            "0".to_string(),
            self.anomaly_type.to_string(),
            self.device_id.clone(),
            self.device_phase.clone(),
            self.device_type.to_string(),
            self.feeder_id.clone(),
            self.signal_id.clone(),
            self.value_text.clone(),
            self.timestamp_text(),
        ];
        if epoch_column {
            record.push(self.epoch_seconds.to_string());
        }
        record
    }
}

pub struct AnomalyEventBuilder {
    anomaly_type: AnomalyType,
    device_type: DeviceType,
    signal_id: String,
    timestamp: DateTime<Utc>,
    device_id: Option<String>,
    device_phase: Option<String>,
    feeder_id: Option<String>,
    value_text: Option<String>,
}

impl AnomalyEventBuilder {
    pub fn new(
        anomaly_type: AnomalyType,
        device_type: DeviceType,
        signal_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            anomaly_type,
            device_type,
            signal_id: signal_id.into(),
            timestamp,
            device_id: None,
            device_phase: None,
            feeder_id: None,
            value_text: None,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.device_phase = Some(phase.into());
        self
    }

    pub fn with_feeder(mut self, feeder_id: impl Into<String>) -> Self {
        self.feeder_id = Some(feeder_id.into());
        self
    }

    pub fn with_value(mut self, value_text: impl Into<String>) -> Self {
        self.value_text = Some(value_text.into());
        self
    }

    pub fn build(self) -> AnomalyEvent {
        let missing = || MISSING.to_string();
        AnomalyEvent {
            anomaly_type: self.anomaly_type,
            device_id: self.device_id.unwrap_or_else(missing),
            device_phase: self.device_phase.unwrap_or_else(missing),
            device_type: self.device_type,
            feeder_id: self.feeder_id.unwrap_or_else(missing),
            signal_id: self.signal_id,
            value_text: self.value_text.unwrap_or_else(missing),
            epoch_seconds: self.timestamp.timestamp(),
            timestamp: self.timestamp,
        }
    }
}
