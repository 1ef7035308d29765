use crate::detector::{FieldDeviceRule, HarmonicSpikeRule, PowerFactorRule, ZeroSignalRule};
use crate::signal::SignalReading;
use crate::store::WindowStore;
use crate::AnomalyDetector;
use grid_core::{AnomalyEvent, DetectionConfig, Reading};
use tracing::{debug, info};

/// Runs every enabled rule family against each reading, in catalog order.
pub struct SignalClassifier {
    detectors: Vec<Box<dyn AnomalyDetector>>,
    config: DetectionConfig,
}

impl SignalClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        let mut detectors: Vec<Box<dyn AnomalyDetector>> = Vec::new();

        if let Some(rule) = FieldDeviceRule::afs(&config) {
            detectors.push(Box::new(rule));
        }
        if let Some(rule) = FieldDeviceRule::fci(&config) {
            detectors.push(Box::new(rule));
        }
        if let Some(rule) = ZeroSignalRule::current(&config) {
            detectors.push(Box::new(rule));
        }
        if let Some(rule) = PowerFactorRule::new(&config) {
            detectors.push(Box::new(rule));
        }
        if let Some(rule) = ZeroSignalRule::power(&config) {
            detectors.push(Box::new(rule));
        }
        if let Some(rule) = ZeroSignalRule::voltage(&config) {
            detectors.push(Box::new(rule));
        }
        if let Some(rule) = HarmonicSpikeRule::new(&config) {
            detectors.push(Box::new(rule));
        }

        info!(
            "Signal classifier ready with {} rule families: {}",
            detectors.len(),
            detectors
                .iter()
                .map(|d| d.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self { detectors, config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// A store sized for this classifier's windows.
    pub fn new_store(&self) -> WindowStore {
        WindowStore::new(self.config.window.clone())
    }

    pub fn classify_into(&self, reading: &Reading, windows: &mut WindowStore, out: &mut Vec<AnomalyEvent>) {
        let signal = SignalReading::new(reading);
        let before = out.len();

        for detector in &self.detectors {
            detector.detect(&signal, windows, out);
        }

        for event in &out[before..] {
            debug!(
                signal = %event.signal_id,
                value = %event.value_text,
                epoch = event.epoch_seconds,
                "Candidate {}",
                event.anomaly_type
            );
        }
    }

    pub fn classify(&self, reading: &Reading, windows: &mut WindowStore) -> Vec<AnomalyEvent> {
        let mut out = Vec::new();
        self.classify_into(reading, windows, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use grid_core::AnomalyType;

    #[test]
    fn test_only_enabled_families_are_built() {
        let classifier = SignalClassifier::new(DetectionConfig::only(&[
            AnomalyType::ZeroCurrentV4,
            AnomalyType::ThdSpikesV3,
        ]));
        let names: Vec<&str> = classifier.detectors.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["zero_current", "thd_spikes"]);

        let classifier = SignalClassifier::new(DetectionConfig::default());
        assert_eq!(classifier.detectors.len(), 7);
    }

    #[test]
    fn test_unmatched_reading_touches_nothing() {
        let classifier = SignalClassifier::new(DetectionConfig::default());
        let mut windows = classifier.new_store();
        let ts = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();

        let reading = Reading::new("DAYTONA.SUB.TEMPERATURE", ts, "31.2", "OK");
        assert!(classifier.classify(&reading, &mut windows).is_empty());
        assert!(windows.is_empty());
    }
}
