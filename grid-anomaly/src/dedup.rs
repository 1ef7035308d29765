use grid_core::{AnomalyEvent, AnomalyType};
use std::collections::HashMap;
use tracing::debug;

/// Minimum gap between two emitted events of the same type on the same signal.
pub const REFRACTORY_SECS: i64 = 180;

/// Last emitted epoch per `(anomaly type, signal)` within one processing unit.
#[derive(Debug, Default)]
pub struct Deduplicator {
    last_emitted: HashMap<AnomalyType, HashMap<String, i64>>,
    suppressed: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `event` clears the refractory period, recording it if so.
    fn admit(&mut self, event: &AnomalyEvent) -> bool {
        let by_signal = self.last_emitted.entry(event.anomaly_type).or_default();
        match by_signal.get_mut(event.signal_id.as_str()) {
            Some(last) if event.epoch_seconds - *last < REFRACTORY_SECS => false,
            Some(last) => {
                *last = event.epoch_seconds;
                true
            }
            None => {
                by_signal.insert(event.signal_id.clone(), event.epoch_seconds);
                true
            }
        }
    }

    /// Order candidates by `(epoch, phase)` and drop those inside the refractory period
    /// of the last emitted event for their key. The sort is stable, so ties keep
    /// detection order.
    pub fn filter(&mut self, mut candidates: Vec<AnomalyEvent>) -> Vec<AnomalyEvent> {
        candidates.sort_by(|a, b| {
            a.epoch_seconds
                .cmp(&b.epoch_seconds)
                .then_with(|| a.device_phase.cmp(&b.device_phase))
        });

        let total = candidates.len();
        let emitted: Vec<AnomalyEvent> = candidates
            .into_iter()
            .filter(|event| self.admit(event))
            .collect();

        let suppressed = total - emitted.len();
        self.suppressed += suppressed;
        debug!(total, emitted = emitted.len(), suppressed, "Deduplicated candidates");
        emitted
    }

    /// Candidates dropped so far.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

/// One-shot deduplication with fresh state.
pub fn deduplicate(candidates: Vec<AnomalyEvent>) -> Vec<AnomalyEvent> {
    Deduplicator::new().filter(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use grid_core::{AnomalyEventBuilder, DeviceType};

    fn candidate(anomaly_type: AnomalyType, signal: &str, phase: &str, epoch: i64) -> AnomalyEvent {
        AnomalyEventBuilder::new(
            anomaly_type,
            DeviceType::Phaser,
            signal,
            Utc.timestamp_opt(epoch, 0).unwrap(),
        )
        .with_phase(phase)
        .build()
    }

    fn epochs(events: &[AnomalyEvent]) -> Vec<i64> {
        events.iter().map(|e| e.epoch_seconds).collect()
    }

    #[test]
    fn test_refractory_period() {
        let close = deduplicate(vec![
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1000),
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1100),
        ]);
        assert_eq!(epochs(&close), vec![1000]);

        let apart = deduplicate(vec![
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1000),
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1200),
        ]);
        assert_eq!(epochs(&apart), vec![1000, 1200]);

        let boundary = deduplicate(vec![
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1000),
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1180),
        ]);
        assert_eq!(epochs(&boundary), vec![1000, 1180]);
    }

    #[test]
    fn test_gap_measured_from_last_emitted() {
        let events = deduplicate(
            (0..10)
                .map(|i| candidate(AnomalyType::ZeroPowerV4, "S", "-", 1000 + i * 60))
                .collect(),
        );
        assert_eq!(epochs(&events), vec![1000, 1180, 1360, 1540]);
    }

    #[test]
    fn test_keys_are_independent() {
        let events = deduplicate(vec![
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1000),
            candidate(AnomalyType::ZeroCurrentV4, "S", "A", 1010),
            candidate(AnomalyType::ZeroCurrentV3, "T", "A", 1020),
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1030),
        ]);
        assert_eq!(epochs(&events), vec![1000, 1010, 1020]);
    }

    #[test]
    fn test_sorted_by_epoch_then_phase() {
        let mut dedup = Deduplicator::new();
        let events = dedup.filter(vec![
            candidate(AnomalyType::ZeroVoltageV3, "S.C", "C", 2000),
            candidate(AnomalyType::ZeroVoltageV3, "S.A", "A", 2000),
            candidate(AnomalyType::ZeroVoltageV3, "S.B", "B", 1500),
            candidate(AnomalyType::ZeroVoltageV3, "S.B", "B", 1600),
        ]);

        let order: Vec<(&str, i64)> = events
            .iter()
            .map(|e| (e.device_phase.as_str(), e.epoch_seconds))
            .collect();
        assert_eq!(order, vec![("B", 1500), ("A", 2000), ("C", 2000)]);
        assert_eq!(dedup.suppressed(), 1);
    }

    #[test]
    fn test_ties_keep_detection_order() {
        let events = deduplicate(vec![
            candidate(AnomalyType::ZeroCurrentV4, "S", "A", 1000),
            candidate(AnomalyType::ZeroCurrentV3, "S", "A", 1000),
        ]);
        let types: Vec<AnomalyType> = events.iter().map(|e| e.anomaly_type).collect();
        assert_eq!(types, vec![AnomalyType::ZeroCurrentV4, AnomalyType::ZeroCurrentV3]);
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::new()).is_empty());
    }
}
