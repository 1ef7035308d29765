//! Per-unit orchestration: readings in arrival order through the classifier, one
//! deduplication pass at the end of the unit.

use crate::classifier::SignalClassifier;
use crate::dedup::Deduplicator;
use crate::store::WindowStore;
use grid_core::{AnomalyEvent, AnomalyType, DetectionConfig, Reading, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Shared entry point for scanning units. Cheap to clone; every unit gets its own
/// window and deduplication state.
#[derive(Clone)]
pub struct ScanPipeline {
    classifier: Arc<SignalClassifier>,
}

impl ScanPipeline {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            classifier: Arc::new(SignalClassifier::new(config)),
        }
    }

    pub fn classifier(&self) -> &SignalClassifier {
        &self.classifier
    }

    pub fn start_unit(&self) -> UnitScan<'_> {
        UnitScan {
            classifier: &self.classifier,
            windows: self.classifier.new_store(),
            candidates: Vec::new(),
            readings: 0,
        }
    }

    /// Scan a whole unit. The first read error aborts the unit.
    pub fn process_unit<I>(&self, readings: I) -> Result<UnitReport>
    where
        I: IntoIterator<Item = Result<Reading>>,
    {
        let mut scan = self.start_unit();
        for reading in readings {
            scan.feed(&reading?);
        }
        Ok(scan.finish())
    }
}

/// State of one unit in progress.
pub struct UnitScan<'a> {
    classifier: &'a SignalClassifier,
    windows: WindowStore,
    candidates: Vec<AnomalyEvent>,
    readings: usize,
}

impl UnitScan<'_> {
    pub fn feed(&mut self, reading: &Reading) {
        self.readings += 1;
        self.classifier
            .classify_into(reading, &mut self.windows, &mut self.candidates);
    }

    pub fn windows(&self) -> &WindowStore {
        &self.windows
    }

    pub fn candidates(&self) -> &[AnomalyEvent] {
        &self.candidates
    }

    pub fn finish(self) -> UnitReport {
        let candidates = self.candidates.len();
        let events = Deduplicator::new().filter(self.candidates);

        let mut counts = BTreeMap::new();
        for event in &events {
            *counts.entry(event.anomaly_type).or_insert(0) += 1;
        }

        debug!(
            readings = self.readings,
            signals = self.windows.len(),
            candidates,
            emitted = events.len(),
            "Unit scan complete"
        );

        UnitReport {
            readings: self.readings,
            candidates,
            events,
            counts,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnitReport {
    pub readings: usize,
    pub candidates: usize,
    pub events: Vec<AnomalyEvent>,
    pub counts: BTreeMap<AnomalyType, usize>,
}

impl UnitReport {
    pub fn count(&self, anomaly_type: AnomalyType) -> usize {
        self.counts.get(&anomaly_type).copied().unwrap_or(0)
    }

    /// `TYPE: n` pairs for the enabled types, in catalog order.
    pub fn summary(&self, config: &DetectionConfig) -> String {
        AnomalyType::ALL
            .iter()
            .filter(|t| config.is_enabled(**t))
            .map(|t| format!("{}: {}", t, self.count(*t)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
