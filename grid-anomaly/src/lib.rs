pub mod classifier;
pub mod dedup;
pub mod detector;
pub mod pipeline;
pub mod signal;
pub mod store;
pub mod window;

pub use classifier::SignalClassifier;
pub use dedup::{deduplicate, Deduplicator, REFRACTORY_SECS};
pub use pipeline::{ScanPipeline, UnitReport, UnitScan};
pub use signal::SignalReading;
pub use store::{WindowFamily, WindowStore};
pub use window::{RollingWindow, WindowEntry};

use grid_core::AnomalyEvent;

/// One rule family of the anomaly catalog.
///
/// Detectors are stateless; any history they need lives in the [`WindowStore`] of the
/// unit being scanned, so one classifier can serve many units.
pub trait AnomalyDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate one reading, appending candidates to `out`.
    fn detect(&self, reading: &SignalReading<'_>, windows: &mut WindowStore, out: &mut Vec<AnomalyEvent>);
}
