use grid_anomaly::{ScanPipeline, UnitReport};
use grid_core::ingest::{EdnaLineParser, IngestStats};
use grid_core::{AnomalyType, DetectionConfig, GridError, InputConfig, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use walkdir::WalkDir;

/// One input file, numbered by its position in the sorted listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputUnit {
    pub index: usize,
    pub path: PathBuf,
}

/// All files under `input.dir` with the configured extension, sorted by path.
///
/// Symlinks are followed; a link back to one of its own ancestors is skipped. Errors
/// below the input directory skip the entry, an unreadable input directory fails.
pub fn enumerate_units(input: &InputConfig) -> Result<Vec<InputUnit>> {
    let mut walker = WalkDir::new(&input.dir).min_depth(1).follow_links(true);
    if !input.recursive {
        walker = walker.max_depth(1);
    }

    let mut paths = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.loop_ancestor().is_some() => {
                warn!("Skipping symlink loop: {}", e);
                continue;
            }
            Err(e) if e.depth() == 0 => return Err(GridError::Io(e.into())),
            Err(e) => {
                warn!("Skipping unreadable input entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file() && has_extension(entry.path(), &input.extension) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| InputUnit { index, path })
        .collect())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Units whose index falls in `start..=end`; no `end` means through the last unit.
pub fn select_units(units: Vec<InputUnit>, start: usize, end: Option<usize>) -> Vec<InputUnit> {
    units
        .into_iter()
        .filter(|unit| unit.index >= start && end.map_or(true, |end| unit.index <= end))
        .collect()
}

#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: InputUnit,
    pub report: UnitReport,
    pub ingest: IngestStats,
    pub elapsed: Duration,
}

/// Scan one file with fresh window and deduplication state.
pub fn scan_unit(pipeline: &ScanPipeline, parser: &EdnaLineParser, unit: InputUnit) -> Result<UnitOutcome> {
    let started = Instant::now();
    let file = File::open(&unit.path)?;
    let mut source = parser.readings(BufReader::new(file));

    let report = pipeline.process_unit(source.by_ref())?;
    let ingest = source.stats();
    let elapsed = started.elapsed();

    info!(
        unit = unit.index,
        path = %unit.path.display(),
        readings = report.readings,
        skipped = ingest.skipped,
        zero_filled = ingest.zero_filled_timestamps,
        candidates = report.candidates,
        emitted = report.events.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "{}",
        report.summary(pipeline.classifier().config())
    );

    Ok(UnitOutcome {
        unit,
        report,
        ingest,
        elapsed,
    })
}

/// Cumulative counts over the units of one run.
#[derive(Debug, Default)]
pub struct RunTotals {
    pub units: usize,
    pub readings: usize,
    pub skipped: usize,
    pub emitted: usize,
    /// Summed worker time, larger than wall time when units overlap.
    pub scan_time: Duration,
    pub counts: BTreeMap<AnomalyType, usize>,
}

impl RunTotals {
    pub fn record(&mut self, outcome: &UnitOutcome) {
        self.units += 1;
        self.readings += outcome.report.readings;
        self.skipped += outcome.ingest.skipped;
        self.emitted += outcome.report.events.len();
        self.scan_time += outcome.elapsed;
        for (anomaly_type, count) in &outcome.report.counts {
            *self.counts.entry(*anomaly_type).or_insert(0) += count;
        }
    }

    pub fn summary(&self, config: &DetectionConfig) -> String {
        AnomalyType::ALL
            .iter()
            .filter(|t| config.is_enabled(**t))
            .map(|t| format!("{}: {}", t, self.counts.get(t).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn input(dir: &Path, recursive: bool) -> InputConfig {
        InputConfig {
            dir: dir.to_path_buf(),
            recursive,
            ..InputConfig::default()
        }
    }

    #[test]
    fn test_enumeration_is_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for name in ["b.csv", "a.CSV", "notes.txt"] {
            fs::write(root.join(name), "").unwrap();
        }
        fs::create_dir_all(root.join("2015-02")).unwrap();
        fs::write(root.join("2015-02").join("c.csv"), "").unwrap();

        let flat = enumerate_units(&input(root, false)).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|u| u.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
        assert_eq!(flat[1].index, 1);

        let nested = enumerate_units(&input(root, true)).unwrap();
        assert_eq!(nested.len(), 3);
        assert_eq!(nested[0].path, root.join("2015-02").join("c.csv"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_enumerated_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let month = root.join("2015-01");
        fs::create_dir_all(&month).unwrap();
        fs::write(month.join("803036.csv"), "").unwrap();
        std::os::unix::fs::symlink(root, month.join("up")).unwrap();

        let units = enumerate_units(&input(root, true)).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].path, month.join("803036.csv"));
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = enumerate_units(&input(&tmp.path().join("absent"), true));
        assert!(matches!(result, Err(GridError::Io(_))));
    }

    #[test]
    fn test_select_units_range_is_inclusive() {
        let units: Vec<InputUnit> = (0..5)
            .map(|index| InputUnit {
                index,
                path: PathBuf::from(format!("{}.csv", index)),
            })
            .collect();

        let picked: Vec<usize> = select_units(units.clone(), 1, Some(3))
            .iter()
            .map(|u| u.index)
            .collect();
        assert_eq!(picked, vec![1, 2, 3]);

        let open: Vec<usize> = select_units(units, 3, None).iter().map(|u| u.index).collect();
        assert_eq!(open, vec![3, 4]);
    }

    #[test]
    fn test_scan_unit_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("803036.csv");
        fs::write(
            &path,
            "\
\"DAYTONA.FDR.803036_P1.I.A_PH\",\"1/1/2015 12:00:00 AM\",\"25.0\",\"OK\",\"\"
\"DAYTONA.FDR.803036_P1.I.A_PH\",\"1/1/2015 12:01:00 AM\",\"0.0\",\"OK\",\"\"
\"DAYTONA.803036.AFS.AFS1234.I_FAULT\",\"1/1/2015 12:02:00 AM\",\"650\",\"OK\",\"\"
truncated,record
",
        )
        .unwrap();

        let pipeline = ScanPipeline::new(DetectionConfig::default());
        let parser = EdnaLineParser::new(InputConfig::default().timestamp_format);
        let outcome = scan_unit(&pipeline, &parser, InputUnit { index: 0, path }).unwrap();

        assert_eq!(outcome.report.readings, 3);
        assert_eq!(outcome.ingest.skipped, 1);
        assert_eq!(outcome.report.count(AnomalyType::ZeroCurrentV3), 1);
        assert_eq!(outcome.report.count(AnomalyType::ZeroCurrentV4), 1);
        assert_eq!(outcome.report.count(AnomalyType::AfsIFaultTemp), 1);

        let mut totals = RunTotals::default();
        totals.record(&outcome);
        totals.record(&outcome);
        assert_eq!(totals.units, 2);
        assert_eq!(totals.emitted, 6);
        assert!(totals
            .summary(&DetectionConfig::only(&[AnomalyType::AfsIFaultTemp]))
            .starts_with("AFS_I_FAULT_TEMP: 2"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let pipeline = ScanPipeline::new(DetectionConfig::default());
        let parser = EdnaLineParser::new(InputConfig::default().timestamp_format);
        let unit = InputUnit {
            index: 0,
            path: PathBuf::from("/nonexistent/grid-scan/unit.csv"),
        };
        assert!(scan_unit(&pipeline, &parser, unit).is_err());
    }
}
