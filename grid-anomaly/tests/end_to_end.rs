use chrono::{DateTime, Duration, TimeZone, Utc};
use grid_anomaly::{ScanPipeline, WindowFamily, REFRACTORY_SECS};
use grid_core::{AnomalyType, DetectionConfig, Reading};

const SIGNAL: &str = "DAYTONA.FDR.803036_P1.I.A_PH";

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 3, 1, 0, 0, 0).unwrap()
}

fn reading(signal: &str, seconds: i64, value: f64) -> Reading {
    Reading::new(signal, base() + Duration::seconds(seconds), value.to_string(), "")
}

/// 1000 samples 108 s apart (about 30 hours); every 20th is 15.0, the rest 0.2.
fn thirty_hours() -> Vec<Reading> {
    (0..1000)
        .map(|i| {
            let value = if i % 20 == 19 { 15.0 } else { 0.2 };
            reading(SIGNAL, i * 108, value)
        })
        .collect()
}

#[test]
fn test_zero_current_over_thirty_hours() {
    let pipeline = ScanPipeline::new(DetectionConfig::default());
    let mut scan = pipeline.start_unit();
    for reading in thirty_hours() {
        scan.feed(&reading);
    }

    let window = scan
        .windows()
        .get(WindowFamily::ZeroCurrent, SIGNAL)
        .expect("zero current window");
    // 800 intervals make exactly 24 hours.
    assert_eq!(window.len(), 801);
    assert_eq!(window.start_index(), 199);
    assert_eq!(window.span(), Some(Duration::hours(24)));
    let fraction = window.quantile_at_or_above(10.0);
    assert!(fraction >= 0.01);
    assert_eq!(fraction, 41.0 / 801.0);

    let candidates = scan.candidates();
    let v3_candidates = candidates
        .iter()
        .filter(|e| e.anomaly_type == AnomalyType::ZeroCurrentV3)
        .count();
    let v4_candidates = candidates
        .iter()
        .filter(|e| e.anomaly_type == AnomalyType::ZeroCurrentV4)
        .count();
    assert_eq!(v3_candidates, 931);
    assert_eq!(v4_candidates, 49);

    let report = scan.finish();
    let v3: Vec<i64> = report
        .events
        .iter()
        .filter(|e| e.anomaly_type == AnomalyType::ZeroCurrentV3)
        .map(|e| e.epoch_seconds)
        .collect();

    // Nothing fires before the first active sample at i = 19.
    assert_eq!(v3[0], (base() + Duration::seconds(20 * 108)).timestamp());
    assert!(v3.len() < v3_candidates);
    assert!(v3.windows(2).all(|pair| pair[1] - pair[0] >= REFRACTORY_SECS));
    assert_eq!(report.count(AnomalyType::ZeroCurrentV4), 49);
    assert_eq!(report.count(AnomalyType::ZeroCurrentV3), v3.len());
}

#[test]
fn test_burst_after_activity_emits_once() {
    let pipeline = ScanPipeline::new(DetectionConfig::default());
    let mut readings = vec![reading(SIGNAL, 0, 15.0)];
    readings.extend((1..=10).map(|i| reading(SIGNAL, i * 10, 0.2)));

    let report = pipeline
        .process_unit(readings.into_iter().map(Ok))
        .unwrap();

    assert_eq!(report.candidates, 11);
    assert_eq!(report.count(AnomalyType::ZeroCurrentV3), 1);
    assert_eq!(report.count(AnomalyType::ZeroCurrentV4), 1);
    assert!(report.events.iter().all(|e| e.epoch_seconds == base().timestamp() + 10));
}

#[test]
fn test_interleaved_signals_are_isolated() {
    let quiet = "DAYTONA.FDR.803036_P2.I.B_PH";
    let pipeline = ScanPipeline::new(DetectionConfig::default());
    let mut scan = pipeline.start_unit();

    for i in 0..200 {
        let active = if i % 10 == 0 { 25.0 } else { 0.3 };
        scan.feed(&reading(SIGNAL, i * 60, active));
        scan.feed(&reading(quiet, i * 60 + 1, 0.3));
    }

    let noisy_window = scan.windows().get(WindowFamily::ZeroCurrent, SIGNAL).unwrap();
    let quiet_window = scan.windows().get(WindowFamily::ZeroCurrent, quiet).unwrap();
    assert_eq!(noisy_window.quantile_at_or_above(10.0), 0.1);
    assert_eq!(quiet_window.quantile_at_or_above(10.0), 0.0);
    assert!(!quiet_window.is_at_or_above_relative(1, 1.0));

    let report = scan.finish();
    assert!(report.count(AnomalyType::ZeroCurrentV3) > 0);
    assert!(report.events.iter().all(|e| e.signal_id == SIGNAL));
}

#[test]
fn test_mixed_families_in_one_unit() {
    let pipeline = ScanPipeline::new(DetectionConfig::default());
    let readings = vec![
        Reading::new("DAYTONA.803036.AFS.AFS1234.I_FAULT", base(), "950", "OK"),
        Reading::new("DAYTONA.803036.FCI.FCI77.FAULT", base(), "1", "TRIPPED"),
        reading("DAYTONA.FDR.803036_P1.V.A_PH", 0, 121.0),
        reading("DAYTONA.FDR.803036_P1.V.A_PH", 60, 0.0),
        reading("DAYTONA.FDR.803036_P1.MW", 0, 3.2),
        reading("DAYTONA.FDR.803036_P1.MW", 60, 0.0),
    ];

    let report = pipeline
        .process_unit(readings.into_iter().map(Ok))
        .unwrap();

    for anomaly_type in [
        AnomalyType::AfsIFaultFull,
        AnomalyType::AfsIFaultNew,
        AnomalyType::FciFaultAlarm,
        AnomalyType::ZeroVoltageV3,
        AnomalyType::ZeroVoltageV4,
        AnomalyType::ZeroPowerV3,
        AnomalyType::ZeroPowerV4,
    ] {
        assert_eq!(report.count(anomaly_type), 1, "{}", anomaly_type);
    }
    assert_eq!(report.events.len(), 7);

    // Same epoch: sorted by phase, with "-" ahead of "A".
    let phases: Vec<&str> = report
        .events
        .iter()
        .filter(|e| e.epoch_seconds == base().timestamp() + 60)
        .map(|e| e.device_phase.as_str())
        .collect();
    assert_eq!(phases, vec!["-", "-", "A", "A"]);
}
