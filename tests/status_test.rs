//! Tests for water-level classification.
//!
//! Run with: cargo test --test status_test

use flood_watch::telemetry::status::{StatusBand, lenient_status};
use flood_watch::telemetry::{STATUS_BANDS, StatusLevel, classify};
use serde::Deserialize;

#[test]
fn classify_respects_band_boundaries() {
    assert_eq!(classify(-5.0), StatusLevel::Normal);
    assert_eq!(classify(0.0), StatusLevel::Normal);
    assert_eq!(classify(99.999), StatusLevel::Normal);
    assert_eq!(classify(100.0), StatusLevel::Warning);
    assert_eq!(classify(149.9), StatusLevel::Warning);
    assert_eq!(classify(150.0), StatusLevel::Siaga);
    assert_eq!(classify(199.99), StatusLevel::Siaga);
    assert_eq!(classify(200.0), StatusLevel::Danger);
    assert_eq!(classify(10_000.0), StatusLevel::Danger);
}

#[test]
fn classify_is_total_and_monotonic() {
    assert_eq!(classify(f64::NAN), StatusLevel::Normal);
    assert_eq!(classify(f64::NEG_INFINITY), StatusLevel::Normal);
    assert_eq!(classify(f64::INFINITY), StatusLevel::Danger);

    let mut previous = classify(-50.0);
    let mut level = -50.0;
    while level <= 300.0 {
        let current = classify(level);
        assert!(current >= previous, "classification dropped at {level}");
        previous = current;
        level += 0.5;
    }
}

#[test]
fn levels_are_ordered_by_severity() {
    assert!(StatusLevel::Normal < StatusLevel::Warning);
    assert!(StatusLevel::Warning < StatusLevel::Siaga);
    assert!(StatusLevel::Siaga < StatusLevel::Danger);
    assert_eq!(StatusLevel::ALL.len(), 4);
}

#[test]
fn bands_agree_with_classify() {
    for band in STATUS_BANDS {
        let sample = match (band.lower_cm, band.upper_cm) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            (Some(lo), None) => lo + 1.0,
            (None, Some(hi)) => hi - 1.0,
            (None, None) => 0.0,
        };
        assert_eq!(classify(sample), band.level);
        assert!(band.contains(sample));
    }

    // Bands tile the line with no gaps or overlaps.
    for pair in STATUS_BANDS.windows(2) {
        let [low, high]: [StatusBand; 2] = [pair[0], pair[1]];
        assert_eq!(low.upper_cm, high.lower_cm);
    }
}

#[test]
fn labels_and_parsing() {
    assert_eq!(StatusLevel::Normal.label(), "Normal");
    assert_eq!(StatusLevel::Warning.label(), "Waspada");
    assert_eq!(StatusLevel::Siaga.label(), "Siaga");
    assert_eq!(StatusLevel::Danger.label(), "Bahaya");

    assert_eq!("warning".parse::<StatusLevel>(), Ok(StatusLevel::Warning));
    assert_eq!("Waspada".parse::<StatusLevel>(), Ok(StatusLevel::Warning));
    assert_eq!(" BAHAYA ".parse::<StatusLevel>(), Ok(StatusLevel::Danger));
    assert!("flooded".parse::<StatusLevel>().is_err());

    assert_eq!(serde_json::to_string(&StatusLevel::Siaga).unwrap(), "\"siaga\"");
}

#[test]
fn lenient_status_drops_unknown_tags() {
    #[derive(Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "lenient_status")]
        status: Option<StatusLevel>,
    }

    let row: Row = serde_json::from_str(r#"{"status": "danger"}"#).unwrap();
    assert_eq!(row.status, Some(StatusLevel::Danger));

    let row: Row = serde_json::from_str(r#"{"status": "overflow"}"#).unwrap();
    assert_eq!(row.status, None);

    let row: Row = serde_json::from_str(r#"{"status": null}"#).unwrap();
    assert_eq!(row.status, None);

    let row: Row = serde_json::from_str("{}").unwrap();
    assert_eq!(row.status, None);
}
