//! Progress aggregation and cancellation tests.

use framepack::{BatchProgressState, CancellationToken, ProgressPayload};
use serde_json::json;

fn state(total: usize, completed: usize, current: f64, archive: f64) -> BatchProgressState {
    BatchProgressState {
        total,
        completed,
        current_job_fraction: current,
        archive_fraction: archive,
    }
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_default_not_cancelled() {
    let token = CancellationToken::default();
    assert!(!token.is_cancelled());
}

#[test]
fn cancellation_token_clone_shares_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());
}

// ── ProgressPayload ────────────────────────────────────────────────

#[test]
fn percent_and_ratio_normalize_to_the_same_fraction() {
    for percent in [0.0, 12.5, 33.0, 50.0, 99.9, 100.0] {
        let from_percent = ProgressPayload::Percent(percent).fraction();
        let from_ratio = ProgressPayload::Ratio(percent / 100.0).fraction();
        assert!((from_percent - from_ratio).abs() < 1e-12, "{percent}");
    }
}

#[test]
fn out_of_range_payloads_are_clamped() {
    assert_eq!(ProgressPayload::Ratio(1.7).fraction(), 1.0);
    assert_eq!(ProgressPayload::Ratio(-0.2).fraction(), 0.0);
    assert_eq!(ProgressPayload::Percent(140.0).fraction(), 1.0);
}

#[test]
fn payloads_parse_from_loose_events() {
    assert_eq!(
        ProgressPayload::from_json(&json!({ "progress": 0.4 })),
        Some(ProgressPayload::Ratio(0.4))
    );
    assert_eq!(
        ProgressPayload::from_json(&json!({ "percent": 40 })),
        Some(ProgressPayload::Percent(40.0))
    );
    assert_eq!(
        ProgressPayload::from_json(&json!({ "progress": 0.4, "percent": 90 })),
        Some(ProgressPayload::Ratio(0.4))
    );
    assert_eq!(ProgressPayload::from_json(&json!({ "time": 12 })), None);
    assert_eq!(ProgressPayload::from_json(&json!({ "percent": "half" })), None);
}

#[test]
fn non_finite_values_are_ignored() {
    assert_eq!(ProgressPayload::from_fields(Some(f64::NAN), None), None);
    assert_eq!(
        ProgressPayload::from_fields(Some(f64::INFINITY), Some(20.0)),
        Some(ProgressPayload::Percent(20.0))
    );
}

// ── BatchProgressState ─────────────────────────────────────────────

#[test]
fn empty_batch_has_no_extraction_share() {
    let empty = state(0, 0, 0.7, 0.0);
    assert_eq!(empty.per_file_weight(), 0.0);
    assert_eq!(empty.extraction_contribution(), 0.0);
    assert_eq!(empty.percent(), 0);
    assert_eq!(state(0, 0, 0.0, 1.0).percent(), 5);
}

#[test]
fn three_file_scenario() {
    assert_eq!(state(3, 1, 0.0, 0.0).percent(), 32);
    assert_eq!(state(3, 1, 0.5, 0.0).percent(), 48);
    assert_eq!(state(3, 3, 0.0, 0.0).percent(), 95);
    assert_eq!(state(3, 3, 0.0, 1.0).percent(), 100);
}

#[test]
fn every_batch_size_finishes_at_exactly_100() {
    for total in 1..=64 {
        let finished = state(total, total, 0.0, 1.0);
        assert_eq!(finished.percent(), 100, "total = {total}");
        assert!(finished.is_done());
    }
}

#[test]
fn aggregation_is_pure() {
    let snapshot = state(7, 3, 0.42, 0.0);
    let first = snapshot.percent();
    for _ in 0..10 {
        assert_eq!(snapshot.percent(), first);
    }
}

#[test]
fn job_boundary_is_floored_at_completed_share() {
    // A job that reached 90 % then completed must not drop below where it was.
    let before = state(4, 1, 0.9, 0.0).percent();
    let after = state(4, 2, 0.0, 0.0).percent();
    assert!(after >= before);
}

#[test]
fn percent_is_clamped() {
    assert_eq!(state(2, 5, 1.0, 1.0).percent(), 100);
    assert!(!state(2, 1, 0.0, 0.0).is_done());
}
