//! Integration tests for load admission.
//!
//! Covers:
//! - Verdicts against the soft and hard thresholds
//! - Retry budget and the mock load sequence
//! - Dry-run reporting and backoff bounds
//! - Side-band framing of reports on the wire
//! - Sampling failures and counters

use std::sync::Arc;

use agit_guard::builders::GuardBuilder;
use agit_guard::config::env::{ENV_LOADAVG_SLEEP_MAX, ENV_LOADAVG_SLEEP_MIN, ENV_TEST_LOADAVG_MOCK};
use agit_guard::config::{ConfigProvider, GuardConfig};
use agit_guard::core::{
    Admission, AdmitReason, Band, CancelToken, GuardError, LoadSource, RejectKind, Step,
};
use agit_guard::infra::{FixedLoad, MemoryChannel, PktLineSideband};

// ============================================================================
// HELPERS
// ============================================================================

fn mock_config(loads: &[u32]) -> GuardConfig {
    GuardConfig::new()
        .with_soft_limit(50)
        .with_hard_limit(95)
        .with_max_retries(3)
        .with_sleep_range(1, 3)
        .with_dry_run(true)
        .with_mock_loads(loads.to_vec())
}

fn builder(config: GuardConfig, local: &Arc<MemoryChannel>) -> GuardBuilder {
    GuardBuilder::new(config)
        .with_load_source(Box::new(FixedLoad::new(0.0, 1)))
        .with_local_channel(local.clone())
        .with_rng_seed(42)
}

struct BrokenSource;

impl LoadSource for BrokenSource {
    fn load_average(&self) -> Result<Option<f64>, GuardError> {
        Err(GuardError::LoadSource("loadavg unreadable".into()))
    }
}

// ============================================================================
// THRESHOLDS
// ============================================================================

#[test]
fn test_admits_below_soft_limit() {
    let local = Arc::new(MemoryChannel::new(32));
    let guard = builder(mock_config(&[10]), &local).build();

    assert!(!guard.admission_refused(false));
    assert!(local.lines().is_empty());
}

#[test]
fn test_host_load_is_scaled_by_cpu_count() {
    let local = Arc::new(MemoryChannel::new(32));
    let config = GuardConfig::new().with_soft_limit(50).with_hard_limit(95);
    let controller = GuardBuilder::new(config)
        .with_load_source(Box::new(FixedLoad::new(1.8, 4)))
        .with_local_channel(local)
        .build_admission();

    assert_eq!(
        controller.admit(false),
        Admission::Admitted(AdmitReason::BelowSoftLimit { load: 45 })
    );
}

#[test]
fn test_rejects_at_hard_limit_without_waiting() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[95]), &local).build_admission();

    let admission = controller.admit(false);
    let rejection = admission.rejection().expect("rejected");
    assert_eq!(rejection.kind, RejectKind::HardLimit);
    assert_eq!(rejection.load, 95);
    assert_eq!(controller.stats().backoffs, 0);
    assert_eq!(
        local.lines(),
        vec!["ERROR: Server load (95%) is too high, quit\n".to_string()]
    );
}

#[test]
fn test_recovers_after_backoff() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[80, 40]), &local).build_admission();

    assert_eq!(
        controller.admit(false),
        Admission::Admitted(AdmitReason::BelowSoftLimit { load: 40 })
    );
    let stats = controller.stats();
    assert_eq!(stats.backoffs, 1);
    assert_eq!(stats.admitted, 1);
}

// ============================================================================
// RETRY BUDGET
// ============================================================================

#[test]
fn test_mock_sequence_exhausts_retries() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[90, 80, 70]), &local).build_admission();

    let admission = controller.admit(false);
    let rejection = admission.rejection().expect("rejected");
    assert_eq!(rejection.kind, RejectKind::RetriesExhausted);
    assert_eq!(rejection.load, 70);
    assert_eq!(rejection.attempts, 4);
    assert_eq!(
        rejection.message,
        "Server load (70%) is still high after 3 retries, quit"
    );
    // Three backoffs sampled 90, 80, 70; the last value repeats for the fourth poll.
    assert_eq!(controller.sampler().mock().map(|m| m.position()), Some(4));
    assert_eq!(controller.stats().backoffs, 3);

    let lines = local.lines();
    assert_eq!(lines.len(), 7);
    for (i, load) in [90, 80, 70].iter().enumerate() {
        let waiting = &lines[i * 2];
        assert!(
            waiting.starts_with(&format!("WARN: Server load ({load}%) is high, waiting ")),
            "{waiting}"
        );
        assert!(waiting.ends_with(&format!(" seconds [loop {}/3]...\n", i + 1)));
        assert!(lines[i * 2 + 1].starts_with("WARN: would sleep "));
    }
    assert_eq!(
        lines[6],
        "ERROR: Server load (70%) is still high after 3 retries, quit\n"
    );
}

#[test]
fn test_never_exceeds_retry_budget() {
    for retries in 0..5 {
        let local = Arc::new(MemoryChannel::new(64));
        let config = mock_config(&[60]).with_max_retries(retries);
        let controller = builder(config, &local).build_admission();

        let mut run = controller.begin(false);
        let mut pauses = 0;
        loop {
            match run.step() {
                Step::Pause { .. } => pauses += 1,
                Step::Done(admission) => {
                    assert!(admission.is_rejected());
                    break;
                }
            }
        }
        assert_eq!(pauses, retries);
    }
}

#[test]
fn test_dry_run_reported_sleeps_stay_in_range() {
    let local = Arc::new(MemoryChannel::new(64));
    let config = mock_config(&[70]).with_sleep_range(2, 4).with_max_retries(10);
    let controller = builder(config, &local).build_admission();

    assert!(controller.admit(false).is_rejected());
    let sleeps: Vec<u64> = local
        .lines()
        .iter()
        .filter_map(|line| line.strip_prefix("WARN: would sleep "))
        .filter_map(|rest| rest.trim_end().strip_suffix(" seconds"))
        .map(|secs| secs.parse().expect("seconds"))
        .collect();
    assert_eq!(sleeps.len(), 10);
    assert!(sleeps.iter().all(|s| (2..=4).contains(s)), "{sleeps:?}");
}

// ============================================================================
// REPORTING
// ============================================================================

#[test]
fn test_sideband_frames_on_the_wire() {
    let wire = Arc::new(PktLineSideband::new(Vec::new()));
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[99]), &local)
        .with_remote_channel(wire.clone())
        .build_admission();

    assert!(controller.admit(true).is_rejected());
    assert!(local.lines().is_empty());

    drop(controller);
    let bytes = Arc::try_unwrap(wire).expect("sole owner").into_inner();
    let line = b"ERROR: Server load (99%) is too high, quit\n";
    let mut expected = format!("{:04x}", line.len() + 5).into_bytes();
    expected.push(3);
    expected.extend_from_slice(line);
    assert_eq!(bytes, expected);
}

#[test]
fn test_progress_goes_to_band_two() {
    let remote = Arc::new(MemoryChannel::new(32));
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[60, 10]), &local)
        .with_remote_channel(remote.clone())
        .build_admission();

    assert!(controller.admit(true).is_admitted());
    let records = remote.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.band == Band::Progress));
}

#[test]
fn test_sideband_requested_without_channel_falls_back_to_local() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[99]), &local).build_admission();

    assert!(controller.admit(true).is_rejected());
    let records = local.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].band, Band::Local);
}

#[test]
fn test_oversized_sleep_from_environment_does_not_panic() {
    let provider = ConfigProvider::from_lookup(|name| match name {
        ENV_LOADAVG_SLEEP_MIN | ENV_LOADAVG_SLEEP_MAX => Some("99999999999999999999".into()),
        ENV_TEST_LOADAVG_MOCK => Some("200".into()),
        _ => None,
    });
    let config = GuardConfig::from_provider(&provider);
    let saturated = i64::MAX.unsigned_abs();
    assert_eq!(config.sleep_bounds(), (saturated, saturated));

    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(config, &local).build_admission();
    let cancel = CancelToken::new();
    cancel.cancel();

    let admission = controller.admit_with_cancel(false, &cancel);
    let rejection = admission.rejection().expect("rejected");
    assert_eq!(rejection.kind, RejectKind::Cancelled);
    assert_eq!(rejection.load, 200);
}

// ============================================================================
// SAMPLING FAILURES
// ============================================================================

#[test]
fn test_unreadable_load_admits() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = GuardBuilder::new(GuardConfig::new())
        .with_load_source(Box::new(BrokenSource))
        .with_local_channel(local.clone())
        .build_admission();

    assert_eq!(
        controller.admit(false),
        Admission::Admitted(AdmitReason::LoadUnknown)
    );
    assert_eq!(controller.stats().sample_failures, 1);
    assert!(local.lines().is_empty());
}

#[test]
fn test_missing_load_data_admits() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = GuardBuilder::new(GuardConfig::new())
        .with_load_source(Box::new(FixedLoad::empty()))
        .with_local_channel(local)
        .build_admission();

    assert_eq!(
        controller.admit(false),
        Admission::Admitted(AdmitReason::NoSignal)
    );
}

#[test]
fn test_admission_serializes_for_hooks() {
    let local = Arc::new(MemoryChannel::new(32));
    let controller = builder(mock_config(&[99]), &local).build_admission();

    let json = serde_json::to_value(controller.admit(false)).expect("json");
    assert_eq!(json["rejected"]["kind"], "hard_limit");
    assert_eq!(json["rejected"]["load"], 99);
}
