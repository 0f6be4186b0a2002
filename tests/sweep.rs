mod common;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use outpost::backends::{ExecSpec, ExecutionBackend};
use outpost::error::Error;
use outpost::sweep::{SweepDriver, SweepRange, SWEEP_ENV_KEY};

use common::RecordingBackend;

fn base_spec(disown: bool) -> ExecSpec {
    ExecSpec {
        command: vec!["python".into(), "train.py".into()],
        workdir: "".into(),
        startup: None,
        env: HashMap::from([("BASE".to_string(), "x".to_string())]),
        disown,
        x_forward: false,
        local_forward: None,
        remote_forward: None,
        dry_run: false,
    }
}

/// Counts invocations and fails every one of them.
#[derive(Debug, Default)]
struct FailingBackend {
    calls: Mutex<usize>,
}

#[async_trait]
impl ExecutionBackend for FailingBackend {
    async fn execute(&self, _spec: &ExecSpec) -> anyhow::Result<()> {
        *self.calls.lock().unwrap() += 1;
        Err(Error::RemoteExit {
            command: "sbatch".to_string(),
            code: 1,
        }
        .into())
    }
}

#[test]
fn range_parses_and_iterates_ascending() {
    let range: SweepRange = "1-5".parse().unwrap();
    assert_eq!(range.len(), 4);
    assert_eq!(range.indices().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
}

#[test]
fn empty_range_is_rejected() {
    match "5-5".parse::<SweepRange>() {
        Err(Error::InvalidSweepRange(_)) => {}
        other => panic!("expected InvalidSweepRange, got {other:?}"),
    }
    assert!(SweepRange::new(7, 3).is_err());
}

#[test]
fn malformed_ranges_are_rejected() {
    for text in ["", "5", "a-b", "1-", "-3"] {
        assert!(
            text.parse::<SweepRange>().is_err(),
            "{text:?} should not parse"
        );
    }
}

#[tokio::test]
async fn driver_invokes_backend_once_per_index() {
    let backend = RecordingBackend::default();
    let range: SweepRange = "1-5".parse().unwrap();
    let base = base_spec(true);

    SweepDriver::new(&backend, range).drive(&base).await.unwrap();

    let specs = backend.specs();
    assert_eq!(specs.len(), 4);
    for (spec, expected) in specs.iter().zip(["1", "2", "3", "4"]) {
        assert_eq!(spec.env.get(SWEEP_ENV_KEY).map(String::as_str), Some(expected));
        // The base entries ride along into every iteration.
        assert_eq!(spec.env.get("BASE").map(String::as_str), Some("x"));
    }
    // The base spec is copied per iteration, never mutated.
    assert!(!base.env.contains_key(SWEEP_ENV_KEY));
}

#[tokio::test]
async fn driver_requires_disown_before_any_invocation() {
    let backend = RecordingBackend::default();
    let range: SweepRange = "1-5".parse().unwrap();

    let err = SweepDriver::new(&backend, range)
        .drive(&base_spec(false))
        .await
        .expect_err("blocking sweep should be rejected");

    match err.downcast_ref::<Error>() {
        Some(Error::SweepWithoutDisown) => {}
        other => panic!("expected SweepWithoutDisown, got {other:?}"),
    }
    assert!(backend.specs().is_empty());
}

#[tokio::test]
async fn backend_errors_propagate_and_end_the_sweep() {
    let backend = FailingBackend::default();
    let range: SweepRange = "1-5".parse().unwrap();

    let result = SweepDriver::new(&backend, range).drive(&base_spec(true)).await;

    assert!(result.is_err());
    assert_eq!(*backend.calls.lock().unwrap(), 1);
}
