mod common;

use outpost::error::Error;
use outpost::project::{Project, RemoteHost};
use outpost::sync::SyncOrchestrator;

use common::{RecordingShell, RecordingTransfer};

fn remote() -> RemoteHost {
    RemoteHost::new("ml", "gpu1.cluster")
}

fn project(with_remote_root: bool, with_out_dir: bool) -> Project {
    Project::new(
        "demo",
        "/work/demo".into(),
        with_remote_root.then_some("/scratch/ml"),
        with_out_dir.then(|| "/work/demo/outputs".into()),
    )
}

#[tokio::test]
async fn push_creates_remote_dirs_within_the_transfer() {
    let transfer = RecordingTransfer::default();
    let shell = RecordingShell::default();
    let sync = SyncOrchestrator::new(&transfer, &shell);

    let excludes = vec![".git".to_string(), "data".to_string(), ".git".to_string()];
    sync.push(&remote(), &project(true, false), &excludes, false)
        .await
        .unwrap();

    let calls = transfer.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.source, "/work/demo");
    assert_eq!(call.target, "ml@gpu1.cluster:/scratch/ml/demo");

    // Directory creation is part of the same invocation, so the transfer is
    // never attempted against a missing destination.
    let hook = call.hook.as_deref().expect("rsync-path hook");
    assert!(hook.contains("mkdir -p /scratch/ml/demo"));
    assert!(hook.contains("mkdir -p /scratch/ml/demo/output"));
    assert!(hook.ends_with("rsync"));

    // Patterns concatenate verbatim; duplicates are a harmless filter.
    assert_eq!(call.exclude, excludes);
    assert!(!call.dry_run);
}

#[tokio::test]
async fn push_dry_run_is_passed_through() {
    let transfer = RecordingTransfer::default();
    let shell = RecordingShell::default();
    let sync = SyncOrchestrator::new(&transfer, &shell);

    sync.push(&remote(), &project(true, false), &[], true)
        .await
        .unwrap();

    assert!(transfer.calls()[0].dry_run);
}

#[tokio::test]
async fn push_without_remote_root_fails_before_any_transfer() {
    let transfer = RecordingTransfer::default();
    let shell = RecordingShell::default();
    let sync = SyncOrchestrator::new(&transfer, &shell);

    let err = sync
        .push(&remote(), &project(false, false), &[], false)
        .await
        .expect_err("no remote root to deploy to");

    match err.downcast_ref::<Error>() {
        Some(Error::MissingRemoteRoot { project }) => assert_eq!(project, "demo"),
        other => panic!("expected MissingRemoteRoot, got {other:?}"),
    }
    assert!(transfer.calls().is_empty());
}

#[tokio::test]
async fn pull_without_local_out_dir_touches_nothing() {
    let transfer = RecordingTransfer::default();
    let shell = RecordingShell::default();
    let sync = SyncOrchestrator::new(&transfer, &shell);

    sync.pull(&remote(), &project(true, false), false)
        .await
        .unwrap();

    assert!(shell.commands().is_empty());
    assert!(transfer.calls().is_empty());
}

#[tokio::test]
async fn pull_skips_the_transfer_when_remote_out_is_empty() {
    let transfer = RecordingTransfer::default();
    let shell = RecordingShell::default();
    shell.respond("0\n", 0);
    let sync = SyncOrchestrator::new(&transfer, &shell);

    sync.pull(&remote(), &project(true, true), false)
        .await
        .unwrap();

    let commands = shell.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains("ls -l /scratch/ml/demo/output"));
    assert!(transfer.calls().is_empty());
}

#[tokio::test]
async fn pull_transfers_when_outputs_exist() {
    let transfer = RecordingTransfer::default();
    let shell = RecordingShell::default();
    shell.respond("3\n", 0);
    let sync = SyncOrchestrator::new(&transfer, &shell);

    sync.pull(&remote(), &project(true, true), false)
        .await
        .unwrap();

    let calls = transfer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, "ml@gpu1.cluster:/scratch/ml/demo/output");
    assert_eq!(calls[0].target, "/work/demo/outputs");
    assert!(calls[0].hook.is_none());
}
