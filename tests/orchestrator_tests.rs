//! Startup ordering and graceful shutdown of the orchestrator

mod common;

use common::{
    location, EventLog, FakeKeys, FakeLocations, LoggingProvisioner, RecordingWorkload, NAMESPACE,
};
use restic_node_agent::provider::azure::RESOURCE_GROUP_CONFIG_KEY;
use restic_node_agent::provider::{CredentialProvisioner, ProvisionError};
use restic_node_agent::runtime::{LifecycleState, Orchestrator, StartupError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Provisioner = LoggingProvisioner<CredentialProvisioner<FakeLocations, FakeKeys>>;

fn provisioner(locations: FakeLocations, log: &EventLog) -> Provisioner {
    LoggingProvisioner {
        inner: CredentialProvisioner::new(NAMESPACE, locations, FakeKeys::default()),
        log: log.clone(),
    }
}

fn aws_default() -> FakeLocations {
    FakeLocations::with([location("default", "aws", &[])])
}

#[tokio::test]
async fn test_reaches_running_after_provisioning_then_streams_then_loops() {
    let log = EventLog::default();
    let token = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        provisioner(aws_default(), &log),
        RecordingWorkload::new(log.clone()),
        "default",
        token.clone(),
    );
    let lifecycle = orchestrator.lifecycle();
    let run = tokio::spawn(orchestrator.run());

    tokio::time::timeout(TEST_TIMEOUT, lifecycle.wait_for(LifecycleState::Running))
        .await
        .expect("orchestrator should reach Running");

    let events = log.events();
    assert_eq!(
        events[..3],
        ["provision", "streams", "reconcilers"].map(String::from)
    );
    assert!(events.contains(&"environment has 0 variables".to_string()));

    token.cancel();
    tokio::time::timeout(TEST_TIMEOUT, run)
        .await
        .expect("orchestrator should stop")
        .unwrap()
        .unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_missing_location_stops_without_starting_anything() {
    let log = EventLog::default();
    let token = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        provisioner(FakeLocations::default(), &log),
        RecordingWorkload::new(log.clone()),
        "default",
        token.clone(),
    );
    let lifecycle = orchestrator.lifecycle();
    let registry = orchestrator.registry();

    let err = tokio::time::timeout(TEST_TIMEOUT, orchestrator.run())
        .await
        .expect("run should return")
        .unwrap_err();

    assert!(
        matches!(err, StartupError::Provision(ProvisionError::LocationNotFound { .. })),
        "unexpected error: {err:?}"
    );
    assert!(err.to_string().contains("not found"));
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert_eq!(registry.spawned(), 0);
    assert_eq!(log.events(), vec!["provision".to_string()]);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_incomplete_azure_config_starts_no_tasks() {
    let log = EventLog::default();
    let locations = FakeLocations::with([location(
        "default",
        "azure",
        &[(RESOURCE_GROUP_CONFIG_KEY, "ark-rg")],
    )]);
    let orchestrator = Orchestrator::new(
        provisioner(locations, &log),
        RecordingWorkload::new(log.clone()),
        "default",
        CancellationToken::new(),
    );
    let lifecycle = orchestrator.lifecycle();
    let registry = orchestrator.registry();

    let err = orchestrator.run().await.unwrap_err();

    assert!(
        matches!(
            err,
            StartupError::Provision(ProvisionError::InvalidProviderConfig { .. })
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert_eq!(registry.spawned(), 0);
    assert_eq!(log.position("streams"), None);
}

#[tokio::test]
async fn test_stopped_only_after_every_loop_has_finished() {
    let log = EventLog::default();
    let token = CancellationToken::new();
    let workload = RecordingWorkload::new(log.clone());
    let orchestrator = Orchestrator::new(
        provisioner(aws_default(), &log),
        workload.clone(),
        "default",
        token.clone(),
    );
    let lifecycle = orchestrator.lifecycle();
    workload.observe(lifecycle.clone());
    let run = tokio::spawn(orchestrator.run());

    tokio::time::timeout(TEST_TIMEOUT, lifecycle.wait_for(LifecycleState::Running))
        .await
        .expect("orchestrator should reach Running");

    // Same path the signal listener takes on SIGTERM
    token.cancel();

    tokio::time::timeout(TEST_TIMEOUT, run)
        .await
        .expect("orchestrator should stop")
        .unwrap()
        .unwrap();

    let events = log.events();
    for loop_name in ["backup", "restore"] {
        assert!(events.contains(&format!("{loop_name} observed cancellation")));
        assert!(
            events.contains(&format!("{loop_name} finished in ShuttingDown")),
            "{loop_name} should finish before Stopped: {events:?}"
        );
    }
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_repeated_cancellation_is_harmless() {
    let log = EventLog::default();
    let token = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        provisioner(aws_default(), &log),
        RecordingWorkload::new(log.clone()),
        "default",
        token.clone(),
    );
    let lifecycle = orchestrator.lifecycle();
    let run = tokio::spawn(orchestrator.run());

    lifecycle.wait_for(LifecycleState::Running).await;
    token.cancel();
    token.cancel();

    tokio::time::timeout(TEST_TIMEOUT, run)
        .await
        .expect("orchestrator should stop")
        .unwrap()
        .unwrap();
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_loop_exiting_early_fails_the_run_after_full_shutdown() {
    let log = EventLog::default();
    let token = CancellationToken::new();
    let mut workload = RecordingWorkload::new(log.clone());
    workload.restore_exits_early = true;
    let orchestrator =
        Orchestrator::new(provisioner(aws_default(), &log), workload, "default", token.clone());
    let lifecycle = orchestrator.lifecycle();

    let err = tokio::time::timeout(TEST_TIMEOUT, orchestrator.run())
        .await
        .expect("orchestrator should stop on its own")
        .unwrap_err();

    assert!(
        matches!(err, StartupError::TaskFailed { ref task } if task == "controller/restore"),
        "unexpected error: {err:?}"
    );
    assert!(token.is_cancelled());
    assert!(log.events().contains(&"restore exited".to_string()));
    assert!(log.events().contains(&"backup observed cancellation".to_string()));
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_auxiliary_task_is_joined_after_provisioning_failure() {
    let log = EventLog::default();
    let token = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        provisioner(FakeLocations::default(), &log),
        RecordingWorkload::new(log.clone()),
        "default",
        token.clone(),
    );

    let aux_log = log.clone();
    let aux_token = token.clone();
    orchestrator.registry().spawn("http-server", async move {
        aux_token.cancelled().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        aux_log.push("http-server stopped");
    });

    tokio::time::timeout(TEST_TIMEOUT, orchestrator.run())
        .await
        .expect("run should return")
        .unwrap_err();

    assert_eq!(log.events().last().map(String::as_str), Some("http-server stopped"));
}
