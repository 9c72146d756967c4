//! Lifecycle tests driving real processes through the supervisor.

use std::time::Duration;

use stagehand_core::{ReadinessStrategy, Resolution, ServiceDescriptor, ServiceName};
use stagehand_supervisor::{
    paths, ProcessSupervisor, ServiceState, StartOutcome, StopOutcome, SupervisorConfig,
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> SupervisorConfig {
    let mut config = SupervisorConfig::new(dir.path());
    config.poll_interval = Duration::from_millis(50);
    config
}

fn sleeper(name: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(name, vec!["/bin/sleep".into(), "30".into()])
}

/// A port that was free a moment ago and has no listener now.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn start_status_stop_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web")],
        Resolution::default(),
    );
    let web = ServiceName::from("web");

    let reports = supervisor.start(&[web.clone()], None).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, StartOutcome::Started);

    let status = supervisor.status(&web).await.expect("status");
    assert_eq!(status.state, ServiceState::Running);
    assert!(status.pid.is_some(), "running service must expose a pid");
    assert!(status.started_at.is_some());
    assert_eq!(
        status.healthy,
        Some(true),
        "no declared ports means vacuously healthy"
    );
    assert!(
        paths::pid_record_path(dir.path(), &web).exists(),
        "start must leave a pid record for later invocations"
    );

    let reports = supervisor.stop(&[web.clone()], None).await;
    assert_eq!(reports[0].outcome, StopOutcome::Stopped);

    let status = supervisor.status(&web).await.expect("status");
    assert_eq!(status.state, ServiceState::Stopped);
    assert!(status.pid.is_none());
    assert!(
        !paths::pid_record_path(dir.path(), &web).exists(),
        "stop must clean up the pid record"
    );
}

#[tokio::test]
async fn second_start_is_a_no_op() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web")],
        Resolution::default(),
    );
    let web = ServiceName::from("web");

    let first = supervisor.start(&[web.clone()], None).await;
    assert_eq!(first[0].outcome, StartOutcome::Started);
    let second = supervisor.start(&[web.clone()], None).await;
    assert_eq!(second[0].outcome, StartOutcome::AlreadyRunning);

    supervisor.stop(&[web], None).await;
}

#[tokio::test]
async fn stopping_a_stopped_service_is_a_no_op_every_time() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web")],
        Resolution::default(),
    );
    let web = ServiceName::from("web");

    for _ in 0..2 {
        let reports = supervisor.stop(&[web.clone()], None).await;
        assert_eq!(reports[0].outcome, StopOutcome::WasNotRunning);
    }
}

#[tokio::test]
async fn batch_reports_partial_failure_in_request_order() {
    let dir = TempDir::new().expect("tempdir");
    let broken = ServiceDescriptor::new("broken", vec!["/nonexistent/binary".into()]);
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web"), broken, sleeper("db")],
        Resolution::default(),
    );

    let request = [
        ServiceName::from("web"),
        ServiceName::from("broken"),
        ServiceName::from("db"),
    ];
    let reports = supervisor.start(&request, None).await;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].service, request[0]);
    assert_eq!(reports[0].outcome, StartOutcome::Started);
    assert!(
        matches!(&reports[1].outcome, StartOutcome::Failed { reason } if reason.contains("binary")),
        "got: {:?}",
        reports[1].outcome
    );
    assert_eq!(reports[2].service, request[2]);
    assert_eq!(
        reports[2].outcome,
        StartOutcome::Started,
        "one broken service must not stop the others"
    );

    supervisor.stop(&[], None).await;
}

#[tokio::test]
async fn undefined_property_reference_fails_only_that_service() {
    let dir = TempDir::new().expect("tempdir");
    let templated = ServiceDescriptor::new(
        "templated",
        vec!["/bin/echo".into(), "{{ missing.prop }}".into()],
    );
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![templated, sleeper("web")],
        Resolution::default(),
    );

    let reports = supervisor
        .start(
            &[ServiceName::from("templated"), ServiceName::from("web")],
            None,
        )
        .await;
    assert!(
        matches!(&reports[0].outcome, StartOutcome::Failed { reason } if reason.contains("missing.prop")),
        "got: {:?}",
        reports[0].outcome
    );
    assert_eq!(reports[1].outcome, StartOutcome::Started);

    supervisor.stop(&[], None).await;
}

#[tokio::test]
async fn unknown_service_fails_without_touching_the_rest() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web")],
        Resolution::default(),
    );

    let reports = supervisor
        .start(&[ServiceName::from("ghost"), ServiceName::from("web")], None)
        .await;
    assert!(
        matches!(&reports[0].outcome, StartOutcome::Failed { reason } if reason.contains("ghost")),
        "got: {:?}",
        reports[0].outcome
    );
    assert_eq!(reports[1].outcome, StartOutcome::Started);

    supervisor.stop(&[], None).await;
}

#[tokio::test]
async fn crash_during_startup_is_reported_with_the_exit_status() {
    let dir = TempDir::new().expect("tempdir");
    let mut crasher = ServiceDescriptor::new(
        "crasher",
        vec!["/bin/sh".into(), "-c".into(), "exit 3".into()],
    );
    // A port nothing listens on keeps the readiness loop polling long
    // enough to observe the exit.
    crasher.ports = vec![closed_port()];
    crasher.ready_timeout = Some(Duration::from_secs(5));
    let supervisor =
        ProcessSupervisor::new(config(&dir), vec![crasher], Resolution::default());

    let reports = supervisor.start(&[ServiceName::from("crasher")], None).await;
    assert!(
        matches!(&reports[0].outcome, StartOutcome::Failed { reason } if reason.contains("exited")),
        "got: {:?}",
        reports[0].outcome
    );

    let status = supervisor
        .status(&ServiceName::from("crasher"))
        .await
        .expect("status");
    assert_eq!(status.state, ServiceState::Failed);
}

#[tokio::test]
async fn unready_service_is_running_but_unhealthy() {
    let dir = TempDir::new().expect("tempdir");
    let mut web = sleeper("web");
    web.ports = vec![closed_port()];
    web.ready_timeout = Some(Duration::from_millis(300));
    let supervisor = ProcessSupervisor::new(config(&dir), vec![web], Resolution::default());
    let name = ServiceName::from("web");

    let reports = supervisor.start(&[name.clone()], None).await;
    assert!(
        matches!(&reports[0].outcome, StartOutcome::Failed { reason } if reason.contains("not ready")),
        "got: {:?}",
        reports[0].outcome
    );

    // The process was left running: alive but failing its probe is a
    // different answer than Failed.
    let status = supervisor.status(&name).await.expect("status");
    assert_eq!(status.state, ServiceState::Running);
    assert_eq!(status.healthy, Some(false));
    assert_eq!(status.ports.len(), 1);
    assert!(
        !status.ports[0].reachable,
        "the dead port must be reported per-port, not folded into state"
    );

    let reports = supervisor.stop(&[name.clone()], None).await;
    assert_eq!(reports[0].outcome, StopOutcome::Stopped);
}

#[tokio::test]
async fn batch_budget_expires_into_timed_out() {
    let dir = TempDir::new().expect("tempdir");
    let mut web = sleeper("web");
    web.ports = vec![closed_port()];
    let supervisor = ProcessSupervisor::new(config(&dir), vec![web], Resolution::default());
    let name = ServiceName::from("web");

    let reports = supervisor
        .start(&[name.clone()], Some(Duration::from_millis(250)))
        .await;
    assert_eq!(reports[0].outcome, StartOutcome::TimedOut);

    // Whatever got spawned is still observable afterwards.
    let status = supervisor.status(&name).await.expect("status");
    assert_eq!(status.state, ServiceState::Running);

    supervisor.stop(&[name], None).await;
}

#[tokio::test]
async fn exhausted_budget_launches_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web"), sleeper("db")],
        Resolution::default(),
    );
    let names = [ServiceName::from("web"), ServiceName::from("db")];

    let reports = supervisor.start(&names, Some(Duration::ZERO)).await;
    for report in &reports {
        assert_eq!(report.outcome, StartOutcome::TimedOut);
    }
    for name in &names {
        let status = supervisor.status(name).await.expect("status");
        assert_eq!(status.state, ServiceState::Stopped);
        assert!(!paths::pid_record_path(dir.path(), name).exists());
    }

    let reports = supervisor.stop(&names, Some(Duration::ZERO)).await;
    for report in &reports {
        assert_eq!(report.outcome, StopOutcome::TimedOut);
    }
}

#[tokio::test]
async fn stale_pid_record_is_cleaned_up_on_status() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web")],
        Resolution::default(),
    );
    let name = ServiceName::from("web");

    // A process that has already exited; its pid is no longer live.
    let dead_pid = {
        let mut child = std::process::Command::new("/bin/true")
            .spawn()
            .expect("spawn");
        let pid = child.id();
        child.wait().expect("wait");
        pid
    };
    let record = paths::pid_record_path(dir.path(), &name);
    std::fs::create_dir_all(record.parent().expect("parent")).expect("mkdir");
    std::fs::write(&record, format!("{dead_pid}\n")).expect("write record");

    let status = supervisor.status(&name).await.expect("status");
    assert_eq!(status.state, ServiceState::Stopped);
    assert!(
        !record.exists(),
        "stale record must be removed, got detail {:?}",
        status.detail
    );
}

#[tokio::test]
async fn a_later_supervisor_adopts_and_stops_a_recorded_process() {
    let dir = TempDir::new().expect("tempdir");
    let name = ServiceName::from("web");

    {
        let supervisor = ProcessSupervisor::new(
            config(&dir),
            vec![sleeper("web")],
            Resolution::default(),
        );
        let reports = supervisor.start(&[name.clone()], None).await;
        assert_eq!(reports[0].outcome, StartOutcome::Started);
    }

    // Fresh supervisor over the same state dir, as a new CLI run would build.
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web")],
        Resolution::default(),
    );
    let status = supervisor.status(&name).await.expect("status");
    assert_eq!(
        status.state,
        ServiceState::Running,
        "pid record must let a new supervisor find the process"
    );
    assert!(status.started_at.is_some(), "adopted start time from record");

    let reports = supervisor.stop(&[name.clone()], None).await;
    assert_eq!(reports[0].outcome, StopOutcome::Stopped);
    let status = supervisor.status(&name).await.expect("status");
    assert_eq!(status.state, ServiceState::Stopped);
}

#[tokio::test]
async fn status_all_covers_every_declared_service() {
    let dir = TempDir::new().expect("tempdir");
    let supervisor = ProcessSupervisor::new(
        config(&dir),
        vec![sleeper("web"), sleeper("db"), sleeper("cache")],
        Resolution::default(),
    );

    let statuses = supervisor.status_all().await;
    let names: Vec<&str> = statuses.iter().map(|s| s.service.0.as_str()).collect();
    assert_eq!(names, ["cache", "db", "web"]);
    assert!(statuses.iter().all(|s| s.state == ServiceState::Stopped));
}

#[tokio::test]
async fn custom_probe_gates_readiness() {
    let dir = TempDir::new().expect("tempdir");
    let marker = dir.path().join("run").join("web.ready");
    let mut web = sleeper("web");
    web.readiness = ReadinessStrategy::Custom {
        name: "ready_file".into(),
        probe: std::sync::Arc::new(|ctx| {
            Ok(ctx.state_dir.join("run").join("web.ready").exists())
        }),
    };
    web.ready_timeout = Some(Duration::from_secs(5));
    let supervisor = ProcessSupervisor::new(config(&dir), vec![web], Resolution::default());
    let name = ServiceName::from("web");

    // Create the marker shortly after start begins polling.
    let marker_task = {
        let marker = marker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::fs::create_dir_all(marker.parent().expect("parent")).expect("mkdir");
            std::fs::write(&marker, b"ok").expect("write marker");
        })
    };

    let reports = supervisor.start(&[name.clone()], None).await;
    marker_task.await.expect("marker task");
    assert_eq!(reports[0].outcome, StartOutcome::Started);

    supervisor.stop(&[name], None).await;
}
