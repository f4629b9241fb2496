// tests/supervisor.rs

#![cfg(unix)]

mod common;
use crate::common::fake_worker::{error_line, progress_line, FakeWorker};
use crate::common::{init_tracing, with_timeout, TestResult};

use std::sync::Arc;

use scrapedeck::config::PartialRunConfig;
use scrapedeck::engine::EventBridge;
use scrapedeck::errors::ControlError;
use scrapedeck::exec::{Lifecycle, Supervisor, STOP_GRACE};
use tokio::sync::Barrier;
use tokio::time::{sleep, timeout, Duration, Instant};

fn supervisor_for(worker: &FakeWorker) -> Supervisor {
    let (store, _fs) = worker.config_store();
    Supervisor::new(worker.spec(), store, Arc::new(EventBridge::new()))
}

#[tokio::test]
async fn clean_exit_publishes_one_stopped_notice_and_no_error() -> TestResult {
    init_tracing();
    let worker = FakeWorker::emitting(&[progress_line(1, 1)]);
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();
    let mut errors = sup.bridge().on_error();
    let mut progress = sup.bridge().on_progress();

    sup.start(&PartialRunConfig::default())?;

    let notice = with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
    assert_eq!(notice.code, Some(0));
    // Output written before exit is published before the stopped notice.
    assert_eq!(progress.try_recv().map(|p| p.data.completed), Some(1));
    assert!(errors.try_recv().is_none());
    assert_eq!(sup.status().state, Lifecycle::Idle);
    assert_eq!(sup.status().pid, None);
    Ok(())
}

#[tokio::test]
async fn worker_receives_run_config_as_environment() -> TestResult {
    let worker = FakeWorker::new(
        r#"printf '%s|%s|%s|%s|%s' "$SCRAPER_OUTPUT_DIR" "$SCRAPER_SERVICE_URL" "$SCRAPER_MAX_CONCURRENT" "$SCRAPER_BATCH_SIZE" "$SCRAPER_CONTROL_MODE" > env.txt"#,
    );
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();

    let cfg = sup.start(&PartialRunConfig {
        service_url: Some("http://svc.test:1234".into()),
        max_concurrency: Some(3),
        ..Default::default()
    })?;
    with_timeout(stopped.recv()).await;

    let env = std::fs::read_to_string(worker.dir().join("env.txt"))?;
    assert_eq!(
        env,
        format!("{}|http://svc.test:1234|3|50|1", cfg.output_dir.display())
    );
    Ok(())
}

#[tokio::test]
async fn interrupt_lets_a_cooperative_worker_exit() -> TestResult {
    let worker = FakeWorker::new(&format!(
        "trap 'exit 0' INT\necho '{}'\nwhile true; do sleep 0.05; done",
        progress_line(5, 0)
    ));
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();
    let mut progress = sup.bridge().on_progress();

    sup.start(&PartialRunConfig::default())?;
    with_timeout(progress.recv()).await.ok_or("worker never got ready")?;

    let started = Instant::now();
    sup.stop()?;
    assert_eq!(sup.status().state, Lifecycle::Stopping);

    let notice = with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
    assert_eq!(notice.code, Some(0));
    assert!(started.elapsed() < STOP_GRACE);
    assert_eq!(sup.status().state, Lifecycle::Idle);
    Ok(())
}

#[tokio::test]
async fn ignored_interrupt_escalates_to_kill_after_grace() -> TestResult {
    init_tracing();
    let worker = FakeWorker::new(&format!(
        "trap '' INT\necho '{}'\nwhile true; do sleep 0.05; done",
        progress_line(5, 0)
    ));
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();
    let mut progress = sup.bridge().on_progress();

    sup.start(&PartialRunConfig::default())?;
    with_timeout(progress.recv()).await.ok_or("worker never got ready")?;

    let started = Instant::now();
    sup.stop()?;
    // A second request while stopping is accepted and changes nothing.
    sup.stop()?;

    let notice = with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
    assert!(started.elapsed() >= STOP_GRACE);
    assert_eq!(notice.code, None);

    // Exactly one stopped notice per worker.
    assert!(timeout(Duration::from_millis(300), stopped.recv()).await.is_err());
    assert_eq!(sup.status().state, Lifecycle::Idle);
    Ok(())
}

#[tokio::test]
async fn stop_without_worker_is_rejected() {
    let worker = FakeWorker::new("exit 0");
    let sup = supervisor_for(&worker);

    assert!(matches!(sup.stop(), Err(ControlError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_admit_exactly_one_worker() -> TestResult {
    let worker = FakeWorker::new("trap 'exit 0' INT\nwhile true; do sleep 0.05; done");
    let sup = Arc::new(supervisor_for(&worker));
    let mut stopped = sup.bridge().on_stopped();
    let barrier = Arc::new(Barrier::new(8));

    let mut joins = Vec::new();
    for _ in 0..8 {
        let sup = sup.clone();
        let barrier = barrier.clone();
        joins.push(tokio::spawn(async move {
            barrier.wait().await;
            sup.start(&PartialRunConfig::default())
        }));
    }

    let mut ok = 0;
    let mut already_running = 0;
    for join in joins {
        match join.await? {
            Ok(_) => ok += 1,
            Err(ControlError::AlreadyRunning) => already_running += 1,
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(already_running, 7);

    sup.stop()?;
    with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
    Ok(())
}

#[tokio::test]
async fn spawn_failure_reports_error_and_returns_to_idle() -> TestResult {
    let worker = FakeWorker::new("exit 0");
    let (store, _fs) = worker.config_store();
    let spec = worker.spec().in_dir(worker.dir().join("does-not-exist"));
    let sup = Supervisor::new(spec, store, Arc::new(EventBridge::new()));
    let mut errors = sup.bridge().on_error();
    let mut stopped = sup.bridge().on_stopped();

    let res = sup.start(&PartialRunConfig::default());

    let err = match res {
        Err(err @ ControlError::SpawnFailure(_)) => err,
        other => return Err(format!("expected spawn failure, got {other:?}").into()),
    };
    let notice = errors.try_recv().ok_or("no error notice")?;
    assert_eq!(notice.data.message, err.to_string());
    assert_eq!(notice.run, 1);
    assert!(stopped.try_recv().is_none());
    assert_eq!(sup.status().state, Lifecycle::Idle);
    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected_before_spawning() {
    let worker = FakeWorker::new("touch spawned");
    let sup = supervisor_for(&worker);

    let res = sup.start(&PartialRunConfig {
        batch_size: Some(0),
        ..Default::default()
    });

    assert!(matches!(res, Err(ControlError::Config(_))));
    assert_eq!(sup.status().state, Lifecycle::Idle);
    sleep(Duration::from_millis(100)).await;
    assert!(!worker.dir().join("spawned").exists());
}

#[tokio::test]
async fn abnormal_exit_reports_error_then_stopped() -> TestResult {
    let worker = FakeWorker::new("echo 'crashing' >&2\nexit 3");
    let sup = supervisor_for(&worker);
    let mut errors = sup.bridge().on_error();
    let mut stopped = sup.bridge().on_stopped();

    sup.start(&PartialRunConfig::default())?;

    let notice = with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
    assert_eq!(notice.code, Some(3));
    let error = errors.try_recv().ok_or("no error notice")?;
    assert_eq!(error.data.code, Some(3));
    assert!(error.data.message.contains('3'));
    Ok(())
}

#[tokio::test]
async fn structured_error_replaces_generic_exit_error() -> TestResult {
    let worker = FakeWorker::new(&format!(
        "echo '{}'\nexit 2",
        error_line("service unreachable", Some(2))
    ));
    let sup = supervisor_for(&worker);
    let mut errors = sup.bridge().on_error();
    let mut stopped = sup.bridge().on_stopped();

    sup.start(&PartialRunConfig::default())?;
    with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;

    let error = errors.try_recv().ok_or("no error notice")?;
    assert_eq!(error.data.message, "service unreachable");
    assert!(errors.try_recv().is_none());
    Ok(())
}

#[tokio::test]
async fn worker_can_be_restarted_after_it_stops() -> TestResult {
    let worker = FakeWorker::new("exit 0");
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();

    for _ in 0..3 {
        sup.start(&PartialRunConfig::default())?;
        with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
    }
    Ok(())
}

#[tokio::test]
async fn shutdown_kills_the_worker_and_waits_for_it() -> TestResult {
    let worker = FakeWorker::new(&format!(
        "trap '' INT\necho '{}'\nwhile true; do sleep 0.05; done",
        progress_line(1, 0)
    ));
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();
    let mut progress = sup.bridge().on_progress();

    sup.start(&PartialRunConfig::default())?;
    with_timeout(progress.recv()).await.ok_or("worker never got ready")?;

    let started = Instant::now();
    sup.shutdown().await;

    assert!(started.elapsed() < STOP_GRACE);
    assert_eq!(stopped.try_recv().map(|n| n.code), Some(None));
    assert_eq!(sup.status().state, Lifecycle::Idle);
    Ok(())
}

#[tokio::test]
async fn each_run_tags_its_events_and_stopped_notice() -> TestResult {
    let worker = FakeWorker::emitting(&[progress_line(1, 1)]);
    let sup = supervisor_for(&worker);
    let mut stopped = sup.bridge().on_stopped();
    let mut progress = sup.bridge().on_progress();

    for expected in 1..=2u64 {
        sup.start(&PartialRunConfig::default())?;
        let notice = with_timeout(stopped.recv()).await.ok_or("no stopped notice")?;
        assert_eq!(notice.run, expected);
        assert_eq!(progress.try_recv().map(|p| p.run), Some(expected));
    }
    assert_eq!(sup.status().run, None);
    Ok(())
}
