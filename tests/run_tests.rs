// End-to-end tests for the backup run: scripted drivers against a real
// temporary git working tree.

use netstash::config::{Credential, DeviceDescriptor, Platform};
use netstash::drivers::mock::{ScriptedDriver, Step};
use netstash::drivers::DriverRegistry;
use netstash::managers::dispatch::{CancelSource, DispatchLimits};
use netstash::managers::report::BackupStatus;
use netstash::managers::retry::RetryPolicy;
use netstash::managers::run::{RunCoordinator, RunSettings};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

fn descriptor(id: &str, platform: Platform) -> DeviceDescriptor {
    DeviceDescriptor {
        id: id.to_string(),
        address: format!("192.0.2.{}", id.len()),
        port: 22,
        platform,
        credential_ref: "lab".to_string(),
        groups: vec![],
        enabled: true,
    }
}

fn credentials() -> HashMap<String, Credential> {
    HashMap::from([(
        "lab".to_string(),
        Credential {
            username: "backup".to_string(),
            password: None,
        },
    )])
}

fn settings(backup_dir: &Path) -> RunSettings {
    RunSettings {
        backup_dir: backup_dir.to_path_buf(),
        limits: DispatchLimits {
            workers: 4,
            device_timeout: Duration::from_secs(5),
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        },
    }
}

fn commit_count(root: &Path) -> u32 {
    let output = Command::new("git")
        .args(["rev-list", "--count", "HEAD"])
        .current_dir(root)
        .output()
        .unwrap();
    if !output.status.success() {
        return 0; // no commits yet
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().unwrap()
}

#[tokio::test]
async fn two_vendor_scenario_commits_both_devices_once() {
    let dir = TempDir::new().unwrap();

    // r1 succeeds immediately; its raw text carries a volatile banner line
    let ios = ScriptedDriver::always_ok(
        "hostname r1\n! Last configuration change at 2024-01-01 by admin\n",
    );
    // r2 fails to connect twice, then succeeds
    let junos = ScriptedDriver::with_script(vec![
        Step::ConnectFail("connection refused".to_string()),
        Step::ConnectFail("connection refused".to_string()),
        Step::Ok("set system host-name r2\n".to_string()),
    ]);

    let registry = DriverRegistry::empty()
        .with_driver(Platform::CiscoIos, ios.clone())
        .with_driver(Platform::Junos, junos.clone());

    let coordinator = RunCoordinator::new(
        settings(dir.path()),
        vec![
            descriptor("r1", Platform::CiscoIos),
            descriptor("r2", Platform::Junos),
        ],
        credentials(),
        registry,
    );

    let report = coordinator.run(CancelSource::new().token()).await.unwrap();

    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.status == BackupStatus::Success));
    assert_eq!(report.results[0].device_id, "r1");
    assert_eq!(report.results[0].attempts, 1);
    assert_eq!(report.results[1].device_id, "r2");
    assert_eq!(report.results[1].attempts, 3);

    // One commit containing both files
    assert_eq!(commit_count(dir.path()), 1);
    let r1_content =
        std::fs::read_to_string(dir.path().join("configs/cisco_ios/r1.cfg")).unwrap();
    assert_eq!(r1_content, "hostname r1\n");
    let r2_content = std::fs::read_to_string(dir.path().join("configs/junos/r2.cfg")).unwrap();
    assert_eq!(r2_content, "set system host-name r2\n");
}

#[tokio::test]
async fn unchanged_configuration_produces_no_second_commit() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::always_ok("hostname r1\n");
    let registry = DriverRegistry::empty().with_driver(Platform::CiscoIos, driver);

    let coordinator = RunCoordinator::new(
        settings(dir.path()),
        vec![descriptor("r1", Platform::CiscoIos)],
        credentials(),
        registry,
    );

    let first = coordinator.run(CancelSource::new().token()).await.unwrap();
    assert!(first.all_succeeded());
    assert_eq!(commit_count(dir.path()), 1);

    let second = coordinator.run(CancelSource::new().token()).await.unwrap();
    assert!(second.all_succeeded());
    // Same content, same hash, no new commit
    assert_eq!(
        first.results[0].content_hash,
        second.results[0].content_hash
    );
    assert_eq!(commit_count(dir.path()), 1);
}

#[tokio::test]
async fn failing_device_does_not_affect_its_sibling() {
    let dir = TempDir::new().unwrap();
    let broken = ScriptedDriver::always_connect_fail("no route to host");
    let healthy = ScriptedDriver::always_ok("set system host-name good\n");

    let registry = DriverRegistry::empty()
        .with_driver(Platform::CiscoIos, broken)
        .with_driver(Platform::Junos, healthy);

    let coordinator = RunCoordinator::new(
        settings(dir.path()),
        vec![
            descriptor("bad", Platform::CiscoIos),
            descriptor("good", Platform::Junos),
        ],
        credentials(),
        registry,
    );

    let report = coordinator.run(CancelSource::new().token()).await.unwrap();

    let bad = report.results.iter().find(|r| r.device_id == "bad").unwrap();
    let good = report.results.iter().find(|r| r.device_id == "good").unwrap();

    assert_eq!(bad.status, BackupStatus::Failed);
    assert_eq!(bad.attempts, 3);
    assert!(bad.error.as_deref().unwrap().contains("no route to host"));

    assert_eq!(good.status, BackupStatus::Success);
    assert_eq!(commit_count(dir.path()), 1);
    assert!(dir.path().join("configs/junos/good.cfg").exists());
    // The failed device never receives a file write
    assert!(!dir.path().join("configs/cisco_ios/bad.cfg").exists());
}

#[tokio::test]
async fn timed_out_retrieval_fails_and_closes_the_session_once() {
    let dir = TempDir::new().unwrap();
    let slow = ScriptedDriver::with_script(vec![Step::SlowRetrieve(
        Duration::from_secs(60),
        "never seen".to_string(),
    )]);
    let registry =
        DriverRegistry::empty().with_driver(Platform::CiscoIos, slow.clone());

    let mut settings = settings(dir.path());
    settings.limits.device_timeout = Duration::from_millis(50);

    let coordinator = RunCoordinator::new(
        settings,
        vec![descriptor("slow", Platform::CiscoIos)],
        credentials(),
        registry,
    );

    let report = coordinator.run(CancelSource::new().token()).await.unwrap();
    let result = &report.results[0];
    assert_eq!(result.status, BackupStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("timed out"));

    // Abandoning the in-flight task still tears the session down, once
    assert_eq!(slow.close_count(), 1);
    assert_eq!(commit_count(dir.path()), 0);
}

#[tokio::test]
async fn disabled_device_is_skipped_without_any_connection() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::always_ok("hostname r1\n");
    let registry =
        DriverRegistry::empty().with_driver(Platform::CiscoIos, driver.clone());

    let mut disabled = descriptor("r1", Platform::CiscoIos);
    disabled.enabled = false;

    let coordinator = RunCoordinator::new(
        settings(dir.path()),
        vec![disabled],
        credentials(),
        registry,
    );

    let report = coordinator.run(CancelSource::new().token()).await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].status, BackupStatus::Skipped);
    assert_eq!(driver.connect_count(), 0);
    assert_eq!(commit_count(dir.path()), 0);
}

#[tokio::test]
async fn unusable_repository_aborts_before_any_device_is_touched() {
    let dir = TempDir::new().unwrap();
    // backup_dir collides with a regular file
    let file_path = dir.path().join("not-a-dir");
    std::fs::write(&file_path, "occupied").unwrap();

    let driver = ScriptedDriver::always_ok("hostname r1\n");
    let registry =
        DriverRegistry::empty().with_driver(Platform::CiscoIos, driver.clone());

    let coordinator = RunCoordinator::new(
        settings(&file_path),
        vec![descriptor("r1", Platform::CiscoIos)],
        credentials(),
        registry,
    );

    let result = coordinator.run(CancelSource::new().token()).await;
    assert!(result.is_err());
    assert_eq!(driver.connect_count(), 0);
}

#[tokio::test]
async fn cancelled_run_fails_devices_and_commits_nothing() {
    let dir = TempDir::new().unwrap();
    let slow = ScriptedDriver::with_script(vec![Step::SlowRetrieve(
        Duration::from_secs(60),
        "never seen".to_string(),
    )]);
    let registry = DriverRegistry::empty().with_driver(Platform::CiscoIos, slow);

    let coordinator = RunCoordinator::new(
        settings(dir.path()),
        vec![
            descriptor("r1", Platform::CiscoIos),
            descriptor("r2", Platform::CiscoIos),
        ],
        credentials(),
        registry,
    );

    let cancel = CancelSource::new();
    let token = cancel.token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let report = coordinator.run(token).await.unwrap();
    assert_eq!(report.results.len(), 2);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == BackupStatus::Failed));
    assert_eq!(commit_count(dir.path()), 0);
}
