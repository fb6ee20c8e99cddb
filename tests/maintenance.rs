// ABOUTME: Integration tests for maintenance mode.
// ABOUTME: Only services seen running on entry are restarted on exit.

mod support;

use pg_upgrader::diagnostics::WarningKind;
use pg_upgrader::maintenance::{MaintenanceError, MaintenanceMode};
use pg_upgrader::services::ServiceStatus;
use pg_upgrader::types::ServiceName;
use std::collections::BTreeSet;
use support::{FakeRunner, FakeServices, service};

fn mode(runner: &std::sync::Arc<FakeRunner>, services: &std::sync::Arc<FakeServices>) -> MaintenanceMode {
    MaintenanceMode::new(
        runner.clone(),
        services.clone(),
        nonempty::NonEmpty::new("deploy-page".to_string()),
        vec![
            service("postgresql"),
            service("nginx"),
            service("puma"),
            service("sidekiq"),
        ],
    )
}

fn excluded(names: &[&str]) -> BTreeSet<ServiceName> {
    names.iter().map(|n| service(n)).collect()
}

#[tokio::test]
async fn enable_stops_running_services_except_excluded() {
    let runner = FakeRunner::new();
    let services = FakeServices::running(&["postgresql", "nginx", "puma", "sidekiq"]);
    let maintenance = mode(&runner, &services);

    let snapshot = maintenance
        .enable(&excluded(&["postgresql", "nginx"]))
        .await
        .unwrap();

    assert_eq!(runner.count("deploy-page", "up"), 1);
    assert_eq!(services.calls(), vec!["stop puma", "stop sidekiq"]);
    assert!(snapshot.was_running(&service("puma")));
    assert!(!snapshot.was_running(&service("postgresql")));
    assert_eq!(services.status_of("postgresql"), ServiceStatus::Up);

    let warnings = maintenance.disable(snapshot).await;
    assert!(warnings.is_empty());
}

#[tokio::test]
async fn disable_restarts_only_previously_running_services() {
    let runner = FakeRunner::new();
    let services = FakeServices::running(&["postgresql", "puma"]);
    let maintenance = mode(&runner, &services);

    let snapshot = maintenance.enable(&excluded(&["postgresql"])).await.unwrap();
    assert_eq!(services.calls(), vec!["stop puma"]);

    let warnings = maintenance.disable(snapshot).await;

    assert!(warnings.is_empty());
    assert_eq!(runner.count("deploy-page", "down"), 1);
    assert_eq!(services.count("start puma"), 1);
    assert_eq!(services.count("start sidekiq"), 0);
    assert_eq!(services.count("start nginx"), 0);
    assert_eq!(services.status_of("sidekiq"), ServiceStatus::Down);
}

#[tokio::test]
async fn deploy_page_failure_returns_empty_snapshot() {
    let runner = FakeRunner::new();
    runner.fail("deploy-page", 1, "no such page");
    let services = FakeServices::running(&["postgresql", "puma"]);
    let maintenance = mode(&runner, &services);

    let Err((snapshot, err)) = maintenance.enable(&excluded(&["postgresql"])).await else {
        panic!("deploy page failure should abort maintenance mode");
    };

    assert!(matches!(err, MaintenanceError::DeployPage(_)));
    assert_eq!(snapshot.running().count(), 0);
    assert!(services.calls().is_empty());
}

#[tokio::test]
async fn disable_reports_failures_and_keeps_going() {
    let runner = FakeRunner::new();
    let services = FakeServices::running(&["postgresql", "puma", "sidekiq"]);
    let maintenance = mode(&runner, &services);

    let snapshot = maintenance.enable(&excluded(&["postgresql"])).await.unwrap();
    runner.fail("deploy-page", 1, "page stuck");
    services.fail_start("puma");

    let warnings = maintenance.disable(snapshot).await;

    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.kind == WarningKind::Maintenance));
    assert!(warnings[0].message.contains("deploy-page down"));
    assert!(warnings[0].message.ends_with("page stuck"));
    assert!(warnings[1].message.contains("puma"));
    assert_eq!(services.status_of("sidekiq"), ServiceStatus::Up);
}
