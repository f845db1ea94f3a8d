use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use orchestrator_core::{OrchestratorError, RegistryConfig};
use orchestrator_registry::{ServiceDiscovery, ServiceRegistry};
use orchestrator_testing_utils::{dependency_chain, RecordingNotifier, RegistrationBuilder, TestEnv};

fn registry() -> ServiceRegistry {
    ServiceRegistry::new(RegistryConfig::default(), None)
}

#[tokio::test]
async fn chain_resolves_in_dependency_order() {
    let registry = registry();
    for registration in dependency_chain(&["A", "B", "C"]).into_iter().rev() {
        registry.register_service(registration).await;
    }

    let order = registry.resolve_dependency_order(None).await.unwrap();
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("A") < pos("B"));
    assert!(pos("B") < pos("C"));
}

#[tokio::test]
async fn mutual_dependency_is_reported_as_cycle() {
    let registry = registry();
    registry
        .register_service(RegistrationBuilder::new("A").depends_on("B").build())
        .await;
    registry
        .register_service(RegistrationBuilder::new("B").depends_on("A").build())
        .await;

    match registry.resolve_dependency_order(None).await {
        Err(OrchestratorError::CircularDependency { service_id }) => {
            assert!(service_id == "A" || service_id == "B");
        }
        other => panic!("expected cycle, got {other:?}"),
    }

    let discovery = ServiceDiscovery::new(registry);
    assert_eq!(discovery.get_startup_order(None).await.len(), 2);
}

#[tokio::test]
async fn offline_service_is_cleaned_on_next_sweep() {
    let notifier = RecordingNotifier::new();
    let config = RegistryConfig {
        offline_timeout: Duration::from_millis(120_000),
        enable_auto_cleanup: true,
        ..RegistryConfig::default()
    };
    let registry = ServiceRegistry::new(config, Some(Arc::new(notifier.clone())));
    registry
        .register_service(
            RegistrationBuilder::new("old")
                .last_seen_ago(ChronoDuration::minutes(3))
                .build(),
        )
        .await;

    let report = registry.run_health_check(Utc::now()).await;

    assert_eq!(report.removed, vec!["old".to_string()]);
    assert_eq!(registry.get_status().await.total, 0);
    TestEnv::settle().await;
    assert_eq!(notifier.matching("服务已注销").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn background_monitor_marks_silent_service_unhealthy() {
    let config = RegistryConfig {
        health_check_interval: Duration::from_secs(1),
        offline_timeout: Duration::from_secs(3600),
        enable_auto_cleanup: true,
    };
    let registry = ServiceRegistry::new(config, None);
    registry
        .register_service(
            RegistrationBuilder::new("quiet")
                .last_seen_ago(ChronoDuration::seconds(10))
                .build(),
        )
        .await;

    registry.start_health_monitor().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    registry.stop_health_monitor().await;

    let health = registry.get_service_health("quiet").await.unwrap();
    assert!(!health.status.is_healthy());
}
