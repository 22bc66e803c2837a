//! Stories about provisioning and reclaiming execution units on a live
//! cluster

use std::sync::Arc;

use podwright::common::naming::{pod_name, service_name, unit_selector};
use podwright::controller::{ClusterClient, EventWatcher, ResourceKind, TracingLogSink};

use super::helpers::{
    sample_unit, test_client, test_config, test_orchestrator, unique_unit_id, TEST_NAMESPACE,
};

async fn live_names(client: &dyn ClusterClient, kind: ResourceKind, unit_id: &str) -> Vec<String> {
    let selector = unit_selector(&test_config().unit_label_key, unit_id);
    client
        .list(kind, TEST_NAMESPACE, &selector)
        .await
        .expect("listing should succeed")
}

/// Story: a unit is provisioned, every object carries its label, and
/// cleanup removes all of them. A second cleanup finds nothing to do.
#[tokio::test]
#[ignore]
async fn story_provision_then_reclaim_a_unit() {
    let client = test_client().await;
    let orchestrator = test_orchestrator(client.clone());
    let unit_id = unique_unit_id("e2e-life");

    let report = orchestrator
        .init(&unit_id, &sample_unit())
        .await
        .expect("init should succeed")
        .completed()
        .expect("init should not be abandoned");
    assert_eq!(report.pod, pod_name(&unit_id));
    assert_eq!(report.service, service_name(&unit_id));

    assert_eq!(
        live_names(&*client, ResourceKind::Pod, &unit_id).await,
        vec![pod_name(&unit_id)]
    );
    assert_eq!(
        live_names(&*client, ResourceKind::Secret, &unit_id)
            .await
            .len(),
        report.secrets.count()
    );

    let cleanup = orchestrator
        .cleanup(&unit_id)
        .await
        .expect("cleanup should succeed")
        .completed()
        .expect("cleanup should not be abandoned");
    assert_eq!(cleanup.total_failed(), 0);
    assert_eq!(cleanup.pods.deleted, 1);
    assert_eq!(cleanup.services.deleted, 1);

    let again = orchestrator
        .cleanup(&unit_id)
        .await
        .expect("second cleanup should succeed")
        .completed()
        .expect("second cleanup should not be abandoned");
    assert_eq!(again.total_deleted(), 0);
}

/// Story: two units share the namespace; cleaning one leaves the other
/// untouched
#[tokio::test]
#[ignore]
async fn story_cleanup_is_scoped_to_one_unit() {
    let client = test_client().await;
    let orchestrator = test_orchestrator(client.clone());
    let keep = unique_unit_id("e2e-keep");
    let drop = unique_unit_id("e2e-drop");

    for unit_id in [&keep, &drop] {
        orchestrator
            .init(unit_id, &sample_unit())
            .await
            .expect("init should succeed");
    }

    orchestrator
        .cleanup(&drop)
        .await
        .expect("cleanup should succeed");

    assert!(live_names(&*client, ResourceKind::Pod, &drop)
        .await
        .is_empty());
    assert_eq!(
        live_names(&*client, ResourceKind::Pod, &keep).await,
        vec![pod_name(&keep)]
    );

    orchestrator
        .cleanup(&keep)
        .await
        .expect("cleanup should succeed");
}

/// Story: an operator watches a freshly provisioned unit and stops the
/// watch before the server closes it
#[tokio::test]
#[ignore]
async fn story_watch_a_provisioned_unit() {
    let client = test_client().await;
    let orchestrator = test_orchestrator(client.clone());
    let unit_id = unique_unit_id("e2e-watch");

    orchestrator
        .init(&unit_id, &sample_unit())
        .await
        .expect("init should succeed");

    let watcher = EventWatcher::new(client, Arc::new(TracingLogSink), test_config());
    let handle = watcher.start(&unit_id);
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    let forwarded = handle.stop().await;
    assert!(forwarded.is_some(), "watch should stop within its grace period");

    orchestrator
        .cleanup(&unit_id)
        .await
        .expect("cleanup should succeed");
}
