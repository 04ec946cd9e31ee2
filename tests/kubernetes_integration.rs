// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests against a live Kubernetes cluster.
//!
//! These tests create and delete real namespaces and config maps.
//!
//! Run with: cargo test --test kubernetes_integration -- --ignored

mod common;

use address_controller::errors::ControllerError;
use address_controller::instance::InstanceManager;
use address_controller::platform::kubernetes::KubePlatform;
use address_controller::platform::Platform;
use address_controller::reconcilers::DestinationReconciler;
use address_controller::selector::Selector;
use common::{catalog, get_kube_client_or_skip, instance, queues};
use std::sync::Arc;

const TEST_CONTROLLER_NAMESPACE: &str = "default";

// ============================================================================
// Basic Connectivity Tests
// ============================================================================

#[tokio::test]
#[ignore] // Run with: cargo test --test kubernetes_integration -- --ignored
async fn test_list_configs_in_default_namespace() {
    println!("\n=== Test: Kubernetes Connectivity ===\n");

    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let platform = KubePlatform::new(client);

    match platform.list_configs("default", &Selector::new()).await {
        Ok(records) => println!("✓ Found {} config maps", records.len()),
        Err(e) => panic!("Failed to list config maps: {e}"),
    }
}

// ============================================================================
// Instance Lifecycle Tests
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_instance_lifecycle() {
    println!("\n=== Test: Instance Lifecycle ===\n");

    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    let platform: Arc<dyn Platform> = Arc::new(KubePlatform::new(client));
    let manager = InstanceManager::new(
        Arc::clone(&platform),
        Arc::new(catalog()),
        TEST_CONTROLLER_NAMESPACE,
    );
    let tenant = instance("address-controller-it");

    manager.create_instance(&tenant).await.expect("create instance");
    manager.create_instance(&tenant).await.expect("create instance again");
    println!("✓ Created instance {}", tenant.id);

    let stored = manager.get_instance(&tenant.id).await.expect("get instance");
    assert_eq!(stored.as_ref(), Some(&tenant));

    let api = manager.destinations(&tenant.id);
    api.put(vec![queues("orders", &["in"])]).await.expect("declare group");
    let reconciler =
        DestinationReconciler::new(Arc::clone(&platform), Arc::new(catalog()), tenant.id.clone());
    let outcome = reconciler.reconcile().await.expect("reconcile");
    assert_eq!(outcome.created, vec!["orders".to_string()]);
    println!("✓ Deployed group orders");

    let err = manager.delete_instance(&tenant.id).await.unwrap_err();
    assert!(matches!(err, ControllerError::InstanceInUse { .. }));
    println!("✓ Delete rejected while in use");

    api.delete(["in"]).await.expect("retract destinations");
    let outcome = reconciler.reconcile().await.expect("reconcile");
    assert_eq!(outcome.deleted, vec!["orders".to_string()]);

    manager.delete_instance(&tenant.id).await.expect("delete instance");
    println!("✓ Deleted instance {}", tenant.id);
}
