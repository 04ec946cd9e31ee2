// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use address_controller::instance::InstanceManager;
use address_controller::model::{Destination, DestinationGroup, Instance, InstanceId};
use address_controller::platform::memory::InMemoryPlatform;
use address_controller::platform::{PlatformResource, ResourceKind};
use address_controller::selector::Selector;
use address_controller::templates::TemplateCatalog;
use kube::client::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Namespace holding the instance records in tests
pub const CONTROLLER_NAMESPACE: &str = "enmasse-infra";

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// A group bundle template: one broker deployment and its volume claim
pub fn bundle_template(kind: &str) -> String {
    format!(
        r#"{{
            "parameters": [{{"name": "NAME"}}, {{"name": "GROUP_ID"}}],
            "objects": [
                {{
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": {{"name": "${{NAME}}-{kind}"}},
                    "spec": {{"replicas": 1, "group": "${{GROUP_ID}}"}}
                }},
                {{
                    "apiVersion": "v1",
                    "kind": "PersistentVolumeClaim",
                    "metadata": {{"name": "${{NAME}}-data"}}
                }}
            ]
        }}"#
    )
}

/// Catalog holding the three standard bundle templates
pub fn catalog() -> TemplateCatalog {
    let mut catalog = TemplateCatalog::new();
    for name in ["queue-persisted", "topic-persisted", "direct"] {
        catalog
            .insert_json(name, &bundle_template(name))
            .expect("template parses");
    }
    catalog
}

/// Fresh in-memory platform plus an instance manager on top of it
pub fn controller() -> (Arc<InMemoryPlatform>, InstanceManager) {
    let platform = Arc::new(InMemoryPlatform::new());
    let manager = InstanceManager::new(platform.clone(), Arc::new(catalog()), CONTROLLER_NAMESPACE);
    (platform, manager)
}

pub fn instance(id: &str) -> Instance {
    Instance::new(InstanceId::with_id(id).expect("valid instance id"))
}

/// Group of store-and-forward unicast destinations
pub fn queues(group_id: &str, addresses: &[&str]) -> DestinationGroup {
    DestinationGroup::new(
        group_id,
        addresses
            .iter()
            .map(|a| Destination::new(*a, group_id).store_and_forward(true)),
    )
    .expect("valid group")
}

/// Deployed workload of a group, records excluded
pub fn workload(platform: &InMemoryPlatform, namespace: &str, group_id: &str) -> Vec<PlatformResource> {
    platform
        .resources(namespace, &Selector::new().with("group-id", group_id))
        .into_iter()
        .filter(|r| r.kind != ResourceKind::ConfigMap)
        .collect()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
