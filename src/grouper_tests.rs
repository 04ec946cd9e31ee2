// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `grouper.rs`

#[cfg(test)]
mod tests {
    use crate::grouper::{list_clusters, partition};
    use crate::model::{Destination, DestinationGroup, InstanceId};
    use crate::platform::memory::InMemoryPlatform;
    use crate::platform::{Platform, PlatformResource};
    use crate::records::address_config_record;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn acme() -> InstanceId {
        InstanceId::with_id("acme").unwrap()
    }

    fn broker(name: &str, group: &str, address_config: Option<&str>) -> PlatformResource {
        let mut labels = json!({"group-id": group});
        if let Some(address_config) = address_config {
            labels["address-config"] = json!(address_config);
        }
        PlatformResource::from_object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "labels": labels},
            "spec": {"replicas": 1}
        }))
        .unwrap()
    }

    fn orders_group() -> DestinationGroup {
        DestinationGroup::new(
            "orders",
            vec![
                Destination::new("in", "orders").store_and_forward(true),
                Destination::new("out", "orders").multicast(true),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_partition_ignores_unlabeled_resources() {
        let unlabeled = PlatformResource::from_object(json!({
            "kind": "Deployment",
            "metadata": {"name": "admin"}
        }))
        .unwrap();

        let groups = partition(vec![
            broker("a", "orders", None),
            unlabeled,
            broker("b", "billing", None),
            broker("c", "orders", None),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups["orders"].len(), 2);
        assert_eq!(groups["billing"].len(), 1);
    }

    #[tokio::test]
    async fn test_record_only_group_is_discovered() {
        let platform = InMemoryPlatform::new();
        platform
            .put_config("acme", &address_config_record(&acme(), &orders_group()))
            .await
            .unwrap();

        let clusters = list_clusters(&platform, "acme").await.unwrap();

        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.group_id, "orders");
        assert_eq!(cluster.address_config, "address-config-acme-orders");
        assert_eq!(cluster.destinations.len(), 2);
        assert!(cluster.has_destinations());
        assert!(!cluster.is_deployed());
    }

    #[tokio::test]
    async fn test_deployed_group_pairs_resources_with_record() {
        let platform = InMemoryPlatform::new();
        platform
            .put_config("acme", &address_config_record(&acme(), &orders_group()))
            .await
            .unwrap();
        platform
            .insert(
                "acme",
                broker("broker-orders", "orders", Some("address-config-acme-orders")),
            )
            .unwrap();

        let clusters = list_clusters(&platform, "acme").await.unwrap();

        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].is_deployed());
        assert_eq!(clusters[0].resources.len(), 2);
        assert_eq!(clusters[0].workload().len(), 1);
    }

    #[tokio::test]
    async fn test_group_without_record_is_skipped() {
        let platform = InMemoryPlatform::new();
        platform
            .insert("acme", broker("stray", "ghost", None))
            .unwrap();
        platform
            .insert(
                "acme",
                broker("dangling", "gone", Some("address-config-acme-gone")),
            )
            .unwrap();

        let clusters = list_clusters(&platform, "acme").await.unwrap();

        assert!(clusters.is_empty());
        // Orphans are left untouched
        assert_eq!(platform.mutation_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_skipped() {
        let platform = InMemoryPlatform::new();
        let mut record = address_config_record(&acme(), &orders_group());
        record
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert("broken".to_string(), "{\"multicast\":".to_string());
        platform.put_config("acme", &record).await.unwrap();

        let clusters = list_clusters(&platform, "acme").await.unwrap();

        assert_eq!(clusters.len(), 1);
        let addresses: Vec<&str> = clusters[0]
            .destinations
            .iter()
            .map(|d| d.address.as_str())
            .collect();
        assert_eq!(addresses, vec!["in", "out"]);
    }

    #[tokio::test]
    async fn test_emptied_record_yields_empty_cluster() {
        let platform = InMemoryPlatform::new();
        platform
            .put_config(
                "acme",
                &address_config_record(&acme(), &DestinationGroup::empty("orders").unwrap()),
            )
            .await
            .unwrap();

        let clusters = list_clusters(&platform, "acme").await.unwrap();

        assert_eq!(clusters.len(), 1);
        assert!(!clusters[0].has_destinations());
    }

    #[tokio::test]
    async fn test_clusters_are_scoped_to_namespace() {
        let platform = InMemoryPlatform::new();
        platform
            .put_config("acme", &address_config_record(&acme(), &orders_group()))
            .await
            .unwrap();

        assert!(list_clusters(&platform, "globex").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_platform_errors_propagate() {
        let platform = InMemoryPlatform::new();
        platform.set_unavailable(true);

        let err = list_clusters(&platform, "acme").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
