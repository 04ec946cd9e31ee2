// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `destinations.rs`

#[cfg(test)]
mod tests {
    use crate::destinations::DestinationApi;
    use crate::model::{Destination, DestinationGroup, InstanceId};
    use crate::platform::memory::InMemoryPlatform;
    use crate::platform::Platform;
    use std::sync::Arc;

    fn api() -> (Arc<InMemoryPlatform>, DestinationApi) {
        let platform = Arc::new(InMemoryPlatform::new());
        let api = DestinationApi::new(platform.clone(), InstanceId::with_id("acme").unwrap());
        (platform, api)
    }

    fn group(group_id: &str, addresses: &[&str]) -> DestinationGroup {
        DestinationGroup::new(
            group_id,
            addresses
                .iter()
                .map(|a| Destination::new(*a, group_id).store_and_forward(true)),
        )
        .unwrap()
    }

    fn addresses(group: &DestinationGroup) -> Vec<String> {
        group.destinations().map(|d| d.address.clone()).collect()
    }

    #[tokio::test]
    async fn test_put_then_list() {
        let (platform, api) = api();

        api.put(vec![group("orders", &["in", "out"]), group("billing", &["invoices"])])
            .await
            .unwrap();

        let groups: Vec<DestinationGroup> = api.list().await.unwrap().into_iter().collect();
        assert_eq!(groups.len(), 2);
        assert!(platform.config("acme", "address-config-acme-orders").is_some());
        assert!(platform.config("acme", "address-config-acme-billing").is_some());
    }

    #[tokio::test]
    async fn test_groups_differing_only_in_punctuation_are_kept_apart() {
        let (_, api) = api();

        api.put(vec![group("orders.eu", &["a"]), group("orders-eu", &["b"])])
            .await
            .unwrap();

        let groups: Vec<(String, Vec<String>)> = api
            .list()
            .await
            .unwrap()
            .iter()
            .map(|g| (g.group_id().to_string(), addresses(g)))
            .collect();
        assert_eq!(
            groups,
            vec![
                ("orders-eu".to_string(), vec!["b".to_string()]),
                ("orders.eu".to_string(), vec!["a".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_put_assigns_stable_uuids() {
        let (_, api) = api();

        api.put(vec![group("orders", &["in"])]).await.unwrap();
        let first = api.list().await.unwrap();
        let uuid = first
            .iter()
            .next()
            .and_then(|g| g.get("in"))
            .and_then(|d| d.uuid.clone())
            .expect("uuid assigned");
        assert!(uuid::Uuid::parse_str(&uuid).is_ok());

        // Resubmitting without uuids keeps the stored ones
        api.put(vec![group("orders", &["in"])]).await.unwrap();
        let second = api.list().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_put_with_unchanged_content_does_not_write() {
        let (platform, api) = api();
        api.put(vec![group("orders", &["in"])]).await.unwrap();
        let writes = platform.mutation_count();

        api.put(vec![group("orders", &["in"])]).await.unwrap();

        assert_eq!(platform.mutation_count(), writes);
    }

    #[tokio::test]
    async fn test_put_empties_omitted_groups() {
        let (platform, api) = api();
        api.put(vec![group("orders", &["in"]), group("billing", &["invoices"])])
            .await
            .unwrap();

        api.put(vec![group("orders", &["in"])]).await.unwrap();

        let groups = api.list().await.unwrap();
        assert_eq!(groups.len(), 1);
        let billing = platform
            .config("acme", "address-config-acme-billing")
            .expect("record is kept as teardown signal");
        assert!(billing.data.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_append_merges_into_existing_group() {
        let (_, api) = api();
        api.put(vec![group("orders", &["in"])]).await.unwrap();
        let before = api.list().await.unwrap();
        let in_uuid = before
            .iter()
            .next()
            .and_then(|g| g.get("in"))
            .and_then(|d| d.uuid.clone());

        api.append(vec![group("orders", &["out"]), group("billing", &["invoices"])])
            .await
            .unwrap();

        let groups: Vec<DestinationGroup> = api.list().await.unwrap().into_iter().collect();
        let orders = groups.iter().find(|g| g.group_id() == "orders").unwrap();
        assert_eq!(addresses(orders), vec!["in", "out"]);
        assert_eq!(orders.get("in").and_then(|d| d.uuid.clone()), in_uuid);
        assert!(groups.iter().any(|g| g.group_id() == "billing"));
    }

    #[tokio::test]
    async fn test_delete_removes_addresses() {
        let (_, api) = api();
        api.put(vec![group("orders", &["in", "out"]), group("billing", &["invoices"])])
            .await
            .unwrap();

        api.delete(["out", "invoices", "unknown"]).await.unwrap();

        let groups: Vec<DestinationGroup> = api.list().await.unwrap().into_iter().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(addresses(&groups[0]), vec!["in"]);
    }

    #[tokio::test]
    async fn test_list_of_fresh_instance_is_empty() {
        let (platform, api) = api();
        assert!(api.list().await.unwrap().is_empty());
        assert!(platform
            .list_configs("acme", &crate::selector::address_configs())
            .await
            .unwrap()
            .is_empty());
    }
}
