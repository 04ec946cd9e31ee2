// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the domain model.

#[cfg(test)]
mod tests {
    use crate::errors::ControllerError;
    use crate::model::*;
    use crate::platform::{PlatformResource, ResourceBundle};
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("acme"), "acme");
        assert_eq!(sanitize_name("Acme Corp"), "acme-corp");
        assert_eq!(sanitize_name("a..b__c"), "a-b-c");
        assert_eq!(sanitize_name("-leading-and-trailing-"), "leading-and-trailing");
        assert_eq!(sanitize_name("!!!"), "");
    }

    #[test]
    fn test_label_values() {
        assert!(is_valid_label_value("orders"));
        assert!(is_valid_label_value("orders_v2.eu"));
        assert!(!is_valid_label_value(""));
        assert!(!is_valid_label_value("-orders"));
        assert!(!is_valid_label_value("orders/eu"));
        assert!(!is_valid_label_value(&"a".repeat(64)));
    }

    #[test]
    fn test_instance_id_derives_namespace() {
        let id = InstanceId::with_id("Acme Corp").unwrap();
        assert_eq!(id.id(), "Acme Corp");
        assert_eq!(id.namespace(), "acme-corp");
        assert_eq!(id.label_value(), "acme-corp");
        assert_eq!(id.record_name(), "instance-acme-corp");
    }

    #[test]
    fn test_instance_id_equality_covers_namespace() {
        let derived = InstanceId::with_id("acme").unwrap();
        let explicit = InstanceId::with_id_and_namespace("acme", "acme").unwrap();
        let other = InstanceId::with_id_and_namespace("acme", "acme-prod").unwrap();

        assert_eq!(derived, explicit);
        assert_ne!(derived, other);
    }

    #[test]
    fn test_instance_id_rejects_unusable_ids() {
        assert!(matches!(
            InstanceId::with_id(""),
            Err(ControllerError::InvalidInstanceId { .. })
        ));
        assert!(matches!(
            InstanceId::with_id("???"),
            Err(ControllerError::InvalidInstanceId { .. })
        ));
        assert!(InstanceId::with_id("x".repeat(64)).is_err());
    }

    #[test]
    fn test_destination_group_rejects_duplicates() {
        let result = DestinationGroup::new(
            "orders",
            vec![
                Destination::new("in", "orders"),
                Destination::new("in", "orders").multicast(true),
            ],
        );

        assert_eq!(
            result,
            Err(ControllerError::DuplicateAddress {
                group_id: "orders".to_string(),
                address: "in".to_string(),
            })
        );
    }

    #[test]
    fn test_destination_group_rejects_foreign_destinations() {
        let result = DestinationGroup::new("orders", vec![Destination::new("in", "billing")]);
        assert!(matches!(
            result,
            Err(ControllerError::InvalidDestination { .. })
        ));

        assert!(DestinationGroup::new("orders", vec![Destination::new("", "orders")]).is_err());
        assert!(DestinationGroup::empty("not/a/label").is_err());
    }

    #[test]
    fn test_destination_group_orders_by_address() {
        let group = DestinationGroup::new(
            "orders",
            vec![
                Destination::new("out", "orders").multicast(true),
                Destination::new("in", "orders").store_and_forward(true),
            ],
        )
        .unwrap();

        let addresses: Vec<&str> = group.destinations().map(|d| d.address.as_str()).collect();
        assert_eq!(addresses, vec!["in", "out"]);
        assert_eq!(group.len(), 2);
        assert!(group.get("out").is_some_and(|d| d.multicast));
        assert!(DestinationGroup::empty("orders").unwrap().is_empty());
    }

    fn resource(kind: &str, name: &str, labels: serde_json::Value) -> PlatformResource {
        PlatformResource::from_object(json!({
            "kind": kind,
            "metadata": {"name": name, "labels": labels}
        }))
        .unwrap()
    }

    #[test]
    fn test_cluster_deployment_excludes_address_config_record() {
        let record = resource(
            "ConfigMap",
            "address-config-acme-orders",
            json!({"group-id": "orders", "address-config": "address-config-acme-orders"}),
        );
        let broker = resource("Deployment", "broker-orders", json!({"group-id": "orders"}));

        let mut cluster = DestinationCluster {
            group_id: "orders".to_string(),
            address_config: "address-config-acme-orders".to_string(),
            destinations: BTreeSet::new(),
            resources: vec![record].into_iter().collect(),
        };
        assert!(!cluster.is_deployed());
        assert!(cluster.workload().is_empty());

        cluster.resources.push(broker);
        assert!(cluster.is_deployed());
        let workload: ResourceBundle = cluster.workload();
        assert_eq!(workload.len(), 1);
        assert_eq!(workload.iter().next().map(PlatformResource::name), Some("broker-orders"));
    }

    #[test]
    fn test_cluster_has_destinations() {
        let cluster = DestinationCluster {
            group_id: "orders".to_string(),
            address_config: "address-config-acme-orders".to_string(),
            destinations: BTreeSet::from([Destination::new("in", "orders")]),
            resources: ResourceBundle::new(),
        };
        assert!(cluster.has_destinations());
        assert!(!cluster.is_deployed());
    }
}
