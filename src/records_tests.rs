// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `records.rs`

#[cfg(test)]
mod tests {
    use crate::errors::ControllerError;
    use crate::model::{Destination, DestinationGroup, Instance, InstanceId};
    use crate::records::*;
    use std::collections::BTreeMap;

    fn acme() -> InstanceId {
        InstanceId::with_id("acme").unwrap()
    }

    #[test]
    fn test_address_config_name_is_sanitized() {
        assert_eq!(address_config_name(&acme(), "orders"), "address-config-acme-orders");

        let id = InstanceId::with_id("Acme Corp").unwrap();
        assert_eq!(
            address_config_name(&id, "orders-v2"),
            "address-config-acme-corp-orders-v2"
        );
    }

    #[test]
    fn test_address_config_name_keeps_distinct_groups_apart() {
        let dotted = address_config_name(&acme(), "orders.eu");
        let dashed = address_config_name(&acme(), "orders-eu");
        let underscored = address_config_name(&acme(), "orders_eu");

        assert_eq!(dashed, "address-config-acme-orders-eu");
        assert!(dotted.starts_with("address-config-acme-orders-eu-"));
        assert_eq!(dotted.len(), dashed.len() + 9);
        assert_ne!(dotted, dashed);
        assert_ne!(dotted, underscored);
        assert_ne!(underscored, dashed);
        assert_eq!(dotted, address_config_name(&acme(), "orders.eu"), "stable");
    }

    #[test]
    fn test_address_config_record_labels() {
        let group = DestinationGroup::new(
            "orders",
            vec![
                Destination::new("in", "orders").store_and_forward(true),
                Destination::new("out", "orders").multicast(true),
            ],
        )
        .unwrap();

        let record = address_config_record(&acme(), &group);
        let labels = record.metadata.labels.clone().unwrap();

        assert_eq!(record.metadata.name.as_deref(), Some("address-config-acme-orders"));
        assert_eq!(labels["group-id"], "orders");
        assert_eq!(labels["address-config"], "address-config-acme-orders");
        assert_eq!(labels["type"], "address-config");
        assert_eq!(labels["instance"], "acme");
        assert_eq!(record_group_id(&record), Some("orders"));
        assert_eq!(record.data.as_ref().map(BTreeMap::len), Some(2));
    }

    #[test]
    fn test_record_round_trips_destinations() {
        let group = DestinationGroup::new(
            "orders",
            vec![
                Destination::new("in", "orders").store_and_forward(true),
                Destination::new("out", "orders")
                    .multicast(true)
                    .uuid(Some("42".to_string())),
            ],
        )
        .unwrap();

        let record = address_config_record(&acme(), &group);
        let (destinations, malformed) = decode_destinations("orders", &record);

        assert_eq!(malformed, 0);
        assert_eq!(destinations, group.into_destinations());
    }

    #[test]
    fn test_decode_destinations_skips_malformed_entries() {
        let mut record = address_config_record(&acme(), &DestinationGroup::empty("orders").unwrap());
        record.data = Some(BTreeMap::from([
            (
                "a".to_string(),
                r#"{"store_and_forward":true,"multicast":false}"#.to_string(),
            ),
            ("b".to_string(), "{broken".to_string()),
            (
                "c".to_string(),
                r#"{"store_and_forward":false,"multicast":true}"#.to_string(),
            ),
        ]));

        let (destinations, malformed) = decode_destinations("orders", &record);

        assert_eq!(malformed, 1);
        let addresses: Vec<&str> = destinations.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "c"]);
    }

    #[test]
    fn test_record_without_data_has_no_destinations() {
        let mut record = address_config_record(&acme(), &DestinationGroup::empty("orders").unwrap());
        record.data = None;
        assert_eq!(decode_destinations("orders", &record), (Vec::new(), 0));
    }

    #[test]
    fn test_instance_record_shape() {
        let instance = Instance::new(acme());
        let record = instance_record(&instance);
        let labels = record.metadata.labels.clone().unwrap();

        assert_eq!(record.metadata.name.as_deref(), Some("instance-acme"));
        assert_eq!(labels["app"], "enmasse");
        assert_eq!(labels["type"], "instance");
        assert_eq!(labels["instance"], "acme");
        assert!(record.data.as_ref().unwrap().contains_key("instance"));
        assert_eq!(instance_from_record(&record).unwrap(), instance);
    }

    #[test]
    fn test_instance_record_without_payload_is_malformed() {
        let mut record = instance_record(&Instance::new(acme()));
        record.data = None;

        assert!(matches!(
            instance_from_record(&record),
            Err(ControllerError::MalformedInstanceRecord { record, .. }) if record == "instance-acme"
        ));
    }
}
