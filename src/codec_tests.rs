// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `codec.rs`

#[cfg(test)]
mod tests {
    use crate::codec::*;
    use crate::errors::ControllerError;
    use crate::model::{Destination, Instance, InstanceId};

    #[test]
    fn test_round_trip_all_flag_combinations() {
        let flavors = [None, Some("vanilla-queue")];
        let uuids = [None, Some("0f8a7e1c-6a2b-4c5d-9e0f-1a2b3c4d5e6f")];

        for store_and_forward in [false, true] {
            for multicast in [false, true] {
                for flavor in flavors {
                    for uuid in uuids {
                        let decoded =
                            decode(&encode(store_and_forward, multicast, flavor, uuid)).unwrap();
                        assert_eq!(
                            decoded,
                            AddressProperties {
                                store_and_forward,
                                multicast,
                                flavor: flavor.map(str::to_string),
                                uuid: uuid.map(str::to_string),
                            }
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_encode_omits_unset_fields() {
        let payload: serde_json::Value =
            serde_json::from_str(&encode(true, false, None, None)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"store_and_forward": true, "multicast": false})
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let decoded =
            decode(r#"{"store_and_forward":false,"multicast":true,"priority":9}"#).unwrap();
        assert!(decoded.multicast);
        assert!(!decoded.store_and_forward);
    }

    #[test]
    fn test_decode_accepts_null_optionals() {
        let decoded = decode(
            r#"{"store_and_forward":true,"multicast":false,"flavor":null,"uuid":null}"#,
        )
        .unwrap();
        assert_eq!(decoded.flavor, None);
        assert_eq!(decoded.uuid, None);
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        for payload in [
            "",
            "not json",
            r#"{"multicast":true}"#,
            r#"{"store_and_forward":"yes","multicast":true}"#,
            "[]",
        ] {
            assert!(
                matches!(
                    decode(payload),
                    Err(ControllerError::MalformedAddressRecord { .. })
                ),
                "payload {payload:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_destination_round_trip() {
        let destination = Destination::new("in", "orders")
            .store_and_forward(true)
            .flavor(Some("vanilla-queue".to_string()))
            .uuid(Some("1234".to_string()));

        let decoded =
            decode_destination("in", "orders", &encode_destination(&destination)).unwrap();
        assert_eq!(decoded, destination);
    }

    #[test]
    fn test_decode_destination_names_address() {
        let err = decode_destination("in", "orders", "{").unwrap_err();
        assert!(err.to_string().contains("'in'"));
    }

    #[test]
    fn test_instance_without_hosts() {
        let instance = Instance::new(InstanceId::with_id("acme").unwrap());
        let payload = encode_instance(&instance);

        assert_eq!(payload, r#"{"id":"acme","namespace":"acme"}"#);
        assert_eq!(decode_instance("instance-acme", &payload).unwrap(), instance);
    }

    #[test]
    fn test_instance_with_hosts() {
        let instance = Instance::new(InstanceId::with_id_and_namespace("acme", "acme-prod").unwrap())
            .with_messaging_host(Some("messaging.acme.example.com".to_string()))
            .with_console_host(Some("console.acme.example.com".to_string()))
            .with_cert_secret(Some("acme-certs".to_string()));

        let decoded = decode_instance("instance-acme", &encode_instance(&instance)).unwrap();
        assert_eq!(decoded, instance);
        assert_eq!(decoded.mqtt_host, None);
    }

    #[test]
    fn test_decode_instance_rejects_bad_records() {
        for payload in ["{}", r#"{"id":"","namespace":"acme"}"#, "garbage"] {
            assert!(matches!(
                decode_instance("instance-x", payload),
                Err(ControllerError::MalformedInstanceRecord { .. })
            ));
        }
    }
}
