// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shapes of the labeled configuration records the controller reads and writes.
//!
//! Two kinds of records exist:
//!
//! - **instance records** (`instance-<id>`) in the controller namespace, one
//!   per tenant, holding the encoded [`Instance`] under [`INSTANCE_RECORD_KEY`]
//! - **address-config records** (`address-config-<instance>-<group>`) in the
//!   instance namespace, one per destination group, mapping each address to
//!   its encoded attributes
//!
//! Only the label keys are a bit-exact contract; see [`crate::labels`].

use crate::codec::{decode_destination, decode_instance, encode_destination, encode_instance};
use crate::constants::{ADDRESS_CONFIG_PREFIX, GROUP_ID_HASH_LENGTH, INSTANCE_RECORD_KEY};
use crate::errors::{ControllerError, Result};
use crate::labels::{
    APP_ENMASSE, LABEL_ADDRESS_CONFIG, LABEL_APP, LABEL_GROUP_ID, LABEL_INSTANCE, LABEL_TYPE,
    TYPE_ADDRESS_CONFIG, TYPE_INSTANCE,
};
use crate::model::{sanitize_name, Destination, DestinationGroup, Instance, InstanceId};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::warn;

/// Name of the address-config record of a group.
///
/// Group ids that sanitizing would alter get a suffix derived from the raw
/// id, so `orders.eu` and `orders-eu` never share a record.
#[must_use]
pub fn address_config_name(instance: &InstanceId, group_id: &str) -> String {
    let name = sanitize_name(&format!(
        "{ADDRESS_CONFIG_PREFIX}{}-{group_id}",
        instance.id()
    ));
    if sanitize_name(group_id) == group_id {
        return name;
    }

    let mut hasher = Sha256::new();
    hasher.update(group_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{name}-{}", &digest[..GROUP_ID_HASH_LENGTH])
}

/// Build the address-config record describing a group.
///
/// An empty group yields a record without entries, which tells the
/// reconciler to tear the group's bundle down.
#[must_use]
pub fn address_config_record(instance: &InstanceId, group: &DestinationGroup) -> ConfigMap {
    let name = address_config_name(instance, group.group_id());
    let data: BTreeMap<String, String> = group
        .destinations()
        .map(|destination| (destination.address.clone(), encode_destination(destination)))
        .collect();

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(BTreeMap::from([
                (LABEL_GROUP_ID.to_string(), group.group_id().to_string()),
                (LABEL_ADDRESS_CONFIG.to_string(), name),
                (LABEL_TYPE.to_string(), TYPE_ADDRESS_CONFIG.to_string()),
                (LABEL_INSTANCE.to_string(), instance.label_value()),
            ])),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Group id of an address-config record, from its `group-id` label.
#[must_use]
pub fn record_group_id(record: &ConfigMap) -> Option<&str> {
    record
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_GROUP_ID))
        .map(String::as_str)
}

/// Decode every entry of an address-config record.
///
/// Entries that fail to decode are logged and skipped; the returned count
/// says how many were dropped.
#[must_use]
pub fn decode_destinations(group_id: &str, record: &ConfigMap) -> (Vec<Destination>, usize) {
    let mut destinations = Vec::new();
    let mut malformed = 0;

    for (address, payload) in record.data.iter().flatten() {
        match decode_destination(address, group_id, payload) {
            Ok(destination) => destinations.push(destination),
            Err(e) => {
                malformed += 1;
                warn!(
                    record = record.metadata.name.as_deref().unwrap_or_default(),
                    group_id = %group_id,
                    error = %e,
                    "Skipping malformed address entry"
                );
            }
        }
    }

    (destinations, malformed)
}

/// Build the record persisting an instance.
#[must_use]
pub fn instance_record(instance: &Instance) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(instance.id.record_name()),
            labels: Some(BTreeMap::from([
                (LABEL_APP.to_string(), APP_ENMASSE.to_string()),
                (LABEL_TYPE.to_string(), TYPE_INSTANCE.to_string()),
                (LABEL_INSTANCE.to_string(), instance.id.label_value()),
            ])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            INSTANCE_RECORD_KEY.to_string(),
            encode_instance(instance),
        )])),
        ..Default::default()
    }
}

/// Decode the instance persisted in a record.
///
/// # Errors
///
/// Returns [`ControllerError::MalformedInstanceRecord`] if the record has no
/// payload or the payload does not decode.
pub fn instance_from_record(record: &ConfigMap) -> Result<Instance> {
    let name = record.metadata.name.as_deref().unwrap_or_default();
    let payload = record
        .data
        .as_ref()
        .and_then(|data| data.get(INSTANCE_RECORD_KEY))
        .ok_or_else(|| ControllerError::MalformedInstanceRecord {
            record: name.to_string(),
            reason: format!("missing '{INSTANCE_RECORD_KEY}' entry"),
        })?;

    decode_instance(name, payload)
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;
