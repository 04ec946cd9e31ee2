// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Encoding of destinations and instances into configuration record values.
//!
//! A destination is stored as one entry of its group's address-config record:
//! the key is the address, the value is a small JSON object:
//!
//! ```json
//! {"store_and_forward": true, "multicast": false, "flavor": "vanilla-queue", "uuid": "..."}
//! ```
//!
//! `store_and_forward` and `multicast` are required; `flavor` and `uuid` are
//! omitted when unset. Unknown fields are ignored when decoding so newer
//! writers stay readable.
//!
//! An instance is stored as camelCase JSON under a single key of its record.

use crate::errors::{ControllerError, Result};
use crate::model::{Destination, Instance, InstanceId};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Decoded attributes of one address entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressProperties {
    pub store_and_forward: bool,
    pub multicast: bool,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Encode address attributes.
///
/// # Example
///
/// ```
/// use address_controller::codec::{decode, encode};
///
/// let payload = encode(true, false, Some("vanilla-queue"), None);
/// let decoded = decode(&payload).unwrap();
/// assert!(decoded.store_and_forward);
/// assert_eq!(decoded.flavor.as_deref(), Some("vanilla-queue"));
/// assert_eq!(decoded.uuid, None);
/// ```
#[must_use]
pub fn encode(
    store_and_forward: bool,
    multicast: bool,
    flavor: Option<&str>,
    uuid: Option<&str>,
) -> String {
    let mut payload = Map::new();
    payload.insert("store_and_forward".to_string(), Value::Bool(store_and_forward));
    payload.insert("multicast".to_string(), Value::Bool(multicast));
    if let Some(flavor) = flavor {
        payload.insert("flavor".to_string(), Value::String(flavor.to_string()));
    }
    if let Some(uuid) = uuid {
        payload.insert("uuid".to_string(), Value::String(uuid.to_string()));
    }
    Value::Object(payload).to_string()
}

/// Decode address attributes.
///
/// # Errors
///
/// Returns [`ControllerError::MalformedAddressRecord`] if the payload is not
/// JSON or a required field is missing or mistyped.
pub fn decode(payload: &str) -> Result<AddressProperties> {
    serde_json::from_str(payload).map_err(|e| ControllerError::MalformedAddressRecord {
        reason: e.to_string(),
    })
}

/// Encode the stored attributes of a destination.
#[must_use]
pub fn encode_destination(destination: &Destination) -> String {
    encode(
        destination.store_and_forward,
        destination.multicast,
        destination.flavor.as_deref(),
        destination.uuid.as_deref(),
    )
}

/// Decode one record entry into a destination of `group_id`.
///
/// # Errors
///
/// Returns [`ControllerError::MalformedAddressRecord`] naming the address if
/// the payload does not decode.
pub fn decode_destination(address: &str, group_id: &str, payload: &str) -> Result<Destination> {
    let properties = decode(payload).map_err(|e| ControllerError::MalformedAddressRecord {
        reason: format!("address '{address}': {e}"),
    })?;

    Ok(Destination::new(address, group_id)
        .store_and_forward(properties.store_and_forward)
        .multicast(properties.multicast)
        .flavor(properties.flavor)
        .uuid(properties.uuid))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceRecord {
    id: String,
    namespace: String,
    #[serde(default)]
    messaging_host: Option<String>,
    #[serde(default)]
    mqtt_host: Option<String>,
    #[serde(default)]
    console_host: Option<String>,
    #[serde(default)]
    cert_secret: Option<String>,
}

/// Encode an instance. Unset optional fields are omitted.
#[must_use]
pub fn encode_instance(instance: &Instance) -> String {
    let mut payload = json!({
        "id": instance.id.id(),
        "namespace": instance.id.namespace(),
    });
    if let Value::Object(fields) = &mut payload {
        for (key, value) in [
            ("messagingHost", &instance.messaging_host),
            ("mqttHost", &instance.mqtt_host),
            ("consoleHost", &instance.console_host),
            ("certSecret", &instance.cert_secret),
        ] {
            if let Some(value) = value {
                fields.insert(key.to_string(), Value::String(value.clone()));
            }
        }
    }
    payload.to_string()
}

/// Decode an instance stored in record `record`.
///
/// # Errors
///
/// Returns [`ControllerError::MalformedInstanceRecord`] if the payload does
/// not decode or carries an unusable id.
pub fn decode_instance(record: &str, payload: &str) -> Result<Instance> {
    let malformed = |reason: String| ControllerError::MalformedInstanceRecord {
        record: record.to_string(),
        reason,
    };

    let decoded: InstanceRecord =
        serde_json::from_str(payload).map_err(|e| malformed(e.to_string()))?;
    let id = InstanceId::with_id_and_namespace(decoded.id, &decoded.namespace)
        .map_err(|e| malformed(e.to_string()))?;

    Ok(Instance::new(id)
        .with_messaging_host(decoded.messaging_host)
        .with_mqtt_host(decoded.mqtt_host)
        .with_console_host(decoded.console_host)
        .with_cert_secret(decoded.cert_secret))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod codec_tests;
