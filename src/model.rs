// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain model: instances, destinations, destination groups and clusters.
//!
//! # Relationships
//!
//! - An [`Instance`] owns many [`DestinationGroup`]s by namespace containment
//! - A [`DestinationGroup`] holds many [`Destination`]s keyed by address
//! - A [`DestinationCluster`] pairs one group's declared destinations with the live
//!   resources labeled with its group id; it is rebuilt on every reconciliation pass

use crate::constants::INSTANCE_RECORD_PREFIX;
use crate::errors::{ControllerError, Result};
use crate::labels::{LABEL_ADDRESS_CONFIG, LABEL_TYPE, TYPE_ADDRESS_CONFIG};
use crate::platform::{ResourceBundle, ResourceKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Maximum length of a Kubernetes label value and namespace name
const MAX_NAME_LENGTH: usize = 63;

/// Sanitize an arbitrary name into a DNS-1123 label.
///
/// The result is lower-cased, every run of characters outside `[a-z0-9]` is
/// collapsed into a single `-`, and the result never starts or ends with `-`.
///
/// # Example
///
/// ```
/// use address_controller::model::sanitize_name;
///
/// assert_eq!(sanitize_name("Acme Corp!"), "acme-corp");
/// assert_eq!(sanitize_name("--orders__v2--"), "orders-v2");
/// ```
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !sanitized.is_empty() {
                sanitized.push('-');
            }
            pending_separator = false;
            sanitized.push(c);
        } else {
            pending_separator = true;
        }
    }

    sanitized
}

/// Check that a value can be stored as a Kubernetes label value.
#[must_use]
pub fn is_valid_label_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    !value.is_empty()
        && value.len() <= MAX_NAME_LENGTH
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

// ============================================================================
// Instances
// ============================================================================

/// Tenant identifier plus the namespace derived from it.
///
/// Two ids are equal iff both the id and the namespace match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    id: String,
    namespace: String,
}

impl InstanceId {
    /// Create an id whose namespace is derived from the id itself.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidInstanceId`] if the id sanitizes to an
    /// empty or over-long namespace name.
    pub fn with_id(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let namespace = id.clone();
        Self::with_id_and_namespace(id, namespace)
    }

    /// Create an id with an explicit namespace (sanitized like a derived one).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidInstanceId`] if the id is empty or the
    /// namespace sanitizes to an empty or over-long name.
    pub fn with_id_and_namespace(id: impl Into<String>, namespace: impl AsRef<str>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ControllerError::InvalidInstanceId {
                id,
                reason: "instance id must not be empty".to_string(),
            });
        }

        let namespace = sanitize_name(namespace.as_ref());
        if namespace.is_empty() {
            return Err(ControllerError::InvalidInstanceId {
                id,
                reason: "namespace contains no alphanumeric characters".to_string(),
            });
        }
        if namespace.len() > MAX_NAME_LENGTH {
            return Err(ControllerError::InvalidInstanceId {
                id,
                reason: format!("namespace exceeds {MAX_NAME_LENGTH} characters"),
            });
        }

        Ok(Self { id, namespace })
    }

    /// The opaque tenant identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The namespace holding the instance's resources
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Sanitized id, used as the `instance` label value
    #[must_use]
    pub fn label_value(&self) -> String {
        sanitize_name(&self.id)
    }

    /// Stable name of the configuration record persisting this instance
    #[must_use]
    pub fn record_name(&self) -> String {
        format!("{INSTANCE_RECORD_PREFIX}{}", self.label_value())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (namespace {})", self.id, self.namespace)
    }
}

/// One tenant: its id plus optional external endpoints.
///
/// Replaced as a whole; there are no partial updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Identifier and namespace
    pub id: InstanceId,
    /// Hostname of the messaging endpoint
    pub messaging_host: Option<String>,
    /// Hostname of the MQTT gateway endpoint
    pub mqtt_host: Option<String>,
    /// Hostname of the console endpoint
    pub console_host: Option<String>,
    /// Secret holding the endpoint certificate
    pub cert_secret: Option<String>,
}

impl Instance {
    /// Instance without any endpoints configured
    #[must_use]
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            messaging_host: None,
            mqtt_host: None,
            console_host: None,
            cert_secret: None,
        }
    }

    #[must_use]
    pub fn with_messaging_host(mut self, host: Option<String>) -> Self {
        self.messaging_host = host;
        self
    }

    #[must_use]
    pub fn with_mqtt_host(mut self, host: Option<String>) -> Self {
        self.mqtt_host = host;
        self
    }

    #[must_use]
    pub fn with_console_host(mut self, host: Option<String>) -> Self {
        self.console_host = host;
        self
    }

    #[must_use]
    pub fn with_cert_secret(mut self, secret: Option<String>) -> Self {
        self.cert_secret = secret;
        self
    }
}

// ============================================================================
// Destinations
// ============================================================================

/// A named address inside an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    /// Address name, unique within its group
    pub address: String,
    /// Owning group id
    pub group_id: String,
    /// Messages are stored in a broker before delivery
    pub store_and_forward: bool,
    /// Messages are delivered to every subscriber
    pub multicast: bool,
    /// Deployment template selector
    pub flavor: Option<String>,
    /// Stable identifier, assigned once and never changed
    pub uuid: Option<String>,
}

impl Destination {
    /// Destination with default (direct, unicast) semantics
    #[must_use]
    pub fn new(address: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            group_id: group_id.into(),
            store_and_forward: false,
            multicast: false,
            flavor: None,
            uuid: None,
        }
    }

    #[must_use]
    pub fn store_and_forward(mut self, store_and_forward: bool) -> Self {
        self.store_and_forward = store_and_forward;
        self
    }

    #[must_use]
    pub fn multicast(mut self, multicast: bool) -> Self {
        self.multicast = multicast;
        self
    }

    #[must_use]
    pub fn flavor(mut self, flavor: Option<String>) -> Self {
        self.flavor = flavor;
        self
    }

    #[must_use]
    pub fn uuid(mut self, uuid: Option<String>) -> Self {
        self.uuid = uuid;
        self
    }
}

/// Destinations sharing one group id; maps 1:1 to a deployable bundle.
///
/// Construction validates the group up front: the group id must be a valid
/// label value, every destination must belong to the group, and addresses
/// must be unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationGroup {
    group_id: String,
    destinations: BTreeMap<String, Destination>,
}

impl DestinationGroup {
    /// Build a group from its destinations.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::InvalidDestination`] for an invalid group id, an
    ///   empty address, or a destination belonging to another group
    /// - [`ControllerError::DuplicateAddress`] if an address appears twice
    pub fn new(
        group_id: impl Into<String>,
        destinations: impl IntoIterator<Item = Destination>,
    ) -> Result<Self> {
        let group_id = group_id.into();
        if !is_valid_label_value(&group_id) {
            return Err(ControllerError::InvalidDestination {
                address: group_id,
                reason: "group id must be a non-empty label value".to_string(),
            });
        }

        let mut by_address = BTreeMap::new();
        for destination in destinations {
            if destination.address.is_empty() {
                return Err(ControllerError::InvalidDestination {
                    address: destination.address,
                    reason: "address must not be empty".to_string(),
                });
            }
            if destination.group_id != group_id {
                return Err(ControllerError::InvalidDestination {
                    reason: format!(
                        "destination belongs to group '{}', not '{group_id}'",
                        destination.group_id
                    ),
                    address: destination.address,
                });
            }
            if by_address.contains_key(&destination.address) {
                return Err(ControllerError::DuplicateAddress {
                    group_id,
                    address: destination.address,
                });
            }
            by_address.insert(destination.address.clone(), destination);
        }

        Ok(Self {
            group_id,
            destinations: by_address,
        })
    }

    /// Group with no destinations; the desired-state signal for teardown
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidDestination`] for an invalid group id.
    pub fn empty(group_id: impl Into<String>) -> Result<Self> {
        Self::new(group_id, std::iter::empty())
    }

    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Destinations ordered by address
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.values()
    }

    #[must_use]
    pub fn get(&self, address: &str) -> Option<&Destination> {
        self.destinations.get(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Consume the group, yielding its destinations ordered by address
    #[must_use]
    pub fn into_destinations(self) -> Vec<Destination> {
        self.destinations.into_values().collect()
    }
}

// ============================================================================
// Destination Clusters
// ============================================================================

/// Runtime pairing of a group's declared destinations with its live resources.
///
/// This is a read model rebuilt from a full listing on every pass; its only
/// persisted identity is the group id label.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationCluster {
    /// Group id shared by every resource of the cluster
    pub group_id: String,
    /// Name of the group's address-config record
    pub address_config: String,
    /// Declared destinations decoded from the address-config record
    pub destinations: BTreeSet<Destination>,
    /// Live resources labeled with the group id
    pub resources: ResourceBundle,
}

impl DestinationCluster {
    /// Whether any destination is still declared for the group
    #[must_use]
    pub fn has_destinations(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Whether deployed workload resources exist besides the address-config record
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        self.resources.iter().any(|r| !self.is_address_config(r))
    }

    /// The deployed resources without the group's address-config record.
    ///
    /// The record belongs to the destination API and is never torn down by
    /// the reconciler.
    #[must_use]
    pub fn workload(&self) -> ResourceBundle {
        self.resources
            .iter()
            .filter(|r| !self.is_address_config(r))
            .cloned()
            .collect()
    }

    fn is_address_config(&self, resource: &crate::platform::PlatformResource) -> bool {
        resource.kind == ResourceKind::ConfigMap
            && (resource.name() == self.address_config
                || resource.label(LABEL_TYPE) == Some(TYPE_ADDRESS_CONFIG)
                    && resource.label(LABEL_ADDRESS_CONFIG) == Some(resource.name()))
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod model_tests;
