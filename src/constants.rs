// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the address controller.
//!
//! This module contains the numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Record Constants
// ============================================================================

/// Prefix of the configuration record holding one instance (`instance-<id>`)
pub const INSTANCE_RECORD_PREFIX: &str = "instance-";

/// Data key under which the encoded instance is stored in its record
pub const INSTANCE_RECORD_KEY: &str = "instance";

/// Prefix of the configuration record holding one destination group
pub const ADDRESS_CONFIG_PREFIX: &str = "address-config-";

/// Hex digits of the group id digest appended to record names of group ids
/// that are not already DNS labels
pub const GROUP_ID_HASH_LENGTH: usize = 8;

// ============================================================================
// Template Constants
// ============================================================================

/// Default directory holding bundle templates
pub const DEFAULT_TEMPLATE_DIR: &str = "/templates";

/// Template for store-and-forward unicast groups
pub const TEMPLATE_QUEUE_PERSISTED: &str = "queue-persisted";

/// Template for store-and-forward multicast groups
pub const TEMPLATE_TOPIC_PERSISTED: &str = "topic-persisted";

/// Template for groups routed without a broker
pub const TEMPLATE_DIRECT: &str = "direct";

/// Template parameter: object name prefix for a group bundle
pub const PARAM_NAME: &str = "NAME";

/// Template parameter: owning instance id
pub const PARAM_INSTANCE: &str = "INSTANCE";

/// Template parameter: group id
pub const PARAM_GROUP_ID: &str = "GROUP_ID";

/// Template parameter: address-config record name
pub const PARAM_ADDRESS_CONFIG: &str = "ADDRESS_CONFIG";

/// Template parameter: the address of a single-destination group
pub const PARAM_ADDRESS: &str = "ADDRESS";

/// Template parameter: messaging endpoint hostname
pub const PARAM_MESSAGING_HOSTNAME: &str = "MESSAGING_HOSTNAME";

/// Template parameter: MQTT gateway hostname
pub const PARAM_MQTT_GATEWAY_HOSTNAME: &str = "MQTT_GATEWAY_HOSTNAME";

/// Template parameter: console hostname
pub const PARAM_CONSOLE_HOSTNAME: &str = "CONSOLE_HOSTNAME";

/// Template parameter: router certificate secret
pub const PARAM_ROUTER_SECRET: &str = "ROUTER_SECRET";

// ============================================================================
// Access Policy Constants
// ============================================================================

/// Name of the role binding granting view access inside an instance namespace
pub const VIEW_ROLE_BINDING_NAME: &str = "view";

/// Cluster role granted to the default identity
pub const VIEW_CLUSTER_ROLE: &str = "view";

/// Default service account of every namespace
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Service account file holding the namespace the controller runs in
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Default number of concurrently running event handlers
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Default bind address of the metrics endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Buffered watch events per subscription
pub const WATCH_EVENT_BUFFER: usize = 256;

/// Page size for Kubernetes API list operations
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

