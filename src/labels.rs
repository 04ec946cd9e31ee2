// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label keys and values shared by every resource the controller creates.
//!
//! Label keys are the only bit-exact contract between the controller, the API
//! adapters, and the templates: group membership and instance ownership are
//! established exclusively through them.

// ============================================================================
// Ownership Labels
// ============================================================================

/// Label carrying the application name on instance-owned resources
pub const LABEL_APP: &str = "app";

/// Label carrying the record or resource type
pub const LABEL_TYPE: &str = "type";

/// Label holding the sanitized instance id
pub const LABEL_INSTANCE: &str = "instance";

// ============================================================================
// Grouping Labels
// ============================================================================

/// Label carried by every group-owned resource; its value is the group id
pub const LABEL_GROUP_ID: &str = "group-id";

/// Label naming the address-config record of the group
pub const LABEL_ADDRESS_CONFIG: &str = "address-config";

/// Label naming the template a group bundle was rendered from
pub const LABEL_TEMPLATE: &str = "template";

// ============================================================================
// Label Values
// ============================================================================

/// Value of [`LABEL_APP`]
pub const APP_ENMASSE: &str = "enmasse";

/// Value of [`LABEL_TYPE`] on instance records and namespaces
pub const TYPE_INSTANCE: &str = "instance";

/// Value of [`LABEL_TYPE`] on address-config records
pub const TYPE_ADDRESS_CONFIG: &str = "address-config";
