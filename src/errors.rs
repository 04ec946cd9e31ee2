// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error taxonomy of the address controller.
//!
//! Errors are contained at the smallest unit that can fail:
//! - codec and grouping errors stay local to one record entry and are logged
//! - lifecycle errors surface to the caller of the triggering API call
//! - platform errors are classified as transient (retried) or permanent
//!
//! No error in this crate is allowed to terminate a watch subscription for
//! unrelated objects.

use thiserror::Error;

/// Errors raised by the address controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// An encoded address entry could not be decoded.
    ///
    /// Local to one entry of an address-config record; the rest of the group
    /// is still processed.
    #[error("Malformed address record: {reason}")]
    MalformedAddressRecord {
        /// Why the payload was rejected
        reason: String,
    },

    /// An instance configuration record could not be decoded
    #[error("Malformed instance record '{record}': {reason}")]
    MalformedInstanceRecord {
        /// Name of the configuration record
        record: String,
        /// Why the record was rejected
        reason: String,
    },

    /// Resources carry a group id but no address-config record exists for them.
    ///
    /// Orphaned resources are logged and left untouched.
    #[error("Resource group '{group_id}' in namespace {namespace} has no address configuration")]
    OrphanedResourceGroup {
        /// Namespace holding the resources
        namespace: String,
        /// Group id carried by the resources
        group_id: String,
    },

    /// Instance deletion blocked by destination clusters that still have destinations
    #[error("Instance '{instance}' still owns {clusters} destination cluster(s) with live destinations")]
    InstanceInUse {
        /// Instance id
        instance: String,
        /// Number of clusters with a non-empty destination set
        clusters: usize,
    },

    /// Transient failure talking to the platform (rate limiting, 5xx, network)
    #[error("Platform unavailable during {operation}: {reason}")]
    PlatformUnavailable {
        /// Operation that failed
        operation: String,
        /// Underlying failure
        reason: String,
    },

    /// A watch subscription was lost and must be re-established with a full listing
    #[error("Watch on namespace {namespace} ({selector}) disconnected: {reason}")]
    WatchDisconnected {
        /// Watched namespace
        namespace: String,
        /// Watched label selector
        selector: String,
        /// Why the subscription ended
        reason: String,
    },

    /// The same address appears twice in one destination group
    #[error("Duplicate address '{address}' in group '{group_id}'")]
    DuplicateAddress {
        /// Group id
        group_id: String,
        /// Duplicated address
        address: String,
    },

    /// A destination or group failed validation
    #[error("Invalid destination '{address}': {reason}")]
    InvalidDestination {
        /// Offending address (or group id)
        address: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// An instance id cannot be mapped to a namespace
    #[error("Invalid instance id '{id}': {reason}")]
    InvalidInstanceId {
        /// Offending id
        id: String,
        /// Explanation of what is invalid
        reason: String,
    },

    /// No template with the requested name is known
    #[error("Template '{name}' not found")]
    TemplateNotFound {
        /// Template name
        name: String,
    },

    /// A template could not be loaded or rendered
    #[error("Failed to render template '{name}': {reason}")]
    TemplateRender {
        /// Template name
        name: String,
        /// Explanation of the failure
        reason: String,
    },

    /// The platform rejected an operation permanently (4xx other than 429)
    #[error("Platform rejected {operation}: {reason}")]
    Platform {
        /// Operation that failed
        operation: String,
        /// Underlying failure
        reason: String,
    },

    /// Controller configuration is incomplete or invalid
    #[error("Invalid configuration: {reason}")]
    Configuration {
        /// Explanation of what is missing or invalid
        reason: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

impl ControllerError {
    /// Whether the failure is transient and the operation should be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControllerError::PlatformUnavailable { .. } | ControllerError::WatchDisconnected { .. }
        )
    }

    /// Short snake-case identifier used as a metrics label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::MalformedAddressRecord { .. } => "malformed_address_record",
            ControllerError::MalformedInstanceRecord { .. } => "malformed_instance_record",
            ControllerError::OrphanedResourceGroup { .. } => "orphaned_resource_group",
            ControllerError::InstanceInUse { .. } => "instance_in_use",
            ControllerError::PlatformUnavailable { .. } => "platform_unavailable",
            ControllerError::WatchDisconnected { .. } => "watch_disconnected",
            ControllerError::DuplicateAddress { .. } => "duplicate_address",
            ControllerError::InvalidDestination { .. } => "invalid_destination",
            ControllerError::InvalidInstanceId { .. } => "invalid_instance_id",
            ControllerError::TemplateNotFound { .. } => "template_not_found",
            ControllerError::TemplateRender { .. } => "template_render",
            ControllerError::Platform { .. } => "platform",
            ControllerError::Configuration { .. } => "configuration",
        }
    }

    /// Shorthand for a transient platform failure.
    pub fn unavailable(operation: impl Into<String>, reason: impl ToString) -> Self {
        ControllerError::PlatformUnavailable {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a permanent platform rejection.
    pub fn platform(operation: impl Into<String>, reason: impl ToString) -> Self {
        ControllerError::Platform {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
