// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Discovery of destination clusters from live platform resources.
//!
//! Every group-owned resource carries a `group-id` label. The grouper lists
//! them, partitions them by group, and pairs each partition with the
//! destinations declared in the group's address-config record.
//!
//! Failures are contained at the smallest unit:
//! - a malformed address entry is skipped, the rest of the group survives
//! - a group without a resolvable address-config record is logged as orphaned
//!   and skipped; its resources are left untouched
//! - a record that cannot be read at all yields an empty destination set
//!
//! Platform errors (listing, fetching a record) propagate to the caller.

use crate::errors::{ControllerError, Result};
use crate::labels::{LABEL_ADDRESS_CONFIG, LABEL_GROUP_ID};
use crate::metrics;
use crate::model::{Destination, DestinationCluster};
use crate::platform::{Platform, PlatformResource, ResourceBundle, ResourceKind};
use crate::records::decode_destinations;
use crate::selector;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Partition resources by their `group-id` label; unlabeled resources are dropped.
#[must_use]
pub fn partition(resources: Vec<PlatformResource>) -> BTreeMap<String, ResourceBundle> {
    let mut groups: BTreeMap<String, ResourceBundle> = BTreeMap::new();
    for resource in resources {
        if let Some(group_id) = resource.label(LABEL_GROUP_ID).map(str::to_string) {
            groups.entry(group_id).or_default().push(resource);
        }
    }
    groups
}

/// List the destination clusters of one namespace.
///
/// Output order is by group id but carries no meaning.
///
/// # Errors
///
/// Returns the platform error if listing resources or fetching an
/// address-config record fails.
pub async fn list_clusters(
    platform: &dyn Platform,
    namespace: &str,
) -> Result<Vec<DestinationCluster>> {
    let resources = platform.list(namespace, &selector::group_owned()).await?;
    let mut clusters = Vec::new();

    for (group_id, bundle) in partition(resources) {
        let Some(address_config) = bundle
            .iter()
            .find_map(|resource| resource.label(LABEL_ADDRESS_CONFIG))
            .map(str::to_string)
        else {
            warn_orphaned(namespace, &group_id);
            continue;
        };

        let Some(record) = resolve_record(platform, namespace, &address_config, &bundle).await?
        else {
            warn_orphaned(namespace, &group_id);
            continue;
        };

        let destinations: BTreeSet<Destination> = match record {
            Ok(record) => {
                let (destinations, malformed) = decode_destinations(&group_id, &record);
                metrics::record_malformed_entries(namespace, malformed);
                destinations.into_iter().collect()
            }
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    group_id = %group_id,
                    record = %address_config,
                    error = %e,
                    "Unreadable address-config record, treating group as empty"
                );
                BTreeSet::new()
            }
        };

        debug!(
            namespace = %namespace,
            group_id = %group_id,
            destinations = destinations.len(),
            resources = bundle.len(),
            "Discovered destination cluster"
        );
        clusters.push(DestinationCluster {
            group_id,
            address_config,
            destinations,
            resources: bundle,
        });
    }

    Ok(clusters)
}

/// Find the address-config record among the group's own resources, falling
/// back to a direct read. The inner result is the decode outcome.
async fn resolve_record(
    platform: &dyn Platform,
    namespace: &str,
    name: &str,
    bundle: &ResourceBundle,
) -> Result<Option<Result<ConfigMap>>> {
    if let Some(resource) = bundle
        .iter()
        .find(|r| r.kind == ResourceKind::ConfigMap && r.name() == name)
    {
        return Ok(Some(resource.to_config_map()));
    }
    Ok(platform.get_config(namespace, name).await?.map(Ok))
}

fn warn_orphaned(namespace: &str, group_id: &str) {
    let orphaned = ControllerError::OrphanedResourceGroup {
        namespace: namespace.to_string(),
        group_id: group_id.to_string(),
    };
    warn!(
        namespace = %namespace,
        group_id = %group_id,
        "{orphaned}, leaving resources untouched"
    );
}

#[cfg(test)]
#[path = "grouper_tests.rs"]
mod grouper_tests;
