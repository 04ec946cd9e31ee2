// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Destination API of one instance.
//!
//! Declared destinations live in the address-config records of the instance
//! namespace, one record per group. This API is the only writer of those
//! records; the reconciler reads them and converges the deployed bundles.
//!
//! Removing a group never deletes its record: the record is rewritten
//! without entries, which is the desired-state signal for teardown.
//!
//! Every destination gets a stable uuid. A uuid already stored for an address
//! is kept; destinations submitted without one get a fresh v4 uuid.

use crate::errors::Result;
use crate::model::{Destination, DestinationGroup, InstanceId};
use crate::platform::Platform;
use crate::records::{address_config_record, decode_destinations, record_group_id};
use crate::selector;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reads and writes the declared destinations of one instance.
#[derive(Clone)]
pub struct DestinationApi {
    platform: Arc<dyn Platform>,
    instance: InstanceId,
}

impl DestinationApi {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, instance: InstanceId) -> Self {
        Self { platform, instance }
    }

    #[must_use]
    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Every non-empty group of the instance.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the records cannot be listed.
    pub async fn list(&self) -> Result<BTreeSet<DestinationGroup>> {
        Ok(self
            .stored_groups()
            .await?
            .into_values()
            .filter(|group| !group.is_empty())
            .collect())
    }

    /// Replace the full set of groups; groups not in `groups` are emptied.
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed record write.
    pub async fn put(&self, groups: impl IntoIterator<Item = DestinationGroup>) -> Result<()> {
        let mut stored = self.stored_groups().await?;
        let mut desired: BTreeMap<String, DestinationGroup> = groups
            .into_iter()
            .map(|group| (group.group_id().to_string(), group))
            .collect();

        for group_id in stored.keys() {
            if !desired.contains_key(group_id) {
                desired.insert(group_id.clone(), DestinationGroup::empty(group_id.clone())?);
            }
        }

        for (group_id, group) in desired {
            let previous = stored.remove(&group_id);
            self.write(assign_uuids(group, previous.as_ref())?, previous.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Add destinations to their groups; an address already present is replaced.
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed record write.
    pub async fn append(&self, groups: impl IntoIterator<Item = DestinationGroup>) -> Result<()> {
        let stored = self.stored_groups().await?;

        for group in groups {
            let previous = stored.get(group.group_id());
            let merged = match previous {
                Some(previous) => {
                    let mut by_address: BTreeMap<String, Destination> = previous
                        .destinations()
                        .map(|d| (d.address.clone(), d.clone()))
                        .collect();
                    let group_id = group.group_id().to_string();
                    for destination in group.into_destinations() {
                        by_address.insert(destination.address.clone(), destination);
                    }
                    DestinationGroup::new(group_id, by_address.into_values())?
                }
                None => group,
            };
            self.write(assign_uuids(merged, previous)?, previous).await?;
        }
        Ok(())
    }

    /// Remove addresses from whichever group holds them.
    ///
    /// # Errors
    ///
    /// Returns the platform error of the first failed record write.
    pub async fn delete<I, S>(&self, addresses: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses: BTreeSet<String> = addresses
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect();

        for (group_id, group) in self.stored_groups().await? {
            if !group.destinations().any(|d| addresses.contains(&d.address)) {
                continue;
            }
            let remaining = DestinationGroup::new(
                group_id,
                group
                    .destinations()
                    .filter(|d| !addresses.contains(&d.address))
                    .cloned()
                    .collect::<Vec<_>>(),
            )?;
            self.write(remaining, Some(&group)).await?;
        }
        Ok(())
    }

    /// Every stored group by id, including emptied ones.
    async fn stored_groups(&self) -> Result<BTreeMap<String, DestinationGroup>> {
        let records = self
            .platform
            .list_configs(self.instance.namespace(), &selector::address_configs())
            .await?;

        let mut groups = BTreeMap::new();
        for record in &records {
            let Some(group_id) = record_group_id(record) else {
                continue;
            };
            let (destinations, _) = decode_destinations(group_id, record);
            match DestinationGroup::new(group_id, destinations) {
                Ok(group) => {
                    groups.insert(group_id.to_string(), group);
                }
                Err(e) => warn!(
                    namespace = %self.instance.namespace(),
                    group_id = %group_id,
                    error = %e,
                    "Skipping unusable address-config record"
                ),
            }
        }
        Ok(groups)
    }

    async fn write(&self, group: DestinationGroup, previous: Option<&DestinationGroup>) -> Result<()> {
        if previous == Some(&group) {
            debug!(group_id = %group.group_id(), "Address config unchanged");
            return Ok(());
        }

        self.platform
            .put_config(
                self.instance.namespace(),
                &address_config_record(&self.instance, &group),
            )
            .await?;
        info!(
            namespace = %self.instance.namespace(),
            group_id = %group.group_id(),
            destinations = group.len(),
            "Updated address config"
        );
        Ok(())
    }
}

/// Give every destination its stored uuid, or a new one if it has none.
fn assign_uuids(
    group: DestinationGroup,
    previous: Option<&DestinationGroup>,
) -> Result<DestinationGroup> {
    let group_id = group.group_id().to_string();
    let destinations: Vec<Destination> = group
        .into_destinations()
        .into_iter()
        .map(|destination| {
            let stored = previous
                .and_then(|p| p.get(&destination.address))
                .and_then(|d| d.uuid.clone());
            let uuid = stored
                .or_else(|| destination.uuid.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            destination.uuid(Some(uuid))
        })
        .collect();
    DestinationGroup::new(group_id, destinations)
}

#[cfg(test)]
#[path = "destinations_tests.rs"]
mod destinations_tests;
