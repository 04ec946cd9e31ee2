// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Destination reconciler: converges the deployed bundles of one instance.
//!
//! Every pass re-derives the full picture from the platform through the
//! grouper and compares declared destinations with deployed workload:
//!
//! | declared | deployed | action |
//! |---|---|---|
//! | yes | no | render and create the group bundle |
//! | no | yes | delete the group workload |
//! | yes | yes | create items missing from the bundle, keep the rest |
//! | no | no | nothing |
//!
//! A deployed group is completed from the template recorded on its workload,
//! so a create that failed part-way is finished on the next pass while a
//! change of the group's destinations never swaps the template.
//!
//! The address-config record of a group is never deleted here; it belongs to
//! the destination API.

use super::dispatch::EventHandler;
use crate::constants::{
    PARAM_ADDRESS, PARAM_ADDRESS_CONFIG, PARAM_GROUP_ID, PARAM_INSTANCE, PARAM_NAME,
    TEMPLATE_DIRECT, TEMPLATE_QUEUE_PERSISTED, TEMPLATE_TOPIC_PERSISTED,
};
use crate::errors::{ControllerError, Result};
use crate::grouper;
use crate::labels::{LABEL_ADDRESS_CONFIG, LABEL_GROUP_ID, LABEL_INSTANCE, LABEL_TEMPLATE};
use crate::metrics;
use crate::model::{is_valid_label_value, sanitize_name, DestinationCluster, InstanceId};
use crate::platform::{ConfigEvent, Platform, ResourceBundle, ResourceKind};
use crate::templates::TemplateRenderer;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Groups touched by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Groups whose bundle was created
    pub created: Vec<String>,
    /// Groups whose workload was deleted
    pub deleted: Vec<String>,
    /// Deployed groups whose missing bundle items were created
    pub completed: Vec<String>,
    /// Deployed groups left as they are
    pub retained: Vec<String>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.completed.is_empty()
    }
}

/// Reconciles the destination clusters of one instance namespace.
pub struct DestinationReconciler {
    platform: Arc<dyn Platform>,
    renderer: Arc<dyn TemplateRenderer>,
    instance: InstanceId,
}

impl DestinationReconciler {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        renderer: Arc<dyn TemplateRenderer>,
        instance: InstanceId,
    ) -> Self {
        Self {
            platform,
            renderer,
            instance,
        }
    }

    #[must_use]
    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Run one convergence pass over every group of the instance.
    ///
    /// A failing group does not stop the others; the pass continues and the
    /// first error is returned at the end, a retryable one taking precedence
    /// so the whole pass gets retried.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the clusters cannot be listed, else the
    /// first error raised while converging a group.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let namespace = self.instance.namespace();
        let clusters = grouper::list_clusters(self.platform.as_ref(), namespace).await?;

        let mut outcome = ReconcileOutcome::default();
        let mut failure: Option<ControllerError> = None;

        for cluster in &clusters {
            let result = match (cluster.has_destinations(), cluster.is_deployed()) {
                (true, false) => self
                    .deploy(cluster)
                    .await
                    .map(|()| outcome.created.push(cluster.group_id.clone())),
                (false, true) => self
                    .teardown(cluster)
                    .await
                    .map(|()| outcome.deleted.push(cluster.group_id.clone())),
                (true, true) => self.complete(cluster).await.map(|completed| {
                    if completed {
                        outcome.completed.push(cluster.group_id.clone());
                    } else {
                        debug!(
                            namespace = %namespace,
                            group_id = %cluster.group_id,
                            "Destination cluster deployed, retaining"
                        );
                        outcome.retained.push(cluster.group_id.clone());
                    }
                }),
                (false, false) => Ok(()),
            };

            if let Err(e) = result {
                warn!(
                    namespace = %namespace,
                    group_id = %cluster.group_id,
                    error = %e,
                    "Failed to converge destination cluster"
                );
                failure = match failure {
                    Some(first) if first.is_retryable() || !e.is_retryable() => Some(first),
                    _ => Some(e),
                };
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Render a group bundle and label every item with the group's ownership.
    fn render(&self, template: &str, cluster: &DestinationCluster) -> Result<ResourceBundle> {
        let mut bundle = self
            .renderer
            .render(template, &bundle_parameters(&self.instance, cluster))?;
        bundle.add_label(LABEL_GROUP_ID, &cluster.group_id);
        bundle.add_label(LABEL_ADDRESS_CONFIG, &cluster.address_config);
        bundle.add_label(LABEL_INSTANCE, &self.instance.label_value());
        if is_valid_label_value(template) {
            bundle.add_label(LABEL_TEMPLATE, template);
        }
        Ok(bundle)
    }

    async fn deploy(&self, cluster: &DestinationCluster) -> Result<()> {
        let template = select_template(cluster);
        let bundle = self.render(template, cluster)?;

        self.platform
            .create(self.instance.namespace(), &bundle)
            .await?;
        metrics::record_cluster_created(template);
        info!(
            namespace = %self.instance.namespace(),
            group_id = %cluster.group_id,
            template = %template,
            resources = bundle.len(),
            "Created destination cluster"
        );
        Ok(())
    }

    /// Create the items of a deployed group's bundle that do not exist.
    ///
    /// Returns whether anything was missing. Workload without a recorded
    /// template is left as it is.
    async fn complete(&self, cluster: &DestinationCluster) -> Result<bool> {
        let workload = cluster.workload();
        let Some(template) = workload
            .iter()
            .find_map(|resource| resource.label(LABEL_TEMPLATE))
            .map(str::to_string)
        else {
            return Ok(false);
        };

        let deployed: BTreeSet<(ResourceKind, String)> = cluster
            .resources
            .iter()
            .map(|resource| (resource.kind, resource.name().to_string()))
            .collect();
        let missing: ResourceBundle = self
            .render(&template, cluster)?
            .into_iter()
            .filter(|resource| !deployed.contains(&(resource.kind, resource.name().to_string())))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        self.platform
            .create(self.instance.namespace(), &missing)
            .await?;
        info!(
            namespace = %self.instance.namespace(),
            group_id = %cluster.group_id,
            template = %template,
            resources = missing.len(),
            "Completed partially deployed destination cluster"
        );
        Ok(true)
    }

    async fn teardown(&self, cluster: &DestinationCluster) -> Result<()> {
        let workload = cluster.workload();
        self.platform
            .delete(self.instance.namespace(), &workload)
            .await?;
        metrics::record_cluster_deleted(self.instance.namespace());
        info!(
            namespace = %self.instance.namespace(),
            group_id = %cluster.group_id,
            resources = workload.len(),
            "Deleted destination cluster"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for DestinationReconciler {
    fn scope(&self) -> &'static str {
        "destination"
    }

    /// Every pass covers the whole namespace, so passes are serialized.
    fn key(&self, _event: &ConfigEvent) -> Option<String> {
        Some(self.instance.namespace().to_string())
    }

    async fn handle(&self, event: ConfigEvent) -> Result<()> {
        debug!(
            namespace = %self.instance.namespace(),
            record = event.record_name().unwrap_or_default(),
            "Address config changed"
        );
        let outcome = self.reconcile().await?;
        if !outcome.is_unchanged() {
            info!(
                namespace = %self.instance.namespace(),
                created = outcome.created.len(),
                deleted = outcome.deleted.len(),
                completed = outcome.completed.len(),
                retained = outcome.retained.len(),
                "Reconciled destination clusters"
            );
        }
        Ok(())
    }
}

/// Template for a group: the first flavor found, else one derived from the
/// delivery semantics of the first destination.
fn select_template(cluster: &DestinationCluster) -> &str {
    if let Some(flavor) = cluster
        .destinations
        .iter()
        .find_map(|d| d.flavor.as_deref())
    {
        return flavor;
    }
    match cluster.destinations.iter().next() {
        Some(d) if d.store_and_forward && d.multicast => TEMPLATE_TOPIC_PERSISTED,
        Some(d) if d.store_and_forward => TEMPLATE_QUEUE_PERSISTED,
        _ => TEMPLATE_DIRECT,
    }
}

fn bundle_parameters(instance: &InstanceId, cluster: &DestinationCluster) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::from([
        (PARAM_NAME.to_string(), sanitize_name(&cluster.group_id)),
        (PARAM_INSTANCE.to_string(), instance.id().to_string()),
        (PARAM_GROUP_ID.to_string(), cluster.group_id.clone()),
        (PARAM_ADDRESS_CONFIG.to_string(), cluster.address_config.clone()),
    ]);
    if let [only] = cluster.destinations.iter().collect::<Vec<_>>().as_slice() {
        parameters.insert(PARAM_ADDRESS.to_string(), only.address.clone());
    }
    parameters
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod destination_tests;
