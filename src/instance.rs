// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Instance lifecycle management.
//!
//! An instance is either absent or present; no intermediate state is
//! persisted. Creation is a sequence of idempotent steps ending with the
//! instance record write, which is the commit point:
//!
//! 1. create the instance namespace (an existing namespace is success)
//! 2. grant the namespace's default identity view access
//! 3. create the optional instance infrastructure bundle
//! 4. write the instance record, skipped when it is already up to date
//!
//! Deletion re-validates usage first: while any destination cluster of the
//! instance still declares destinations, [`InstanceManager::delete_instance`]
//! fails with [`ControllerError::InstanceInUse`] and touches nothing.

use crate::constants::{
    PARAM_CONSOLE_HOSTNAME, PARAM_INSTANCE, PARAM_MESSAGING_HOSTNAME, PARAM_MQTT_GATEWAY_HOSTNAME,
    PARAM_ROUTER_SECRET,
};
use crate::destinations::DestinationApi;
use crate::errors::{ControllerError, Result};
use crate::grouper;
use crate::labels::LABEL_INSTANCE;
use crate::model::{Instance, InstanceId};
use crate::platform::{ConfigEvent, Platform, Subscription};
use crate::records::{instance_from_record, instance_record};
use crate::selector;
use crate::templates::TemplateRenderer;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates, reads and deletes instances.
#[derive(Clone)]
pub struct InstanceManager {
    platform: Arc<dyn Platform>,
    renderer: Arc<dyn TemplateRenderer>,
    namespace: String,
    instance_template: Option<String>,
}

impl InstanceManager {
    /// Manager persisting instance records in `namespace`.
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        renderer: Arc<dyn TemplateRenderer>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            renderer,
            namespace: namespace.into(),
            instance_template: None,
        }
    }

    /// Render `template` into every new instance namespace.
    #[must_use]
    pub fn with_instance_template(mut self, template: Option<String>) -> Self {
        self.instance_template = template;
        self
    }

    /// Namespace holding the instance records
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    #[must_use]
    pub fn renderer(&self) -> &Arc<dyn TemplateRenderer> {
        &self.renderer
    }

    /// Bring an instance to the present state.
    ///
    /// Safe to call repeatedly: a second call with the same instance performs
    /// no platform writes.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; steps already applied stay in
    /// place and are skipped on the next attempt.
    pub async fn create_instance(&self, instance: &Instance) -> Result<()> {
        let namespace = instance.id.namespace();

        self.platform.create_namespace(&instance.id).await?;
        self.platform.grant_default_view_access(namespace).await?;

        if let Some(template) = &self.instance_template {
            let mut bundle = self
                .renderer
                .render(template, &instance_parameters(instance))?;
            bundle.add_label(LABEL_INSTANCE, &instance.id.label_value());
            self.platform.create(namespace, &bundle).await?;
        }

        let record = instance_record(instance);
        let name = instance.id.record_name();
        let current = self.platform.get_config(&self.namespace, &name).await?;
        if current.is_some_and(|current| {
            current.data == record.data && current.metadata.labels == record.metadata.labels
        }) {
            debug!(instance = %instance.id, "Instance record up to date");
            return Ok(());
        }

        self.platform.put_config(&self.namespace, &record).await?;
        info!(instance = %instance.id, record = %name, "Instance created");
        Ok(())
    }

    /// Replace an instance as a whole.
    ///
    /// # Errors
    ///
    /// See [`InstanceManager::create_instance`].
    pub async fn replace_instance(&self, instance: &Instance) -> Result<()> {
        self.create_instance(instance).await
    }

    /// Look up an instance by id.
    ///
    /// # Errors
    ///
    /// Returns a platform error, or [`ControllerError::MalformedInstanceRecord`]
    /// if the stored record does not decode.
    pub async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>> {
        self.platform
            .get_config(&self.namespace, &id.record_name())
            .await?
            .map(|record| instance_from_record(&record))
            .transpose()
    }

    /// Every decodable instance; malformed records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the platform error if listing the records fails.
    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        let records = self
            .platform
            .list_configs(&self.namespace, &selector::instance_records())
            .await?;

        Ok(records
            .iter()
            .filter_map(|record| match instance_from_record(record) {
                Ok(instance) => Some(instance),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed instance record");
                    None
                }
            })
            .collect())
    }

    /// Bring an instance to the absent state.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::InstanceInUse`] if any destination cluster of the
    ///   instance still declares destinations; nothing is mutated
    /// - a platform error from listing clusters or deleting
    pub async fn delete_instance(&self, id: &InstanceId) -> Result<()> {
        let clusters = grouper::list_clusters(self.platform.as_ref(), id.namespace()).await?;
        let live = clusters.iter().filter(|c| c.has_destinations()).count();
        if live > 0 {
            return Err(ControllerError::InstanceInUse {
                instance: id.id().to_string(),
                clusters: live,
            });
        }

        self.platform.delete_namespace(id.namespace()).await?;
        self.platform
            .delete_config(&self.namespace, &id.record_name())
            .await?;
        info!(instance = %id, "Instance deleted");
        Ok(())
    }

    /// Watch instance records.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the subscription cannot be opened.
    pub async fn watch(&self) -> Result<InstanceWatch> {
        let subscription = self
            .platform
            .watch(&self.namespace, &selector::instance_records())
            .await?;
        Ok(InstanceWatch { subscription })
    }

    /// Destination API of one instance.
    #[must_use]
    pub fn destinations(&self, id: &InstanceId) -> DestinationApi {
        DestinationApi::new(Arc::clone(&self.platform), id.clone())
    }
}

/// Parameters of the instance infrastructure template; unset endpoints are omitted.
fn instance_parameters(instance: &Instance) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::from([(PARAM_INSTANCE.to_string(), instance.id.id().to_string())]);
    for (key, value) in [
        (PARAM_MESSAGING_HOSTNAME, &instance.messaging_host),
        (PARAM_MQTT_GATEWAY_HOSTNAME, &instance.mqtt_host),
        (PARAM_CONSOLE_HOSTNAME, &instance.console_host),
        (PARAM_ROUTER_SECRET, &instance.cert_secret),
    ] {
        if let Some(value) = value {
            parameters.insert(key.to_string(), value.clone());
        }
    }
    parameters
}

/// Decoded change notification for an instance record.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceEvent {
    Added(Instance),
    Modified(Instance),
    Deleted(Instance),
    /// A full listing of every instance follows; instances it leaves out
    /// are gone
    Restarted,
    /// Every existing instance has been delivered
    Synced,
}

/// Subscription to instance records yielding decoded instances.
pub struct InstanceWatch {
    subscription: Subscription,
}

impl InstanceWatch {
    /// Next event; `None` once the subscription has failed or ended.
    ///
    /// Records that fail to decode are logged and skipped.
    pub async fn next(&mut self) -> Option<InstanceEvent> {
        loop {
            let (record, wrap): (_, fn(Instance) -> InstanceEvent) =
                match self.subscription.next().await? {
                    ConfigEvent::Added(record) => (record, InstanceEvent::Added),
                    ConfigEvent::Modified(record) => (record, InstanceEvent::Modified),
                    ConfigEvent::Deleted(record) => (record, InstanceEvent::Deleted),
                    ConfigEvent::Restarted => return Some(InstanceEvent::Restarted),
                    ConfigEvent::Synced => return Some(InstanceEvent::Synced),
                    ConfigEvent::Error(reason) => {
                        warn!(reason = %reason, "Instance watch failed");
                        return None;
                    }
                };

            match instance_from_record(&record) {
                Ok(instance) => return Some(wrap(instance)),
                Err(e) => warn!(error = %e, "Skipping malformed instance record"),
            }
        }
    }

    /// Close the subscription
    pub fn close(self) {
        self.subscription.close();
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod instance_tests;
