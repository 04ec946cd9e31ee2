// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process [`Platform`] implementation.
//!
//! Holds namespaces, resources and configuration records in memory and feeds
//! watch subscriptions synchronously on every write. It follows the same
//! idempotence rules as the Kubernetes implementation and adds a few
//! inspection and fault-injection helpers used by the test suites.

use super::{ConfigEvent, Platform, PlatformResource, ResourceBundle, ResourceKind, Subscription};
use crate::constants::WATCH_EVENT_BUFFER;
use crate::errors::{ControllerError, Result};
use crate::labels::{APP_ENMASSE, LABEL_APP, LABEL_INSTANCE, LABEL_TYPE, TYPE_INSTANCE};
use crate::model::InstanceId;
use crate::selector::Selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

type ResourceKey = (String, ResourceKind, String);

struct Watcher {
    namespace: String,
    selector: Selector,
    events: mpsc::Sender<ConfigEvent>,
    /// Changes are lost while suspended, as with a watch that fell behind
    suspended: bool,
}

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
    view_access: BTreeSet<String>,
    resources: BTreeMap<ResourceKey, PlatformResource>,
    configs: BTreeMap<(String, String), ConfigMap>,
    watchers: Vec<Watcher>,
    mutations: u64,
    version: u64,
    unavailable: bool,
    failures_remaining: usize,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Deliver an event to every matching watcher, dropping watchers that
    /// can no longer keep up or have gone away.
    fn notify(&mut self, namespace: &str, event: &ConfigEvent) {
        let labels = match event {
            ConfigEvent::Added(record)
            | ConfigEvent::Modified(record)
            | ConfigEvent::Deleted(record) => record.metadata.labels.as_ref(),
            ConfigEvent::Restarted | ConfigEvent::Synced | ConfigEvent::Error(_) => None,
        };

        self.watchers.retain(|watcher| {
            if watcher.suspended
                || watcher.namespace != namespace
                || !watcher.selector.matches_opt(labels)
            {
                return !watcher.events.is_closed();
            }
            watcher.events.try_send(event.clone()).is_ok()
        });
    }

    /// The full listing sequence a subscription starts with.
    fn listing(&self, namespace: &str, selector: &Selector) -> Vec<ConfigEvent> {
        let records = self
            .configs
            .iter()
            .filter(|((ns, _), record)| {
                ns == namespace && selector.matches_opt(record.metadata.labels.as_ref())
            })
            .map(|(_, record)| ConfigEvent::Added(record.clone()));

        std::iter::once(ConfigEvent::Restarted)
            .chain(records)
            .chain(std::iter::once(ConfigEvent::Synced))
            .collect()
    }

    fn store_config(&mut self, namespace: &str, record: &ConfigMap) -> Result<()> {
        let name = record
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::platform("write config map", "record must have a name"))?;
        let key = (namespace.to_string(), name);

        let existing = self.configs.get(&key);
        if existing.is_some_and(|existing| {
            existing.data == record.data && existing.metadata.labels == record.metadata.labels
        }) {
            return Ok(());
        }
        let modified = existing.is_some();

        let mut stored = record.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(self.next_version());
        self.configs.insert(key, stored.clone());
        self.mutations += 1;

        let event = if modified {
            ConfigEvent::Modified(stored)
        } else {
            ConfigEvent::Added(stored)
        };
        self.notify(namespace, &event);
        Ok(())
    }

    fn remove_config(&mut self, namespace: &str, name: &str) {
        if let Some(record) = self.configs.remove(&(namespace.to_string(), name.to_string())) {
            self.mutations += 1;
            self.notify(namespace, &ConfigEvent::Deleted(record));
        }
    }

    fn store_resource(&mut self, namespace: &str, resource: &PlatformResource) -> Result<()> {
        if resource.kind == ResourceKind::ConfigMap {
            let record = resource.to_config_map()?;
            if self
                .configs
                .contains_key(&(namespace.to_string(), resource.name().to_string()))
            {
                return Ok(());
            }
            return self.store_config(namespace, &record);
        }

        let key = (
            namespace.to_string(),
            resource.kind,
            resource.name().to_string(),
        );
        if self.resources.contains_key(&key) {
            return Ok(());
        }
        let mut stored = resource.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(self.next_version());
        self.resources.insert(key, stored);
        self.mutations += 1;
        Ok(())
    }

    fn matching(&self, namespace: &str, selector: &Selector) -> Vec<PlatformResource> {
        let workloads = self
            .resources
            .iter()
            .filter(|((ns, _, _), _)| ns == namespace)
            .map(|(_, resource)| resource.clone());
        let records = self
            .configs
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, record)| PlatformResource::from_config_map(record));

        workloads
            .chain(records)
            .filter(|resource| selector.matches_opt(resource.metadata.labels.as_ref()))
            .collect()
    }
}

/// Platform state kept in memory.
#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl InMemoryPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state for an operation, applying injected failures.
    fn begin(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(ControllerError::unavailable(operation, "platform unavailable"));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ControllerError::unavailable(operation, "injected failure"));
        }
        Ok(state)
    }

    /// Make every operation fail with a transient error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Fail the next `count` operations with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_remaining = count;
    }

    /// Number of state-changing writes applied so far.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }

    #[must_use]
    pub fn namespace_exists(&self, name: &str) -> bool {
        self.lock().namespaces.contains_key(name)
    }

    #[must_use]
    pub fn namespace_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.lock().namespaces.get(name).cloned()
    }

    #[must_use]
    pub fn has_view_access(&self, namespace: &str) -> bool {
        self.lock().view_access.contains(namespace)
    }

    /// Read a record directly, bypassing failure injection.
    #[must_use]
    pub fn config(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.lock()
            .configs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every resource of any kind matching a selector, records included.
    #[must_use]
    pub fn resources(&self, namespace: &str, selector: &Selector) -> Vec<PlatformResource> {
        self.lock().matching(namespace, selector)
    }

    /// Seed a resource without going through failure injection.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Platform`] for a config map resource whose
    /// payload does not decode.
    pub fn insert(&self, namespace: &str, resource: PlatformResource) -> Result<()> {
        self.lock().store_resource(namespace, &resource)
    }

    /// Number of open watch subscriptions.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut state = self.lock();
        state.watchers.retain(|watcher| !watcher.events.is_closed());
        state.watchers.len()
    }

    /// Stop delivering changes to open subscriptions without closing them.
    pub fn suspend_watches(&self) {
        for watcher in &mut self.lock().watchers {
            watcher.suspended = true;
        }
    }

    /// Re-list on every suspended subscription, as a watch does after it
    /// lost track of changes.
    pub fn resume_watches(&self) {
        let mut state = self.lock();
        let listings: Vec<Vec<ConfigEvent>> = state
            .watchers
            .iter()
            .map(|watcher| state.listing(&watcher.namespace, &watcher.selector))
            .collect();

        for (watcher, listing) in state.watchers.iter_mut().zip(listings) {
            if !watcher.suspended {
                continue;
            }
            watcher.suspended = false;
            for event in listing {
                let _ = watcher.events.try_send(event);
            }
        }
    }

    /// Fail every open subscription as if the connection had dropped.
    pub fn disconnect_watches(&self) {
        let watchers = std::mem::take(&mut self.lock().watchers);
        for watcher in watchers {
            let _ = watcher
                .events
                .try_send(ConfigEvent::Error("connection reset".to_string()));
        }
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<PlatformResource>> {
        let state = self.begin("list resources")?;
        Ok(state.matching(namespace, selector))
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<PlatformResource>> {
        let state = self.begin("get resource")?;
        if kind == ResourceKind::ConfigMap {
            return Ok(state
                .configs
                .get(&(namespace.to_string(), name.to_string()))
                .map(PlatformResource::from_config_map));
        }
        Ok(state
            .resources
            .get(&(namespace.to_string(), kind, name.to_string()))
            .cloned())
    }

    async fn create(&self, namespace: &str, bundle: &ResourceBundle) -> Result<()> {
        let mut state = self.begin("create bundle")?;
        for resource in bundle {
            state.store_resource(namespace, resource)?;
        }
        debug!(namespace = %namespace, count = bundle.len(), "Created bundle");
        Ok(())
    }

    async fn delete(&self, namespace: &str, bundle: &ResourceBundle) -> Result<()> {
        let mut state = self.begin("delete bundle")?;
        for resource in bundle {
            if resource.kind == ResourceKind::ConfigMap {
                state.remove_config(namespace, resource.name());
            } else if state
                .resources
                .remove(&(
                    namespace.to_string(),
                    resource.kind,
                    resource.name().to_string(),
                ))
                .is_some()
            {
                state.mutations += 1;
            }
        }
        debug!(namespace = %namespace, count = bundle.len(), "Deleted bundle");
        Ok(())
    }

    async fn list_configs(&self, namespace: &str, selector: &Selector) -> Result<Vec<ConfigMap>> {
        let state = self.begin("list config maps")?;
        Ok(state
            .configs
            .iter()
            .filter(|((ns, _), record)| {
                ns == namespace && selector.matches_opt(record.metadata.labels.as_ref())
            })
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn put_config(&self, namespace: &str, record: &ConfigMap) -> Result<()> {
        self.begin("write config map")?
            .store_config(namespace, record)
    }

    async fn delete_config(&self, namespace: &str, name: &str) -> Result<()> {
        self.begin("delete config map")?
            .remove_config(namespace, name);
        Ok(())
    }

    async fn create_namespace(&self, instance: &InstanceId) -> Result<()> {
        let mut state = self.begin("create namespace")?;
        if state.namespaces.contains_key(instance.namespace()) {
            return Ok(());
        }
        state.namespaces.insert(
            instance.namespace().to_string(),
            BTreeMap::from([
                (LABEL_APP.to_string(), APP_ENMASSE.to_string()),
                (LABEL_INSTANCE.to_string(), instance.label_value()),
                (LABEL_TYPE.to_string(), TYPE_INSTANCE.to_string()),
            ]),
        );
        state.mutations += 1;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.begin("delete namespace")?;
        if state.namespaces.remove(name).is_none() {
            return Ok(());
        }
        state.mutations += 1;
        state.view_access.remove(name);
        state.resources.retain(|(ns, _, _), _| ns != name);

        let records: Vec<String> = state
            .configs
            .keys()
            .filter(|(ns, _)| ns == name)
            .map(|(_, record)| record.clone())
            .collect();
        for record in records {
            state.remove_config(name, &record);
        }
        Ok(())
    }

    async fn grant_default_view_access(&self, namespace: &str) -> Result<()> {
        let mut state = self.begin("grant view access")?;
        if state.view_access.insert(namespace.to_string()) {
            state.mutations += 1;
        }
        Ok(())
    }

    async fn watch(&self, namespace: &str, selector: &Selector) -> Result<Subscription> {
        let mut state = self.begin("watch config maps")?;
        let (tx, rx) = mpsc::channel(WATCH_EVENT_BUFFER);

        for event in state.listing(namespace, selector) {
            tx.try_send(event)
                .map_err(|e| ControllerError::unavailable("watch config maps", e))?;
        }

        state.watchers.push(Watcher {
            namespace: namespace.to_string(),
            selector: selector.clone(),
            events: tx,
            suspended: false,
        });
        Ok(Subscription::from_receiver(rx))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
