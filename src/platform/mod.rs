// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Platform resource port: the narrow I/O boundary over the orchestration platform.
//!
//! Everything the controller does to the cluster goes through the [`Platform`]
//! trait: listing and creating resource bundles, reading and writing labeled
//! configuration records, managing instance namespaces, and watching records.
//! The port holds no business logic.
//!
//! Resources of several kinds are carried as one tagged union,
//! [`PlatformResource`], so the grouper consumes them uniformly and any
//! kind-specific behavior dispatches on [`ResourceKind`].
//!
//! # Implementations
//!
//! - [`kubernetes::KubePlatform`] - backed by the Kubernetes API server
//! - [`memory::InMemoryPlatform`] - in-process state with watch notifications

pub mod kubernetes;
pub mod memory;

use crate::errors::{ControllerError, Result};
use crate::model::InstanceId;
use crate::selector::Selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Kinds of platform resources the controller creates and groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Deployment,
    PersistentVolumeClaim,
    ConfigMap,
    ReplicationController,
    Service,
}

impl ResourceKind {
    /// Every kind a bundle may hold; all of them are listed during discovery
    /// so teardown reaches each item a template rendered.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Deployment,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::ConfigMap,
        ResourceKind::ReplicationController,
        ResourceKind::Service,
    ];

    /// Kubernetes kind name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::ReplicationController => "ReplicationController",
            ResourceKind::Service => "Service",
        }
    }

    /// Kubernetes `apiVersion` of the kind
    #[must_use]
    pub fn api_version(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "apps/v1",
            _ => "v1",
        }
    }

    /// Parse a Kubernetes kind name
    #[must_use]
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(ResourceKind::Deployment),
            "PersistentVolumeClaim" => Some(ResourceKind::PersistentVolumeClaim),
            "ConfigMap" => Some(ResourceKind::ConfigMap),
            "ReplicationController" => Some(ResourceKind::ReplicationController),
            "Service" => Some(ResourceKind::Service),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One platform object: kind tag, metadata, and the remaining payload.
///
/// `spec` holds every top-level field other than `apiVersion`, `kind` and
/// `metadata` (e.g. `{"spec": {...}}` for a deployment, `{"data": {...}}` for
/// a config map).
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformResource {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    pub spec: Value,
}

impl PlatformResource {
    /// Object name, empty if unset
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Value of a single label
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// All labels (empty map if none)
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }

    /// Set or overwrite a label
    pub fn set_label(&mut self, key: &str, value: &str) {
        self.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    /// Build a resource from a complete object (`apiVersion`, `kind`, `metadata`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Platform`] if the object is not a JSON object,
    /// has an unsupported kind, or carries invalid metadata.
    pub fn from_object(object: Value) -> Result<Self> {
        let Value::Object(mut fields) = object else {
            return Err(ControllerError::platform(
                "decode object",
                "resource must be a JSON object",
            ));
        };

        let kind_name = fields
            .remove("kind")
            .and_then(|kind| kind.as_str().map(str::to_string))
            .unwrap_or_default();
        let kind = ResourceKind::from_kind(&kind_name).ok_or_else(|| {
            ControllerError::platform("decode object", format!("unsupported kind '{kind_name}'"))
        })?;
        fields.remove("apiVersion");

        let metadata = match fields.remove("metadata") {
            Some(metadata) => serde_json::from_value(metadata)
                .map_err(|e| ControllerError::platform("decode object metadata", e))?,
            None => ObjectMeta::default(),
        };

        Ok(Self {
            kind,
            metadata,
            spec: Value::Object(fields),
        })
    }

    /// Reassemble the complete object.
    #[must_use]
    pub fn to_object(&self) -> Value {
        let mut fields = match &self.spec {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        fields.insert(
            "apiVersion".to_string(),
            Value::String(self.kind.api_version().to_string()),
        );
        fields.insert(
            "kind".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        fields.insert(
            "metadata".to_string(),
            serde_json::to_value(&self.metadata).unwrap_or(Value::Null),
        );
        Value::Object(fields)
    }

    /// Wrap a configuration record.
    #[must_use]
    pub fn from_config_map(record: &ConfigMap) -> Self {
        let mut spec = Map::new();
        if let Some(data) = &record.data {
            spec.insert(
                "data".to_string(),
                Value::Object(
                    data.iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                ),
            );
        }
        Self {
            kind: ResourceKind::ConfigMap,
            metadata: record.metadata.clone(),
            spec: Value::Object(spec),
        }
    }

    /// Interpret the resource as a configuration record.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Platform`] if the resource is not a config
    /// map or its payload does not decode as one.
    pub fn to_config_map(&self) -> Result<ConfigMap> {
        if self.kind != ResourceKind::ConfigMap {
            return Err(ControllerError::platform(
                "decode config map",
                format!("{} {} is not a ConfigMap", self.kind, self.name()),
            ));
        }
        serde_json::from_value(self.to_object())
            .map_err(|e| ControllerError::platform("decode config map", e))
    }
}

/// An ordered collection of platform objects created and deleted as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceBundle {
    items: Vec<PlatformResource>,
}

impl ResourceBundle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: PlatformResource) {
        self.items.push(resource);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlatformResource> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Label every item of the bundle
    pub fn add_label(&mut self, key: &str, value: &str) {
        for item in &mut self.items {
            item.set_label(key, value);
        }
    }
}

impl FromIterator<PlatformResource> for ResourceBundle {
    fn from_iter<I: IntoIterator<Item = PlatformResource>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ResourceBundle {
    type Item = PlatformResource;
    type IntoIter = std::vec::IntoIter<PlatformResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceBundle {
    type Item = &'a PlatformResource;
    type IntoIter = std::slice::Iter<'a, PlatformResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ============================================================================
// Watches
// ============================================================================

/// Change notification for a watched configuration record.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    Added(ConfigMap),
    Modified(ConfigMap),
    Deleted(ConfigMap),
    /// A full listing of the matching records follows, closed by
    /// [`ConfigEvent::Synced`]. Records known before it that the listing
    /// leaves out were deleted in the meantime.
    Restarted,
    /// The full listing has been delivered
    Synced,
    /// The subscription failed; it must be re-established with a full listing
    Error(String),
}

impl ConfigEvent {
    /// Name of the record the event refers to
    #[must_use]
    pub fn record_name(&self) -> Option<&str> {
        match self {
            ConfigEvent::Added(record)
            | ConfigEvent::Modified(record)
            | ConfigEvent::Deleted(record) => record.metadata.name.as_deref(),
            ConfigEvent::Restarted | ConfigEvent::Synced | ConfigEvent::Error(_) => None,
        }
    }
}

/// A live watch on a label selector.
///
/// The subscription owns the task pumping events from the platform; dropping
/// it aborts that task and releases the underlying connection. The platform
/// may re-list on its own after losing track of changes, announcing it with
/// [`ConfigEvent::Restarted`]. After an [`ConfigEvent::Error`] or the end of
/// the stream the subscription is dead and a new one must be opened.
pub struct Subscription {
    events: mpsc::Receiver<ConfigEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscription fed by a background task
    #[must_use]
    pub fn new(events: mpsc::Receiver<ConfigEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// Subscription fed directly by the sender side of `events`
    #[must_use]
    pub fn from_receiver(events: mpsc::Receiver<ConfigEvent>) -> Self {
        Self { events, task: None }
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<ConfigEvent> {
        self.events.recv().await
    }

    /// Close the subscription and release its connection
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Port
// ============================================================================

/// Capability interface over the orchestration platform.
///
/// Every mutating operation is idempotent: creating something that exists and
/// deleting something that is gone both succeed, so convergence actions can be
/// re-run safely. Transient failures surface as
/// [`ControllerError::PlatformUnavailable`].
#[async_trait]
pub trait Platform: Send + Sync {
    /// List resources of every [`ResourceKind`] matching a selector in one namespace.
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<PlatformResource>>;

    /// Fetch a single resource.
    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<PlatformResource>>;

    /// Create every item of a bundle; items that already exist are left alone.
    async fn create(&self, namespace: &str, bundle: &ResourceBundle) -> Result<()>;

    /// Delete every item of a bundle, in order; missing items are skipped.
    async fn delete(&self, namespace: &str, bundle: &ResourceBundle) -> Result<()>;

    /// List configuration records matching a selector.
    async fn list_configs(&self, namespace: &str, selector: &Selector) -> Result<Vec<ConfigMap>>;

    /// Create or replace a configuration record (last write wins).
    async fn put_config(&self, namespace: &str, record: &ConfigMap) -> Result<()>;

    /// Delete a configuration record.
    async fn delete_config(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create the namespace of an instance.
    async fn create_namespace(&self, instance: &InstanceId) -> Result<()>;

    /// Delete a namespace and everything in it.
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// Grant the namespace's default identity view access to the namespace.
    async fn grant_default_view_access(&self, namespace: &str) -> Result<()>;

    /// Watch configuration records matching a selector.
    ///
    /// The subscription first delivers [`ConfigEvent::Restarted`], every
    /// matching record as [`ConfigEvent::Added`] and [`ConfigEvent::Synced`],
    /// then changes. The same listing sequence may recur whenever the
    /// platform re-lists.
    async fn watch(&self, namespace: &str, selector: &Selector) -> Result<Subscription>;

    /// Read a single configuration record.
    async fn get_config(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.get(namespace, ResourceKind::ConfigMap, name)
            .await?
            .map(|resource| resource.to_config_map())
            .transpose()
    }
}
