// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`Platform`] implementation backed by the Kubernetes API server.
//!
//! Grouped resources are handled through [`DynamicObject`] so every kind goes
//! through the same code path; configuration records, namespaces and role
//! bindings use their typed APIs.
//!
//! Errors are classified at this boundary:
//! - HTTP 429, 5xx and transport failures become [`ControllerError::PlatformUnavailable`]
//! - other API errors become [`ControllerError::Platform`]
//! - 404 on delete and 409 on create count as success
//!
//! Watches run on the `kube` runtime watcher, which re-lists by itself
//! whenever it loses track of changes.

use super::{ConfigEvent, Platform, PlatformResource, ResourceBundle, ResourceKind, Subscription};
use crate::constants::{
    DEFAULT_SERVICE_ACCOUNT, KUBE_LIST_PAGE_SIZE, VIEW_CLUSTER_ROLE, VIEW_ROLE_BINDING_NAME,
    WATCH_EVENT_BUFFER,
};
use crate::errors::{ControllerError, Result};
use crate::labels::{APP_ENMASSE, LABEL_APP, LABEL_INSTANCE, LABEL_TYPE, TYPE_INSTANCE};
use crate::model::InstanceId;
use crate::selector::Selector;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, ReplicationController, Service,
};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Classify a Kubernetes client error.
#[must_use]
pub fn classify(operation: &str, err: kube::Error) -> ControllerError {
    match &err {
        kube::Error::Api(api_err) if api_err.code == 429 || (500..600).contains(&api_err.code) => {
            ControllerError::unavailable(operation, &err)
        }
        kube::Error::Api(_) => ControllerError::platform(operation, &err),
        kube::Error::Service(_) => ControllerError::unavailable(operation, &err),
        _ => ControllerError::platform(operation, &err),
    }
}

/// Whether a client error carries the given HTTP status code.
#[must_use]
pub fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == code)
}

fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
        ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        ResourceKind::ReplicationController => ApiResource::erase::<ReplicationController>(&()),
        ResourceKind::Service => ApiResource::erase::<Service>(&()),
    }
}

fn list_params(selector: &Selector) -> ListParams {
    let params = ListParams::default();
    if selector.is_empty() {
        params
    } else {
        params.labels(&selector.to_string())
    }
}

/// Platform port talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, namespace: &str, kind: ResourceKind) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &api_resource(kind))
    }

    fn to_dynamic(namespace: &str, resource: &PlatformResource) -> DynamicObject {
        let ar = api_resource(resource.kind);
        let mut object = DynamicObject::new(resource.name(), &ar).data(resource.spec.clone());
        object.metadata = resource.metadata.clone();
        object.metadata.namespace = Some(namespace.to_string());
        object
    }

    /// List one kind with automatic pagination.
    async fn list_kind(
        &self,
        namespace: &str,
        kind: ResourceKind,
        selector: &Selector,
    ) -> Result<Vec<PlatformResource>> {
        let api = self.dynamic_api(namespace, kind);
        let objects = list_paginated(
            &api,
            list_params(selector),
            &format!("list {kind} in {namespace}"),
        )
        .await?;

        Ok(objects
            .into_iter()
            .map(|object| PlatformResource {
                kind,
                metadata: object.metadata,
                spec: object.data,
            })
            .collect())
    }
}

/// Point `params` at the page after the one that returned `token`.
///
/// Returns false once the server has no further pages.
fn next_page(params: &mut ListParams, token: Option<String>) -> bool {
    match token {
        Some(token) if !token.is_empty() => {
            params.continue_token = Some(token);
            true
        }
        _ => false,
    }
}

/// List every object matching `params`, one page at a time.
async fn list_paginated<K>(api: &Api<K>, params: ListParams, operation: &str) -> Result<Vec<K>>
where
    K: Clone + DeserializeOwned + Debug,
{
    let mut params = params.limit(KUBE_LIST_PAGE_SIZE);

    let mut items = Vec::new();
    let mut pages = 0;
    loop {
        pages += 1;
        let page = api
            .list(&params)
            .await
            .map_err(|e| classify(operation, e))?;
        items.extend(page.items);

        if !next_page(&mut params, page.metadata.continue_) {
            break;
        }
    }

    debug!(
        operation = %operation,
        pages = pages,
        count = items.len(),
        "Completed paginated list"
    );
    Ok(items)
}

/// Create a resource, or replace it if it already exists.
///
/// The replacement carries the existing resource version so a concurrent
/// writer surfaces as a conflict, which is reported as transient.
async fn create_or_replace<K>(api: &Api<K>, resource: &K, operation: &str) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    let name = resource
        .meta()
        .name
        .clone()
        .ok_or_else(|| ControllerError::platform(operation, "resource must have a name"))?;

    let existing = api
        .get_opt(&name)
        .await
        .map_err(|e| classify(operation, e))?;

    let result = if let Some(existing) = existing {
        let mut updated = resource.clone();
        updated.meta_mut().resource_version = existing.meta().resource_version.clone();
        debug!("Replacing {} {}", K::kind(&()), name);
        api.replace(&name, &PostParams::default(), &updated)
            .await
            .map(|_| ())
    } else {
        debug!("Creating {} {}", K::kind(&()), name);
        api.create(&PostParams::default(), resource).await.map(|_| ())
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if is_status(&e, 409) => Err(ControllerError::unavailable(operation, e)),
        Err(e) => Err(classify(operation, e)),
    }
}

#[async_trait]
impl Platform for KubePlatform {
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<PlatformResource>> {
        let mut resources = Vec::new();
        for kind in ResourceKind::ALL {
            resources.extend(self.list_kind(namespace, kind, selector).await?);
        }
        Ok(resources)
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<PlatformResource>> {
        let object = self
            .dynamic_api(namespace, kind)
            .get_opt(name)
            .await
            .map_err(|e| classify(&format!("get {kind} {namespace}/{name}"), e))?;

        Ok(object.map(|object| PlatformResource {
            kind,
            metadata: object.metadata,
            spec: object.data,
        }))
    }

    async fn create(&self, namespace: &str, bundle: &ResourceBundle) -> Result<()> {
        for resource in bundle {
            let api = self.dynamic_api(namespace, resource.kind);
            let object = Self::to_dynamic(namespace, resource);
            match api.create(&PostParams::default(), &object).await {
                Ok(_) => info!("Created {} {}/{}", resource.kind, namespace, resource.name()),
                Err(e) if is_status(&e, 409) => debug!(
                    "{} {}/{} already exists",
                    resource.kind,
                    namespace,
                    resource.name()
                ),
                Err(e) => {
                    return Err(classify(
                        &format!("create {} {namespace}/{}", resource.kind, resource.name()),
                        e,
                    ))
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, bundle: &ResourceBundle) -> Result<()> {
        for resource in bundle {
            let api = self.dynamic_api(namespace, resource.kind);
            match api.delete(resource.name(), &DeleteParams::background()).await {
                Ok(_) => info!("Deleted {} {}/{}", resource.kind, namespace, resource.name()),
                Err(e) if is_status(&e, 404) => debug!(
                    "{} {}/{} already gone",
                    resource.kind,
                    namespace,
                    resource.name()
                ),
                Err(e) => {
                    return Err(classify(
                        &format!("delete {} {namespace}/{}", resource.kind, resource.name()),
                        e,
                    ))
                }
            }
        }
        Ok(())
    }

    async fn list_configs(&self, namespace: &str, selector: &Selector) -> Result<Vec<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        list_paginated(
            &api,
            list_params(selector),
            &format!("list config maps in {namespace}"),
        )
        .await
    }

    async fn put_config(&self, namespace: &str, record: &ConfigMap) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let mut record = record.clone();
        record.metadata.namespace = Some(namespace.to_string());
        create_or_replace(&api, &record, &format!("write config map in {namespace}")).await
    }

    async fn delete_config(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted ConfigMap {}/{}", namespace, name);
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(classify(&format!("delete config map {namespace}/{name}"), e)),
        }
    }

    async fn create_namespace(&self, instance: &InstanceId) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(instance.namespace().to_string()),
                labels: Some(BTreeMap::from([
                    (LABEL_APP.to_string(), APP_ENMASSE.to_string()),
                    (LABEL_INSTANCE.to_string(), instance.label_value()),
                    (LABEL_TYPE.to_string(), TYPE_INSTANCE.to_string()),
                ])),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                info!("Created namespace {}", instance.namespace());
                Ok(())
            }
            Err(e) if is_status(&e, 409) => {
                debug!("Namespace {} already exists", instance.namespace());
                Ok(())
            }
            Err(e) => Err(classify(
                &format!("create namespace {}", instance.namespace()),
                e,
            )),
        }
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted namespace {}", name);
                Ok(())
            }
            Err(e) if is_status(&e, 404) => {
                debug!("Namespace {} already gone", name);
                Ok(())
            }
            Err(e) => Err(classify(&format!("delete namespace {name}"), e)),
        }
    }

    async fn grant_default_view_access(&self, namespace: &str) -> Result<()> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        let binding = RoleBinding {
            metadata: ObjectMeta {
                name: Some(VIEW_ROLE_BINDING_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: VIEW_CLUSTER_ROLE.to_string(),
            },
            subjects: Some(vec![Subject {
                api_group: None,
                kind: "ServiceAccount".to_string(),
                name: DEFAULT_SERVICE_ACCOUNT.to_string(),
                namespace: Some(namespace.to_string()),
            }]),
        };

        create_or_replace(
            &api,
            &binding,
            &format!("grant view access in {namespace}"),
        )
        .await
    }

    async fn watch(&self, namespace: &str, selector: &Selector) -> Result<Subscription> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let mut config = watcher::Config::default();
        if !selector.is_empty() {
            config = config.labels(&selector.to_string());
        }

        let (tx, rx) = mpsc::channel(WATCH_EVENT_BUFFER);
        let namespace = namespace.to_string();
        let selector = selector.clone();

        // The watcher lists, watches, and re-lists after a desync on its own;
        // errors are retried with its default backoff.
        let task = tokio::spawn(async move {
            let mut stream = watcher::watcher(api, config).default_backoff().boxed();
            let mut translator = WatchTranslator::default();

            while let Some(event) = stream.next().await {
                let forwarded = match event {
                    Ok(event) => translator.translate(event),
                    Err(e) => {
                        warn!(
                            namespace = %namespace,
                            selector = %selector,
                            error = %e,
                            "Config map watch failed, retrying"
                        );
                        continue;
                    }
                };
                if tx.send(forwarded).await.is_err() {
                    return;
                }
            }

            warn!(namespace = %namespace, selector = %selector, "Config map watch ended");
            let _ = tx
                .send(ConfigEvent::Error("watch stream ended".to_string()))
                .await;
        });

        Ok(Subscription::new(rx, task))
    }
}

/// Maps watcher events onto [`ConfigEvent`]s.
///
/// The watcher reports creations and updates alike as `Apply`; records not
/// seen before become [`ConfigEvent::Added`].
#[derive(Debug, Default)]
pub struct WatchTranslator {
    known: BTreeSet<String>,
    listing: BTreeSet<String>,
}

impl WatchTranslator {
    pub fn translate(&mut self, event: Event<ConfigMap>) -> ConfigEvent {
        match event {
            Event::Init => {
                self.listing.clear();
                ConfigEvent::Restarted
            }
            Event::InitApply(record) => {
                if let Some(name) = record.metadata.name.clone() {
                    self.listing.insert(name);
                }
                ConfigEvent::Added(record)
            }
            Event::InitDone => {
                self.known = std::mem::take(&mut self.listing);
                ConfigEvent::Synced
            }
            Event::Apply(record) => {
                let name = record.metadata.name.clone().unwrap_or_default();
                if self.known.insert(name) {
                    ConfigEvent::Added(record)
                } else {
                    ConfigEvent::Modified(record)
                }
            }
            Event::Delete(record) => {
                if let Some(name) = record.metadata.name.as_deref() {
                    self.known.remove(name);
                }
                ConfigEvent::Deleted(record)
            }
        }
    }
}

#[cfg(test)]
#[path = "kubernetes_tests.rs"]
mod kubernetes_tests;
