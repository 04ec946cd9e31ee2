// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch loop: keeps a subscription open and feeds its events to a dispatcher.
//!
//! Every full listing, whether it opens a subscription or the platform
//! re-lists after losing track of changes, is compared against the records
//! known before it: records that vanished in between are delivered as
//! synthetic delete events, so deletions are never missed. A subscription
//! that fails is never resumed; the loop backs off and opens a new one.

use super::dispatch::{EventHandler, KeyedDispatcher};
use super::retry::watch_backoff;
use crate::errors::ControllerError;
use crate::metrics;
use crate::platform::{ConfigEvent, Platform, Subscription};
use crate::selector::Selector;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// One watched scope: a namespace plus a label selector.
pub struct WatchLoop {
    platform: Arc<dyn Platform>,
    namespace: String,
    selector: Selector,
    scope: &'static str,
    dispatcher: KeyedDispatcher,
    known: BTreeMap<String, ConfigMap>,
}

impl WatchLoop {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        namespace: impl Into<String>,
        selector: Selector,
        handler: Arc<dyn EventHandler>,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            platform,
            namespace: namespace.into(),
            selector,
            scope: handler.scope(),
            dispatcher: KeyedDispatcher::new(handler, permits),
            known: BTreeMap::new(),
        }
    }

    /// Run until `shutdown` turns true (or its sender goes away).
    ///
    /// On return the subscription is closed and every dispatched handler has
    /// finished.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = watch_backoff();
        let mut subscriptions = 0_u64;

        info!(
            scope = self.scope,
            namespace = %self.namespace,
            selector = %self.selector,
            "Starting watch loop"
        );

        loop {
            let opened = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                opened = self.platform.watch(&self.namespace, &self.selector) => opened,
            };

            let reason = match opened {
                Ok(subscription) => {
                    if subscriptions > 0 {
                        metrics::record_watch_restart(self.scope);
                    }
                    subscriptions += 1;
                    match self.consume(subscription, &mut shutdown).await {
                        Some((reason, synced)) => {
                            if synced {
                                backoff.reset();
                            }
                            reason
                        }
                        None => break,
                    }
                }
                Err(e) => e.to_string(),
            };

            let disconnected = ControllerError::WatchDisconnected {
                namespace: self.namespace.clone(),
                selector: self.selector.to_string(),
                reason,
            };
            metrics::record_error(self.scope, disconnected.kind());
            let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
            warn!(scope = self.scope, retry_after = ?delay, "{disconnected}");

            if stopped(&mut shutdown, delay).await {
                break;
            }
        }

        self.dispatcher.shutdown().await;
        info!(
            scope = self.scope,
            namespace = %self.namespace,
            "Watch loop stopped"
        );
    }

    /// Pump one subscription. Returns why it failed and whether a listing
    /// completed, or `None` on shutdown.
    async fn consume(
        &mut self,
        mut subscription: Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<(String, bool)> {
        // Names seen since the listing in progress started
        let mut listing: Option<BTreeSet<String>> = Some(BTreeSet::new());
        let mut synced = false;

        loop {
            let event = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return None,
                event = subscription.next() => event,
            };

            match event {
                Some(ConfigEvent::Restarted) => {
                    if synced {
                        debug!(scope = self.scope, "Platform is re-listing records");
                        metrics::record_watch_restart(self.scope);
                    }
                    listing = Some(BTreeSet::new());
                }
                Some(ConfigEvent::Synced) => {
                    synced = true;
                    if let Some(listed) = listing.take() {
                        self.forget_vanished(&listed);
                    }
                }
                Some(ConfigEvent::Error(reason)) => return Some((reason, synced)),
                None => return Some(("subscription ended".to_string(), synced)),
                Some(event) => {
                    if let Some(name) = event.record_name().map(str::to_string) {
                        match &event {
                            ConfigEvent::Deleted(_) => {
                                self.known.remove(&name);
                            }
                            ConfigEvent::Added(record) | ConfigEvent::Modified(record) => {
                                if let Some(listed) = listing.as_mut() {
                                    listed.insert(name.clone());
                                }
                                self.known.insert(name, record.clone());
                            }
                            ConfigEvent::Restarted
                            | ConfigEvent::Synced
                            | ConfigEvent::Error(_) => {}
                        }
                    }
                    self.dispatcher.dispatch(event);
                }
            }
        }
    }

    /// Deliver deletes for known records missing from a fresh listing.
    fn forget_vanished(&mut self, listed: &BTreeSet<String>) {
        let vanished: Vec<String> = self
            .known
            .keys()
            .filter(|name| !listed.contains(*name))
            .cloned()
            .collect();

        for name in vanished {
            if let Some(record) = self.known.remove(&name) {
                debug!(
                    scope = self.scope,
                    record = %name,
                    "Record vanished while the watch was behind"
                );
                self.dispatcher.dispatch(ConfigEvent::Deleted(record));
            }
        }
    }
}

/// Sleep for `delay`; true if shutdown was requested meanwhile.
async fn stopped(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.wait_for(|stop| *stop) => true,
        () = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;
