// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Instance reconciler: reacts to instance record changes.
//!
//! An added or modified record brings the instance to the present state and
//! makes sure a destination watch loop runs for its namespace. A deleted
//! record is routed to the lifecycle manager's delete path, which re-checks
//! usage instead of trusting the notification; an instance still in use is
//! left in place and its loop keeps running.

use super::destination::DestinationReconciler;
use super::dispatch::EventHandler;
use super::watch::WatchLoop;
use crate::errors::{ControllerError, Result};
use crate::instance::InstanceManager;
use crate::metrics;
use crate::model::{Instance, InstanceId};
use crate::platform::ConfigEvent;
use crate::records::instance_from_record;
use crate::selector;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct RunningLoop {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Handles instance record events and owns the per-instance watch loops.
pub struct InstanceReconciler {
    manager: InstanceManager,
    permits: Arc<Semaphore>,
    loops: Mutex<HashMap<InstanceId, RunningLoop>>,
}

impl InstanceReconciler {
    /// Reconciler whose destination loops share `permits` with every other loop.
    #[must_use]
    pub fn new(manager: InstanceManager, permits: Arc<Semaphore>) -> Self {
        Self {
            manager,
            permits,
            loops: Mutex::new(HashMap::new()),
        }
    }

    /// Instances with a running destination loop
    #[must_use]
    pub fn active_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every destination loop and wait for them to finish.
    pub async fn shutdown(&self) {
        let running: Vec<(InstanceId, RunningLoop)> = self.lock().drain().collect();
        for (id, running) in running {
            stop_loop(&id, running).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceId, RunningLoop>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn apply(&self, instance: Instance) -> Result<()> {
        self.manager.create_instance(&instance).await?;
        self.start_loop(&instance.id);
        Ok(())
    }

    async fn remove(&self, instance: Instance) -> Result<()> {
        match self.manager.delete_instance(&instance.id).await {
            Ok(()) => {
                let running = self.lock().remove(&instance.id);
                if let Some(running) = running {
                    stop_loop(&instance.id, running).await;
                }
                Ok(())
            }
            Err(e @ ControllerError::InstanceInUse { .. }) => {
                warn!(instance = %instance.id, "{e}, keeping instance");
                metrics::record_error(self.scope(), e.kind());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn start_loop(&self, id: &InstanceId) {
        let mut loops = self.lock();
        if loops.get(id).is_some_and(|running| !running.task.is_finished()) {
            debug!(instance = %id, "Destination loop already running");
            return;
        }

        let reconciler = DestinationReconciler::new(
            Arc::clone(self.manager.platform()),
            Arc::clone(self.manager.renderer()),
            id.clone(),
        );
        let watch_loop = WatchLoop::new(
            Arc::clone(self.manager.platform()),
            id.namespace(),
            selector::address_configs(),
            Arc::new(reconciler),
            Arc::clone(&self.permits),
        );
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(watch_loop.run(shutdown));

        info!(instance = %id, namespace = %id.namespace(), "Started destination loop");
        loops.insert(id.clone(), RunningLoop { stop, task });
    }
}

async fn stop_loop(id: &InstanceId, running: RunningLoop) {
    running.stop.send_replace(true);
    if let Err(e) = running.task.await {
        warn!(instance = %id, error = %e, "Destination loop ended abnormally");
    }
    info!(instance = %id, "Stopped destination loop");
}

#[async_trait]
impl EventHandler for InstanceReconciler {
    fn scope(&self) -> &'static str {
        "instance"
    }

    async fn handle(&self, event: ConfigEvent) -> Result<()> {
        let (record, deleted) = match event {
            ConfigEvent::Added(record) | ConfigEvent::Modified(record) => (record, false),
            ConfigEvent::Deleted(record) => (record, true),
            ConfigEvent::Restarted | ConfigEvent::Synced | ConfigEvent::Error(_) => return Ok(()),
        };

        let instance = match instance_from_record(&record) {
            Ok(instance) => instance,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed instance record");
                metrics::record_error(self.scope(), e.kind());
                return Ok(());
            }
        };

        if deleted {
            self.remove(instance).await
        } else {
            self.apply(instance).await
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod instance_tests;
