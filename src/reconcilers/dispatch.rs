// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ordered, bounded dispatch of watch events to handlers.
//!
//! Events are routed to one FIFO queue per key (by default the record name),
//! so events for one record are handled in delivery order while unrelated
//! records proceed independently. A shared [`Semaphore`] bounds how many
//! handler bodies run at once across every dispatcher that shares it.
//!
//! After [`KeyedDispatcher::shutdown`] no queued event starts; handlers
//! already running are allowed to finish and are awaited.

use super::retry::retry_with_backoff;
use crate::errors::Result;
use crate::metrics;
use crate::platform::ConfigEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Reacts to record change notifications.
///
/// Handlers must be idempotent: the same event may be delivered more than
/// once (re-listing after a watch gap) and may be stale.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Name of the loop, used in logs and metrics
    fn scope(&self) -> &'static str;

    /// Ordering key of an event; events with equal keys are handled one at a
    /// time in delivery order. `None` drops the event.
    fn key(&self, event: &ConfigEvent) -> Option<String> {
        event.record_name().map(str::to_string)
    }

    /// Handle one event. Retryable errors are retried with backoff.
    async fn handle(&self, event: ConfigEvent) -> Result<()>;
}

type Queues = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<ConfigEvent>>>>;

/// Routes events to per-key worker tasks.
///
/// A worker lives only while its key has queued events: once its queue runs
/// dry it removes the key and exits, and the next event for that key starts a
/// fresh worker. Both sides touch the queue map under one lock, so no event
/// is sent to a worker that is leaving.
pub struct KeyedDispatcher {
    handler: Arc<dyn EventHandler>,
    permits: Arc<Semaphore>,
    closed: watch::Sender<bool>,
    queues: Queues,
    workers: JoinSet<()>,
}

impl KeyedDispatcher {
    #[must_use]
    pub fn new(handler: Arc<dyn EventHandler>, permits: Arc<Semaphore>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            handler,
            permits,
            closed,
            queues: Arc::default(),
            workers: JoinSet::new(),
        }
    }

    /// Queue an event behind earlier events with the same key.
    pub fn dispatch(&mut self, event: ConfigEvent) {
        self.reap();
        if *self.closed.borrow() {
            debug!(scope = self.handler.scope(), "Dispatcher closed, dropping event");
            return;
        }
        let Some(key) = self.handler.key(&event) else {
            return;
        };

        let mut queues = lock(&self.queues);
        let event = match queues.get(&key) {
            Some(queue) => match queue.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (queue, events) = mpsc::unbounded_channel();
        let _ = queue.send(event);
        queues.insert(key.clone(), queue);
        drop(queues);

        self.workers.spawn(run_worker(
            key,
            Arc::clone(&self.handler),
            Arc::clone(&self.permits),
            Arc::clone(&self.queues),
            self.closed.subscribe(),
            events,
        ));
    }

    /// Number of keys with queued or running events.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        lock(&self.queues).len()
    }

    /// Number of worker tasks still alive.
    pub fn live_workers(&mut self) -> usize {
        self.reap();
        self.workers.len()
    }

    /// Stop scheduling queued events and wait for running handlers.
    pub async fn shutdown(&mut self) {
        self.closed.send_replace(true);
        lock(&self.queues).clear();
        while self.workers.join_next().await.is_some() {}
        debug!(scope = self.handler.scope(), "Dispatcher stopped");
    }

    /// Collect workers that have exited.
    fn reap(&mut self) {
        while self.workers.try_join_next().is_some() {}
    }
}

fn lock(
    queues: &Queues,
) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<ConfigEvent>>> {
    queues.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_worker(
    key: String,
    handler: Arc<dyn EventHandler>,
    permits: Arc<Semaphore>,
    queues: Queues,
    mut closed: watch::Receiver<bool>,
    mut events: mpsc::UnboundedReceiver<ConfigEvent>,
) {
    loop {
        // Emptiness is checked under the map lock so a concurrent dispatch
        // either lands in this queue or finds the key gone.
        let event = {
            let mut queues = lock(&queues);
            match events.try_recv() {
                Ok(event) => event,
                Err(_) => {
                    queues.remove(&key);
                    break;
                }
            }
        };

        let permit = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => break,
            permit = permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        handle_event(handler.as_ref(), event).await;
        drop(permit);
    }
}

async fn handle_event(handler: &dyn EventHandler, event: ConfigEvent) {
    let scope = handler.scope();
    let record = event.record_name().unwrap_or_default().to_string();
    let start = Instant::now();

    match retry_with_backoff(|| handler.handle(event.clone()), scope).await {
        Ok(()) => metrics::record_reconciliation_success(scope, start.elapsed()),
        Err(e) => {
            metrics::record_reconciliation_error(scope, start.elapsed());
            metrics::record_error(scope, e.kind());
            error!(scope = scope, record = %record, error = %e, "Failed to handle event");
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod dispatch_tests;
