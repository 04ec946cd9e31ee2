// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch-driven reconciliation of instances and destinations.
//!
//! # Reconciliation Architecture
//!
//! The controller follows the usual watch/reconcile pattern:
//!
//! 1. **Watch** - a [`WatchLoop`] keeps one subscription per namespace and
//!    label selector open, re-listing in full after every disconnect
//! 2. **Dispatch** - a [`KeyedDispatcher`] queues events per record and runs
//!    handlers on a bounded pool
//! 3. **Reconcile** - handlers re-derive desired state and converge the
//!    platform to it
//!
//! # Available Reconcilers
//!
//! - [`InstanceReconciler`] - instance records in the controller namespace;
//!   owns one destination loop per instance
//! - [`DestinationReconciler`] - address-config records of one instance;
//!   creates and deletes destination cluster bundles
//!
//! # Example
//!
//! ```rust,no_run
//! use address_controller::instance::InstanceManager;
//! use address_controller::platform::memory::InMemoryPlatform;
//! use address_controller::reconcilers::{InstanceReconciler, WatchLoop};
//! use address_controller::selector;
//! use address_controller::templates::TemplateCatalog;
//! use std::sync::Arc;
//! use tokio::sync::{watch, Semaphore};
//!
//! # async fn example() {
//! let platform = Arc::new(InMemoryPlatform::new());
//! let manager = InstanceManager::new(platform.clone(), Arc::new(TemplateCatalog::new()), "enmasse");
//! let permits = Arc::new(Semaphore::new(4));
//! let reconciler = Arc::new(InstanceReconciler::new(manager, permits.clone()));
//!
//! let (_stop, shutdown) = watch::channel(false);
//! WatchLoop::new(platform, "enmasse", selector::instance_records(), reconciler.clone(), permits)
//!     .run(shutdown)
//!     .await;
//! reconciler.shutdown().await;
//! # }
//! ```

pub mod destination;
pub mod dispatch;
pub mod instance;
pub mod retry;
pub mod watch;

pub use destination::{DestinationReconciler, ReconcileOutcome};
pub use dispatch::{EventHandler, KeyedDispatcher};
pub use instance::InstanceReconciler;
pub use retry::{retry_with_backoff, ExponentialBackoff};
pub use watch::WatchLoop;
