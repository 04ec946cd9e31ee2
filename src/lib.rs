// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Address Controller - control plane of a multi-tenant messaging platform
//!
//! The address controller manages messaging *instances* (isolated tenant
//! namespaces) and the *destinations* (queues and topics) declared inside
//! them, converging deployed Kubernetes resources to the declared state.
//!
//! ## Overview
//!
//! - Instances and destination groups are persisted as labeled config maps
//! - Destinations sharing a group id are deployed together as one bundle
//!   rendered from a template
//! - Watch loops observe the records and reconcile on every change,
//!   re-listing in full after every disconnect
//!
//! ## Modules
//!
//! - [`platform`] - the platform port, with Kubernetes and in-memory implementations
//! - [`codec`] - address and instance record payload encoding
//! - [`grouper`] - discovery of destination clusters from live resources
//! - [`instance`] - instance lifecycle management
//! - [`destinations`] - the destination API of an instance
//! - [`reconcilers`] - watch loops and the reconcilers they drive
//! - [`templates`] - rendering of bundle templates
//!
//! ## Example
//!
//! ```rust,no_run
//! use address_controller::instance::InstanceManager;
//! use address_controller::model::{Destination, DestinationGroup, Instance, InstanceId};
//! use address_controller::platform::memory::InMemoryPlatform;
//! use address_controller::templates::TemplateCatalog;
//! use std::sync::Arc;
//!
//! # async fn example() -> address_controller::errors::Result<()> {
//! let platform = Arc::new(InMemoryPlatform::new());
//! let manager = InstanceManager::new(platform, Arc::new(TemplateCatalog::new()), "enmasse");
//!
//! let acme = Instance::new(InstanceId::with_id("acme")?);
//! manager.create_instance(&acme).await?;
//!
//! let orders = DestinationGroup::new(
//!     "orders",
//!     vec![Destination::new("in", "orders").store_and_forward(true)],
//! )?;
//! manager.destinations(&acme.id).put(vec![orders]).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod destinations;
pub mod errors;
pub mod grouper;
pub mod instance;
pub mod labels;
pub mod metrics;
pub mod model;
pub mod platform;
pub mod reconcilers;
pub mod records;
pub mod selector;
pub mod templates;
