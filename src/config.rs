// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller options, read from the command line or the environment.
//!
//! Every option has an environment variable so the controller can be
//! configured entirely from its deployment manifest.

use crate::constants::{
    DEFAULT_METRICS_ADDR, DEFAULT_TEMPLATE_DIR, DEFAULT_WORKER_POOL_SIZE,
    SERVICE_ACCOUNT_NAMESPACE_FILE,
};
use crate::errors::{ControllerError, Result};
use crate::model::{Instance, InstanceId};
use clap::builder::{BoolishValueParser, TypedValueParser};
use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Address controller for a multi-tenant messaging platform
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct ControllerOptions {
    /// Namespace the controller runs in; holds the instance records
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Manage many instances instead of the controller's own namespace only
    #[arg(
        long,
        env = "MULTIINSTANCE",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub multiinstance: bool,

    /// Directory of bundle templates
    #[arg(long, env = "TEMPLATE_DIR", default_value = DEFAULT_TEMPLATE_DIR)]
    pub template_dir: PathBuf,

    /// Messaging endpoint hostname of the single instance
    #[arg(long, env = "INSTANCE_MESSAGING_HOST")]
    pub messaging_host: Option<String>,

    /// MQTT gateway hostname of the single instance
    #[arg(long, env = "INSTANCE_MQTT_HOST")]
    pub mqtt_host: Option<String>,

    /// Console hostname of the single instance
    #[arg(long, env = "INSTANCE_CONSOLE_HOST")]
    pub console_host: Option<String>,

    /// Certificate secret of the single instance
    #[arg(long, env = "INSTANCE_CERT_SECRET")]
    pub cert_secret: Option<String>,

    /// Template rendered into every new instance namespace
    #[arg(long, env = "INSTANCE_TEMPLATE")]
    pub instance_template: Option<String>,

    /// Maximum number of event handlers running at once
    #[arg(
        long,
        env = "WORKER_POOL_SIZE",
        default_value_t = DEFAULT_WORKER_POOL_SIZE,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub worker_pool_size: usize,

    /// Bind address of the metrics and health endpoint
    #[arg(long, env = "METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: SocketAddr,
}

impl ControllerOptions {
    /// The controller namespace: the configured one, else the namespace of
    /// the pod's service account.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Configuration`] if neither is available.
    pub fn resolve_namespace(&self) -> Result<String> {
        self.resolve_namespace_from(Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE))
    }

    /// [`ControllerOptions::resolve_namespace`] with an explicit service
    /// account file.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Configuration`] if neither is available.
    pub fn resolve_namespace_from(&self, service_account_file: &Path) -> Result<String> {
        if let Some(namespace) = self.namespace.as_deref().map(str::trim) {
            if !namespace.is_empty() {
                return Ok(namespace.to_string());
            }
        }

        match std::fs::read_to_string(service_account_file) {
            Ok(namespace) if !namespace.trim().is_empty() => Ok(namespace.trim().to_string()),
            _ => Err(ControllerError::Configuration {
                reason: format!(
                    "NAMESPACE is not set and {} is not readable",
                    service_account_file.display()
                ),
            }),
        }
    }

    /// The instance managed in single-instance mode: the controller
    /// namespace itself, with the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidInstanceId`] if the namespace is not
    /// a usable instance id.
    pub fn single_instance(&self, namespace: &str) -> Result<Instance> {
        let id = InstanceId::with_id_and_namespace(namespace, namespace)?;
        Ok(Instance::new(id)
            .with_messaging_host(self.messaging_host.clone())
            .with_mqtt_host(self.mqtt_host.clone())
            .with_console_host(self.console_host.clone())
            .with_cert_secret(self.cert_secret.clone()))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
