// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selectors used to list and watch platform resources.
//!
//! A [`Selector`] is a conjunction of equality requirements (`key=value`) and
//! existence requirements (`key`). It renders to the Kubernetes label selector
//! syntax and can be evaluated locally against a label map.
//!
//! # Example
//!
//! ```
//! use address_controller::selector::Selector;
//! use std::collections::BTreeMap;
//!
//! let selector = Selector::new().with("type", "address-config").exists("group-id");
//! assert_eq!(selector.to_string(), "type=address-config,group-id");
//!
//! let labels = BTreeMap::from([
//!     ("type".to_string(), "address-config".to_string()),
//!     ("group-id".to_string(), "orders".to_string()),
//! ]);
//! assert!(selector.matches(&labels));
//! ```

use crate::labels::{
    APP_ENMASSE, LABEL_APP, LABEL_GROUP_ID, LABEL_TYPE, TYPE_ADDRESS_CONFIG, TYPE_INSTANCE,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Conjunction of label requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    equals: BTreeMap<String, String>,
    exists: BTreeSet<String>,
}

impl Selector {
    /// Selector matching everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.equals.insert(key.to_string(), value.to_string());
        self
    }

    /// Require `key` to be present with any value
    #[must_use]
    pub fn exists(mut self, key: &str) -> Self {
        self.exists.insert(key.to_string());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.exists.is_empty()
    }

    /// Evaluate the selector against a label map.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
            && self.exists.iter().all(|key| labels.contains_key(key))
    }

    /// Evaluate the selector against optional labels (as found in object metadata).
    #[must_use]
    pub fn matches_opt(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        match labels {
            Some(labels) => self.matches(labels),
            None => self.is_empty(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requirements: Vec<String> = self
            .equals
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .chain(self.exists.iter().cloned())
            .collect();
        f.write_str(&requirements.join(","))
    }
}

/// Instance configuration records
#[must_use]
pub fn instance_records() -> Selector {
    Selector::new()
        .with(LABEL_APP, APP_ENMASSE)
        .with(LABEL_TYPE, TYPE_INSTANCE)
}

/// Address-config records of one namespace
#[must_use]
pub fn address_configs() -> Selector {
    Selector::new().with(LABEL_TYPE, TYPE_ADDRESS_CONFIG)
}

/// Every resource that belongs to a destination group
#[must_use]
pub fn group_owned() -> Selector {
    Selector::new().exists(LABEL_GROUP_ID)
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
