// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rendering of named templates into resource bundles.
//!
//! A template is a JSON or YAML document with a parameter list and the
//! objects to create:
//!
//! ```yaml
//! parameters:
//!   - name: NAME
//!   - name: REPLICAS
//!     value: "1"
//! objects:
//!   - apiVersion: apps/v1
//!     kind: Deployment
//!     metadata:
//!       name: ${NAME}
//! ```
//!
//! Rendering substitutes every `${PARAM}` occurrence in string values.
//! Supplied values win over declared defaults; a declared parameter with
//! neither renders as an empty string. Placeholders naming a parameter that
//! is neither declared nor supplied are left untouched.

use crate::errors::{ControllerError, Result};
use crate::platform::{PlatformResource, ResourceBundle};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Turns a template name plus parameters into a ready-to-submit bundle.
pub trait TemplateRenderer: Send + Sync {
    /// Render template `name`.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::TemplateNotFound`] for an unknown template
    /// - [`ControllerError::TemplateRender`] if an object is not a supported resource
    fn render(&self, name: &str, parameters: &BTreeMap<String, String>) -> Result<ResourceBundle>;
}

#[derive(Debug, Clone, Deserialize)]
struct TemplateParameter {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Template {
    #[serde(default)]
    parameters: Vec<TemplateParameter>,
    #[serde(default)]
    objects: Vec<Value>,
}

/// Templates loaded into memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
}

impl TemplateCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.json`, `.yaml` and `.yml` file of a directory; the file
    /// stem is the template name.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Configuration`] if the directory cannot be read
    /// - [`ControllerError::TemplateRender`] if a template does not parse
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| ControllerError::Configuration {
            reason: format!("cannot read template directory {}: {e}", dir.display()),
        })?;

        let mut catalog = Self::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ControllerError::Configuration {
                    reason: format!("cannot read template directory {}: {e}", dir.display()),
                })?
                .path();

            let (Some(name), Some(extension)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            if !matches!(extension, "json" | "yaml" | "yml") {
                continue;
            }

            let text = std::fs::read_to_string(&path).map_err(|e| ControllerError::TemplateRender {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            let template: Template = if extension == "json" {
                serde_json::from_str(&text).map_err(|e| e.to_string())
            } else {
                serde_yaml::from_str(&text).map_err(|e| e.to_string())
            }
            .map_err(|reason| ControllerError::TemplateRender {
                name: name.to_string(),
                reason,
            })?;

            debug!(template = %name, path = %path.display(), "Loaded template");
            catalog.templates.insert(name.to_string(), template);
        }

        info!(
            dir = %dir.display(),
            count = catalog.templates.len(),
            "Loaded templates"
        );
        Ok(catalog)
    }

    /// Register a template from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::TemplateRender`] if the text does not parse.
    pub fn insert_json(&mut self, name: &str, text: &str) -> Result<()> {
        let template = serde_json::from_str(text).map_err(|e| ControllerError::TemplateRender {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.templates.insert(name.to_string(), template);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl TemplateRenderer for TemplateCatalog {
    fn render(&self, name: &str, parameters: &BTreeMap<String, String>) -> Result<ResourceBundle> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| ControllerError::TemplateNotFound {
                name: name.to_string(),
            })?;

        let mut values: BTreeMap<String, String> = template
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone().unwrap_or_default()))
            .collect();
        values.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));

        template
            .objects
            .iter()
            .map(|object| {
                PlatformResource::from_object(substitute_value(object, &values)).map_err(|e| {
                    ControllerError::TemplateRender {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect()
    }
}

fn substitute_value(value: &Value, values: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(text) => Value::String(substitute(text, values)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, values)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, values)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replace `${NAME}` placeholders with their values.
fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    let mut rendered = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };

        let name = &after[..end];
        match values.get(name) {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }

    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
#[path = "templates_tests.rs"]
mod templates_tests;
