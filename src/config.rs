//! Service settings and manifest files.
//!
//! Factories read their settings through a [`ConfigProvider`]. The
//! orchestrator never interprets those values; it only hands them to the
//! factory of the service being activated.
//!
//! A [`Manifest`] describes a whole service graph in TOML and doubles as a
//! settings provider:
//!
//! ```toml
//! [[service]]
//! id = "storage"
//!
//! [[service]]
//! id = "index"
//! depends_on = ["storage"]
//!
//! [service.settings]
//! path = "/var/lib/index"
//!
//! [[service]]
//! id = "index-audit"
//! extends = "index"
//! ```

use crate::descriptor::{Descriptor, ServiceId};
use crate::errors::RegistryError;
use crate::registry::{Registry, RegistryBuilder};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Supplies the settings value handed to a service's factory.
pub trait ConfigProvider: Send + Sync {
    fn settings(&self, id: &ServiceId) -> Option<toml::Value>;
}

/// Provider without any settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfig;

impl ConfigProvider for NoConfig {
    fn settings(&self, _id: &ServiceId) -> Option<toml::Value> {
        None
    }
}

/// In-memory settings keyed by service id.
#[derive(Debug, Default, Clone)]
pub struct StaticConfig {
    values: HashMap<ServiceId, toml::Value>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<ServiceId>, value: impl Into<toml::Value>) -> Self {
        self.values.insert(id.into(), value.into());
        self
    }
}

impl ConfigProvider for StaticConfig {
    fn settings(&self, id: &ServiceId) -> Option<toml::Value> {
        self.values.get(id).cloned()
    }
}

/// One `[[service]]` entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: ServiceId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<toml::Value>,
}

/// Service graph loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceEntry>,
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// Parse a manifest from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse service manifest")
    }

    pub fn entry(&self, id: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.id.as_str() == id)
    }

    /// Build a registry whose factories hand out each service's settings
    /// table (an empty table when none is configured) as its instance.
    pub fn to_registry(&self) -> Result<Registry, RegistryError> {
        let descriptors = self.services.iter().map(|entry| {
            let mut builder = Descriptor::builder(entry.id.clone())
                .depends_on(entry.depends_on.iter().cloned());
            if let Some(base) = &entry.extends {
                builder = builder.extends(base.clone());
            }
            builder
                .factory_fn(|ctx| {
                    Ok(ctx
                        .settings()
                        .cloned()
                        .unwrap_or_else(|| toml::Value::Table(toml::Table::new())))
                })
                .build()
        });
        RegistryBuilder::new().register_all(descriptors).build()
    }
}

impl ConfigProvider for Manifest {
    fn settings(&self, id: &ServiceId) -> Option<toml::Value> {
        self.entry(id.as_str()).and_then(|e| e.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[service]]
id = "storage"

[[service]]
id = "index"
depends_on = ["storage"]

[service.settings]
path = "/var/lib/index"
shards = 4

[[service]]
id = "index-audit"
extends = "index"
"#;

    #[test]
    fn parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.services.len(), 3);

        let index = manifest.entry("index").unwrap();
        assert_eq!(index.depends_on, vec![ServiceId::from("storage")]);
        let settings = index.settings.as_ref().unwrap();
        assert_eq!(settings.get("shards").and_then(|v| v.as_integer()), Some(4));

        let audit = manifest.entry("index-audit").unwrap();
        assert_eq!(audit.extends, Some(ServiceId::from("index")));
        assert!(audit.depends_on.is_empty());
    }

    #[test]
    fn parse_empty_manifest() {
        let manifest = Manifest::parse("").unwrap();
        assert!(manifest.services.is_empty());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        let err = Manifest::parse("[[service]]\ndepends_on = 3\n").unwrap_err();
        assert!(err.to_string().contains("manifest"));
    }

    #[test]
    fn manifest_builds_registry() {
        let registry = Manifest::parse(MANIFEST).unwrap().to_registry().unwrap();
        assert_eq!(registry.len(), 3);
        let index = registry.index_of("index").unwrap();
        assert_eq!(registry.dependencies(index), &[0]);
        assert_eq!(registry.extends(2), Some(index));
    }

    #[test]
    fn manifest_with_unknown_dependency_fails() {
        let manifest = Manifest::parse("[[service]]\nid = \"a\"\ndepends_on = [\"b\"]\n").unwrap();
        assert!(matches!(
            manifest.to_registry(),
            Err(RegistryError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn manifest_provides_settings() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert!(manifest.settings(&ServiceId::from("index")).is_some());
        assert!(manifest.settings(&ServiceId::from("storage")).is_none());
        assert!(manifest.settings(&ServiceId::from("unknown")).is_none());
    }

    #[test]
    fn static_config_returns_values() {
        let config = StaticConfig::new().with("storage", "/tmp/data");
        assert_eq!(
            config.settings(&ServiceId::from("storage")),
            Some(toml::Value::String("/tmp/data".into()))
        );
        assert!(NoConfig.settings(&ServiceId::from("storage")).is_none());
    }
}
