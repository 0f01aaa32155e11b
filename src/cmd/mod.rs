//! CLI command implementations.
//!
//! | Module   | Commands handled                  |
//! |----------|-----------------------------------|
//! | `graph`  | `Plan`, `Check`, `Dependents`     |
//! | `start`  | `Start`                           |

pub mod graph;
pub mod start;

pub use graph::{cmd_check, cmd_dependents, cmd_plan};
pub use start::cmd_start;

use anyhow::{Context, Result};
use servitor::config::Manifest;
use servitor::registry::{Registry, ServiceIndex};
use std::path::Path;

/// Load a manifest and validate it into a registry.
fn load(manifest_path: &Path) -> Result<(Manifest, Registry)> {
    let manifest = Manifest::load(manifest_path)?;
    let registry = manifest
        .to_registry()
        .with_context(|| format!("Invalid service graph in {}", manifest_path.display()))?;
    tracing::debug!(
        manifest = %manifest_path.display(),
        services = registry.len(),
        "manifest loaded"
    );
    Ok((manifest, registry))
}

fn lookup(registry: &Registry, service: &str) -> Result<ServiceIndex> {
    registry
        .index_of(service)
        .with_context(|| format!("Unknown service: {}", service))
}
