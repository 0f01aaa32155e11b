//! Flat descriptor table.
//!
//! Descriptors are registered once, at wiring time, and addressed by index
//! afterwards. Edges are kept as index lists in both directions so the
//! resolver and the orchestrator never chase pointers.
//!
//! ## Example
//!
//! ```
//! use servitor::descriptor::Descriptor;
//! use servitor::registry::RegistryBuilder;
//!
//! # fn example() -> Result<(), servitor::RegistryError> {
//! let registry = RegistryBuilder::new()
//!     .register(Descriptor::builder("f").build())
//!     .register(Descriptor::builder("g").depends_on(["f"]).build())
//!     .register(Descriptor::builder("h").depends_on(["g", "f"]).build())
//!     .build()?;
//!
//! let f = registry.index_of("f").unwrap();
//! assert_eq!(registry.dependents(f).len(), 2);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod builder;

pub use builder::RegistryBuilder;

use crate::descriptor::{Descriptor, ServiceId};
use std::collections::{HashMap, HashSet};

/// Index into the descriptor table.
pub type ServiceIndex = usize;

/// Validated table of service descriptors.
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<Descriptor>,
    index_map: HashMap<ServiceId, ServiceIndex>,
    /// index -> indices it depends on, in declaration order
    dependencies: Vec<Vec<ServiceIndex>>,
    /// index -> index of the service it extends
    extends: Vec<Option<ServiceIndex>>,
    /// index -> indices that depend on or extend it
    dependents: Vec<Vec<ServiceIndex>>,
}

impl Registry {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptor(&self, index: ServiceIndex) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<ServiceIndex> {
        self.index_map.get(id).copied()
    }

    /// Id of a service. Panics on an index that did not come from this registry.
    pub fn id(&self, index: ServiceIndex) -> &ServiceId {
        self.descriptors[index].id()
    }

    pub fn ids(&self, indices: &[ServiceIndex]) -> Vec<ServiceId> {
        indices.iter().map(|&i| self.id(i).clone()).collect()
    }

    pub fn dependencies(&self, index: ServiceIndex) -> &[ServiceIndex] {
        self.dependencies.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn extends(&self, index: ServiceIndex) -> Option<ServiceIndex> {
        self.extends.get(index).copied().flatten()
    }

    /// Services that name `index` as a dependency or as their base.
    pub fn dependents(&self, index: ServiceIndex) -> &[ServiceIndex] {
        self.dependents.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Services with neither dependencies nor a base.
    pub fn roots(&self) -> Vec<ServiceIndex> {
        (0..self.len()).filter(|&i| self.is_root(i)).collect()
    }

    pub fn is_root(&self, index: ServiceIndex) -> bool {
        self.dependencies(index).is_empty() && self.extends(index).is_none()
    }

    /// Everything `index` needs, directly or transitively, excluding itself
    /// unless it sits on a cycle.
    pub fn requirements(&self, index: ServiceIndex) -> HashSet<ServiceIndex> {
        let mut seen = HashSet::new();
        let mut stack: Vec<ServiceIndex> = self.needs(index).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.needs(next));
            }
        }
        seen
    }

    fn needs(&self, index: ServiceIndex) -> impl Iterator<Item = ServiceIndex> + '_ {
        self.dependencies(index)
            .iter()
            .copied()
            .chain(self.extends(index))
    }
}
