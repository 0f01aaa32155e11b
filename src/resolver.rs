//! Activation planning.
//!
//! The resolver turns one or more requested services into an ordered,
//! duplicate-free activation plan:
//!
//! 1. **Extension map** - every service reachable through `dependencies`
//!    or `extends` from the roots is inspected; each one that extends a
//!    base is recorded under that base, in discovery order.
//! 2. **Post-order walk** - dependencies are visited in declaration order,
//!    then the base of an extension, then the service itself is emitted.
//!    Right after a base is emitted its recorded extensions are visited, so
//!    they land directly behind it.
//!
//! A service that is re-entered while still on the walk path closes a
//! cycle; resolution stops with [`LifecycleError::DependencyCycle`] carrying
//! only the services on that cycle.

use crate::errors::LifecycleError;
use crate::registry::{Registry, ServiceIndex};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Computes dependency-first activation plans over a [`Registry`].
pub struct Resolver<'r> {
    registry: &'r Registry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Every service needed to activate `target`, each once, `target` last.
    pub fn resolve(&self, target: ServiceIndex) -> Result<Vec<ServiceIndex>, LifecycleError> {
        self.resolve_with(&[target], |_| false)
    }

    /// One plan covering several roots, sharing a single extension map.
    pub fn resolve_all(&self, roots: &[ServiceIndex]) -> Result<Vec<ServiceIndex>, LifecycleError> {
        self.resolve_with(roots, |_| false)
    }

    /// Plan the roots, treating services for which `settled` holds as
    /// already available: they are neither emitted nor descended into.
    pub fn resolve_with<F>(
        &self,
        roots: &[ServiceIndex],
        settled: F,
    ) -> Result<Vec<ServiceIndex>, LifecycleError>
    where
        F: Fn(ServiceIndex) -> bool,
    {
        let mut walk = Walk {
            registry: self.registry,
            settled,
            extensions: self.extension_map(roots),
            marks: vec![Mark::Unvisited; self.registry.len()],
            path: Vec::new(),
            order: Vec::new(),
        };

        for &root in roots {
            if let Err(cycle) = walk.visit(root) {
                let path = self.registry.ids(&cycle);
                tracing::debug!(cycle = ?path, "resolution stopped at dependency cycle");
                return Err(LifecycleError::DependencyCycle { path });
            }
        }

        Ok(walk.order)
    }

    /// Map each base to the extensions reachable from `roots`, following the
    /// same edges as the walk so an extension is anchored whichever root
    /// leads to it.
    fn extension_map(&self, roots: &[ServiceIndex]) -> HashMap<ServiceIndex, Vec<ServiceIndex>> {
        let mut extensions: HashMap<ServiceIndex, Vec<ServiceIndex>> = HashMap::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<ServiceIndex> = roots.iter().rev().copied().collect();

        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            if let Some(base) = self.registry.extends(index) {
                extensions.entry(base).or_default().push(index);
                stack.push(base);
            }
            stack.extend(self.registry.dependencies(index).iter().rev());
        }

        extensions
    }
}

struct Walk<'r, F> {
    registry: &'r Registry,
    settled: F,
    extensions: HashMap<ServiceIndex, Vec<ServiceIndex>>,
    marks: Vec<Mark>,
    path: Vec<ServiceIndex>,
    order: Vec<ServiceIndex>,
}

impl<F> Walk<'_, F>
where
    F: Fn(ServiceIndex) -> bool,
{
    /// Returns the closing cycle, in "depends on" order, on failure.
    fn visit(&mut self, index: ServiceIndex) -> Result<(), Vec<ServiceIndex>> {
        match self.marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(self.cycle_through(index)),
            Mark::Unvisited => {}
        }

        if (self.settled)(index) {
            self.marks[index] = Mark::Done;
            return Ok(());
        }

        self.marks[index] = Mark::InProgress;
        self.path.push(index);

        let registry = self.registry;
        for &dependency in registry.dependencies(index) {
            self.visit(dependency)?;
        }
        if let Some(base) = registry.extends(index) {
            self.visit(base)?;
        }

        self.path.pop();
        self.marks[index] = Mark::Done;
        self.order.push(index);

        if let Some(extensions) = self.extensions.get(&index).cloned() {
            for extension in extensions {
                if self.marks[extension] == Mark::InProgress {
                    // Its base is being emitted on its own behalf.
                    continue;
                }
                self.visit(extension)?;
            }
        }

        Ok(())
    }

    fn cycle_through(&self, index: ServiceIndex) -> Vec<ServiceIndex> {
        let start = self
            .path
            .iter()
            .position(|&i| i == index)
            .unwrap_or(0);
        let mut cycle = self.path[start..].to_vec();
        cycle.push(index);
        cycle
    }
}
