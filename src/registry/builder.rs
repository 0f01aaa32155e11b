//! Registry builder: validates descriptors and wires index edges.

use super::{Registry, ServiceIndex};
use crate::descriptor::Descriptor;
use crate::errors::RegistryError;
use std::collections::HashMap;

/// Builder for constructing a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<Descriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn register_all(mut self, descriptors: impl IntoIterator<Item = Descriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Build the registry.
    ///
    /// This validates the table:
    /// - ids are unique
    /// - every dependency and base references a registered service
    /// - no service extends itself
    ///
    /// Cycles are accepted here and reported when a cyclic service is resolved.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut index_map = HashMap::with_capacity(self.descriptors.len());
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if index_map.insert(descriptor.id().clone(), i).is_some() {
                return Err(RegistryError::DuplicateService {
                    id: descriptor.id().clone(),
                });
            }
        }

        let count = self.descriptors.len();
        let mut dependencies: Vec<Vec<ServiceIndex>> = vec![Vec::new(); count];
        let mut extends: Vec<Option<ServiceIndex>> = vec![None; count];
        let mut dependents: Vec<Vec<ServiceIndex>> = vec![Vec::new(); count];

        for (to_idx, descriptor) in self.descriptors.iter().enumerate() {
            for dep in descriptor.dependencies() {
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    RegistryError::UnknownDependency {
                        service: descriptor.id().clone(),
                        dependency: dep.clone(),
                    }
                })?;
                dependencies[to_idx].push(from_idx);
                dependents[from_idx].push(to_idx);
            }

            if let Some(base) = descriptor.extends() {
                if base == descriptor.id() {
                    return Err(RegistryError::SelfExtension {
                        service: descriptor.id().clone(),
                    });
                }
                let base_idx =
                    *index_map
                        .get(base)
                        .ok_or_else(|| RegistryError::UnknownExtends {
                            service: descriptor.id().clone(),
                            base: base.clone(),
                        })?;
                extends[to_idx] = Some(base_idx);
                if !dependents[base_idx].contains(&to_idx) {
                    dependents[base_idx].push(to_idx);
                }
            }
        }

        Ok(Registry {
            descriptors: self.descriptors,
            index_map,
            dependencies,
            extends,
            dependents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ServiceId;

    fn service(id: &str, deps: Vec<&str>) -> Descriptor {
        Descriptor::builder(id).depends_on(deps).build()
    }

    #[test]
    fn test_build_simple_registry() {
        let reg = RegistryBuilder::new()
            .register_all(vec![
                service("f", vec![]),
                service("g", vec!["f"]),
                service("h", vec!["g", "f"]),
            ])
            .build()
            .unwrap();

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.roots(), vec![0]);
    }

    #[test]
    fn test_missing_dependency() {
        let result = RegistryBuilder::new()
            .register(service("a", vec!["nonexistent"]))
            .build();

        assert_eq!(
            result.unwrap_err(),
            RegistryError::UnknownDependency {
                service: ServiceId::from("a"),
                dependency: ServiceId::from("nonexistent"),
            }
        );
    }

    #[test]
    fn test_duplicate_service_id() {
        let result = RegistryBuilder::new()
            .register(service("a", vec![]))
            .register(service("a", vec![]))
            .build();

        assert!(matches!(
            result,
            Err(RegistryError::DuplicateService { .. })
        ));
    }

    #[test]
    fn test_unknown_base() {
        let result = RegistryBuilder::new()
            .register(Descriptor::builder("ext").extends("base").build())
            .build();

        assert!(result.unwrap_err().to_string().contains("base"));
    }

    #[test]
    fn test_self_extension_rejected() {
        let result = RegistryBuilder::new()
            .register(Descriptor::builder("ext").extends("ext").build())
            .build();

        assert!(matches!(result, Err(RegistryError::SelfExtension { .. })));
    }

    #[test]
    fn test_cycles_are_accepted() {
        let reg = RegistryBuilder::new()
            .register(service("a", vec!["a"]))
            .build()
            .unwrap();
        assert_eq!(reg.dependencies(0), &[0]);
    }

    #[test]
    fn test_empty_registry() {
        let reg = RegistryBuilder::new().build().unwrap();
        assert!(reg.is_empty());
    }
}
