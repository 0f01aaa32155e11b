//! Static service definitions.
//!
//! A [`Descriptor`] names one manageable singleton service: its identity,
//! the services it needs, an optional base service it extends, and the
//! [`Factory`] that builds a fresh implementation on every activation.
//!
//! ## Example
//!
//! ```
//! use servitor::descriptor::Descriptor;
//!
//! let storage = Descriptor::builder("storage")
//!     .depends_on(["config"])
//!     .factory_fn(|ctx| {
//!         let path: Option<String> = ctx.settings_as()?;
//!         Ok(path.unwrap_or_else(|| "/tmp".to_string()))
//!     })
//!     .build();
//!
//! assert_eq!(storage.id().as_str(), "storage");
//! assert_eq!(storage.dependencies()[0].as_str(), "config");
//! ```

use crate::orchestrator::ServiceContext;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a service definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A live service implementation.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds and tears down service implementations.
///
/// `create` runs while the orchestrator lock is held. It may start further
/// services through [`ServiceContext::start_up`]; those activations share the
/// rollback bookkeeping of the call that triggered this construction.
pub trait Factory: Send + Sync {
    /// Produce a new implementation instance.
    fn create(&self, ctx: &mut ServiceContext<'_>) -> anyhow::Result<Instance>;

    /// Release an instance on deactivation. Dropping it is the default.
    fn destroy(&self, instance: Instance) {
        drop(instance);
    }
}

type CreateFn = dyn Fn(&mut ServiceContext<'_>) -> anyhow::Result<Instance> + Send + Sync;
type DestroyFn = dyn Fn(Instance) + Send + Sync;

/// Closure-backed [`Factory`].
pub struct FnFactory {
    create: Box<CreateFn>,
    destroy: Option<Box<DestroyFn>>,
}

impl FnFactory {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(&mut ServiceContext<'_>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            destroy: None,
        }
    }

    /// Attach a teardown hook called with the instance on deactivation.
    pub fn on_destroy<D>(mut self, destroy: D) -> Self
    where
        D: Fn(Instance) + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(destroy));
        self
    }
}

impl Factory for FnFactory {
    fn create(&self, ctx: &mut ServiceContext<'_>) -> anyhow::Result<Instance> {
        (self.create)(ctx)
    }

    fn destroy(&self, instance: Instance) {
        match &self.destroy {
            Some(destroy) => destroy(instance),
            None => drop(instance),
        }
    }
}

/// Factory of services that only exist for ordering purposes.
struct UnitFactory;

impl Factory for UnitFactory {
    fn create(&self, _ctx: &mut ServiceContext<'_>) -> anyhow::Result<Instance> {
        Ok(Arc::new(()))
    }
}

/// Static definition of one manageable service.
#[derive(Clone)]
pub struct Descriptor {
    id: ServiceId,
    dependencies: Vec<ServiceId>,
    extends: Option<ServiceId>,
    factory: Arc<dyn Factory>,
}

impl Descriptor {
    pub fn builder(id: impl Into<ServiceId>) -> DescriptorBuilder {
        DescriptorBuilder {
            id: id.into(),
            dependencies: Vec::new(),
            extends: None,
            factory: None,
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Services this one needs, in declaration order.
    pub fn dependencies(&self) -> &[ServiceId] {
        &self.dependencies
    }

    /// The base service this one augments, if any.
    pub fn extends(&self) -> Option<&ServiceId> {
        self.extends.as_ref()
    }

    pub fn factory(&self) -> &Arc<dyn Factory> {
        &self.factory
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("extends", &self.extends)
            .finish_non_exhaustive()
    }
}

/// Fluent construction of a [`Descriptor`].
pub struct DescriptorBuilder {
    id: ServiceId,
    dependencies: Vec<ServiceId>,
    extends: Option<ServiceId>,
    factory: Option<Arc<dyn Factory>>,
}

impl DescriptorBuilder {
    /// Append dependencies. Repeated ids are kept once, at their first position.
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServiceId>,
    {
        for id in ids {
            let id = id.into();
            if !self.dependencies.contains(&id) {
                self.dependencies.push(id);
            }
        }
        self
    }

    pub fn extends(mut self, base: impl Into<ServiceId>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn factory(mut self, factory: impl Factory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Use a closure returning a typed instance as the factory.
    pub fn factory_fn<T, F>(self, create: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut ServiceContext<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.factory(FnFactory::new(move |ctx| {
            create(ctx).map(|value| Arc::new(value) as Instance)
        }))
    }

    pub fn build(self) -> Descriptor {
        Descriptor {
            id: self.id,
            dependencies: self.dependencies,
            extends: self.extends,
            factory: self.factory.unwrap_or_else(|| Arc::new(UnitFactory)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_declaration_order() {
        let d = Descriptor::builder("h").depends_on(["g", "f"]).build();
        let deps: Vec<&str> = d.dependencies().iter().map(ServiceId::as_str).collect();
        assert_eq!(deps, vec!["g", "f"]);
        assert!(d.extends().is_none());
    }

    #[test]
    fn builder_drops_repeated_dependencies() {
        let d = Descriptor::builder("h")
            .depends_on(["g", "f"])
            .depends_on(["g", "k"])
            .build();
        let deps: Vec<&str> = d.dependencies().iter().map(ServiceId::as_str).collect();
        assert_eq!(deps, vec!["g", "f", "k"]);
    }

    #[test]
    fn builder_records_extension() {
        let d = Descriptor::builder("f-ext").extends("f").build();
        assert_eq!(d.extends().map(ServiceId::as_str), Some("f"));
    }

    #[test]
    fn service_id_borrows_as_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(ServiceId::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(ServiceId::new("a").to_string(), "a");
    }

    #[test]
    fn debug_omits_factory() {
        let d = Descriptor::builder("x").build();
        let out = format!("{d:?}");
        assert!(out.contains("\"x\""));
        assert!(!out.contains("factory"));
    }
}
