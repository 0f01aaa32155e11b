//! Service lifecycle orchestration.
//!
//! The [`Orchestrator`] owns the active set of a [`Registry`]. It starts
//! services together with everything they need, stops them together with
//! everything that needs them, restarts a service and its dependents around
//! a caller-supplied callback, and bounds sessions with activation contexts.
//!
//! ## Invariant
//!
//! Whenever a service is active, all of its transitive dependencies (and the
//! base it extends) are active too. Every operation, including every failure
//! path, leaves this invariant intact:
//!
//! ```text
//! start_up(x)  ── plan ──► activate in plan order ──► ok
//!                               │
//!                               └─ factory error ──► stop own activations, newest first ──► Err
//!
//! shut_down(x) ── stop active dependents, newest first ──► stop x
//!
//! restart(x, f) ── record dependents ──► shut_down(x) ──► f() ──► start x, then dependents
//!                                                          │
//!                                                          └─ Err ──► RestartFailed { dependents }
//! ```
//!
//! ## Locking
//!
//! One mutex guards the whole state for the full duration of each operation.
//! Factories may start further services through their
//! [`ServiceContext`]; those calls run under the same lock and are rolled
//! back with the outer call. Restart callbacks and observers run under the
//! lock too and must not call back into the orchestrator.
//!
//! ## Example
//!
//! ```
//! use servitor::descriptor::Descriptor;
//! use servitor::orchestrator::Orchestrator;
//! use servitor::registry::RegistryBuilder;
//!
//! # fn example() -> anyhow::Result<()> {
//! let registry = RegistryBuilder::new()
//!     .register(Descriptor::builder("f").build())
//!     .register(Descriptor::builder("g").depends_on(["f"]).build())
//!     .register(Descriptor::builder("h").depends_on(["g", "f"]).build())
//!     .build()?;
//! let orchestrator = Orchestrator::new(registry);
//!
//! orchestrator.start_up("h")?;
//! assert!(orchestrator.is_active("g")?);
//!
//! // Stopping g takes h with it but leaves f running.
//! orchestrator.shut_down("g")?;
//! assert!(!orchestrator.is_active("h")?);
//! assert!(orchestrator.is_active("f")?);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod activation;
mod context;
mod lifecycle;
mod slot;
mod state;

pub use activation::ServiceContext;
pub use context::{ContextId, ScopedContext};
pub use slot::SlotState;

use crate::config::{ConfigProvider, NoConfig};
use crate::descriptor::ServiceId;
use crate::errors::LifecycleError;
use crate::observer::{Observer, TracingObserver};
use crate::registry::{Registry, ServiceIndex};
use lifecycle::Core;
use state::State;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

static GLOBAL: OnceLock<Orchestrator> = OnceLock::new();

/// Install the process-wide default orchestrator.
///
/// Only the first call succeeds; later calls hand their orchestrator back.
pub fn install_global(orchestrator: Orchestrator) -> Result<(), Orchestrator> {
    GLOBAL.set(orchestrator)
}

/// The process-wide default orchestrator, if one was installed.
pub fn global() -> Option<&'static Orchestrator> {
    GLOBAL.get()
}

/// Builder for an [`Orchestrator`] with optional settings and observers.
pub struct OrchestratorBuilder {
    registry: Arc<Registry>,
    config: Arc<dyn ConfigProvider>,
    observers: Vec<Arc<dyn Observer>>,
}

impl OrchestratorBuilder {
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        Self {
            registry: registry.into(),
            config: Arc::new(NoConfig),
            observers: vec![Arc::new(TracingObserver)],
        }
    }

    /// Source of the settings passed to factories.
    pub fn with_config(mut self, config: impl ConfigProvider + 'static) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Add an observer after the ones already registered.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace all observers, including the default tracing one.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observer>>) -> Self {
        self.observers = observers;
        self
    }

    pub fn build(self) -> Orchestrator {
        let services = self.registry.len();
        Orchestrator {
            core: Core {
                registry: self.registry,
                config: self.config,
                observers: self.observers,
            },
            state: Mutex::new(State::new(services)),
        }
    }
}

/// Registry of active services and the operations that change it.
pub struct Orchestrator {
    core: Core,
    state: Mutex<State>,
}

impl Orchestrator {
    /// Orchestrator without settings, logging events through `tracing`.
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        OrchestratorBuilder::new(registry).build()
    }

    pub fn builder(registry: impl Into<Arc<Registry>>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(registry)
    }

    pub fn registry(&self) -> &Registry {
        &self.core.registry
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LifecycleError> {
        self.state.lock().map_err(|_| LifecycleError::LockPoisoned)
    }

    fn lookup_all(&self, ids: &[&str]) -> Result<Vec<ServiceIndex>, LifecycleError> {
        ids.iter().map(|id| self.core.lookup(id)).collect()
    }

    // ---- Lifecycle ----

    /// Start a service and everything it needs. No-op if already active.
    ///
    /// If any factory fails, every service this call activated is stopped
    /// again before the error is returned.
    pub fn start_up(&self, id: &str) -> Result<(), LifecycleError> {
        let index = self.core.lookup(id)?;
        let mut state = self.lock()?;
        if state.is_active(index) {
            return Ok(());
        }
        tracing::debug!(service = id, "start_up");
        self.core.start(&mut state, &[index], &mut Vec::new())
    }

    /// Start a configured set of services with one shared plan, so that
    /// extensions of any member are anchored behind their bases.
    pub fn start_all(&self, ids: &[&str]) -> Result<(), LifecycleError> {
        let roots = self.lookup_all(ids)?;
        let mut state = self.lock()?;
        tracing::debug!(services = ?ids, "start_all");
        self.core.start(&mut state, &roots, &mut Vec::new())
    }

    /// Stop a service after everything that depends on it. No-op if inactive.
    ///
    /// Returns the services stopped, in stop order.
    pub fn shut_down(&self, id: &str) -> Result<Vec<ServiceId>, LifecycleError> {
        let index = self.core.lookup(id)?;
        let mut state = self.lock()?;
        let stopped = self.core.shut_down(&mut state, index);
        Ok(self.core.registry.ids(&stopped))
    }

    /// Stop every active service, newest first.
    pub fn shut_down_all(&self) -> Result<Vec<ServiceId>, LifecycleError> {
        let mut state = self.lock()?;
        let mut stopped = Vec::new();
        while let Some(&newest) = state.active_order.last() {
            stopped.extend(self.core.shut_down(&mut state, newest));
        }
        Ok(self.core.registry.ids(&stopped))
    }

    /// Stop a service and its dependents, run `callback`, then start the
    /// service and the former dependents again in their previous order.
    ///
    /// If the callback (or a reactivation) fails nothing more is started and
    /// [`LifecycleError::RestartFailed`] lists the dependents awaiting
    /// restoration. The callback runs under the orchestrator lock.
    pub fn restart<F>(&self, id: &str, callback: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let index = self.core.lookup(id)?;
        let mut state = self.lock()?;
        tracing::debug!(service = id, "restart");
        self.core.restart(&mut state, index, callback)
    }

    /// Start the given services if needed, run `f`, then stop what this call
    /// started, newest first.
    pub fn with_services<T, F>(&self, ids: &[&str], f: F) -> Result<T, LifecycleError>
    where
        F: FnOnce(&Self) -> T,
    {
        let roots = self.lookup_all(ids)?;
        let mut started = Vec::new();
        {
            let mut state = self.lock()?;
            for &root in &roots {
                if let Err(err) = self.core.start(&mut state, &[root], &mut started) {
                    self.core.rollback(&mut state, &mut started, 0);
                    return Err(err);
                }
            }
        }

        let result = f(self);

        let mut state = self.lock()?;
        for &index in started.iter().rev() {
            self.core.shut_down(&mut state, index);
        }
        Ok(result)
    }

    // ---- Activation contexts ----

    /// Open a context; see [`Orchestrator::release`].
    pub fn begin(&self) -> Result<ContextId, LifecycleError> {
        let mut state = self.lock()?;
        Ok(self.core.begin(&mut state))
    }

    /// Release the innermost context, stopping every service that became
    /// active since it was opened. Returns the services stopped.
    pub fn release(&self, context: ContextId) -> Result<Vec<ServiceId>, LifecycleError> {
        let mut state = self.lock()?;
        self.core.release(&mut state, context)
    }

    /// Release a context now, or once the contexts opened inside it are gone.
    pub(crate) fn abandon(&self, context: ContextId) -> Result<Vec<ServiceId>, LifecycleError> {
        let mut state = self.lock()?;
        self.core.abandon(&mut state, context)
    }

    /// Open a context released when the returned guard is closed or dropped.
    pub fn scope(&self) -> Result<ScopedContext<'_>, LifecycleError> {
        let id = self.begin()?;
        Ok(ScopedContext::new(self, id))
    }

    // ---- Queries ----

    pub fn state_of(&self, id: &str) -> Result<SlotState, LifecycleError> {
        let index = self.core.lookup(id)?;
        Ok(self.lock()?.slots[index].state())
    }

    pub fn is_active(&self, id: &str) -> Result<bool, LifecycleError> {
        Ok(self.state_of(id)? == SlotState::Active)
    }

    /// Active services, oldest activation first.
    pub fn active_services(&self) -> Result<Vec<ServiceId>, LifecycleError> {
        let state = self.lock()?;
        Ok(self.core.registry.ids(&state.active_order))
    }

    /// Current instance of a service, if active and of type `T`.
    pub fn instance<T: Any + Send + Sync>(&self, id: &str) -> Result<Option<Arc<T>>, LifecycleError> {
        let index = self.core.lookup(id)?;
        let state = self.lock()?;
        Ok(state.slots[index]
            .instance()
            .cloned()
            .and_then(|instance| instance.downcast::<T>().ok()))
    }

    /// Active services that name `id` as dependency or base. With `None`,
    /// the active services that have neither.
    pub fn direct_dependents(&self, id: Option<&str>) -> Result<Vec<ServiceId>, LifecycleError> {
        let index = id.map(|id| self.core.lookup(id)).transpose()?;
        let state = self.lock()?;
        let found = self.core.direct_dependents(&state, index);
        Ok(self.core.registry.ids(&found))
    }

    /// `id` followed by every active service depending on it, directly or
    /// transitively, in activation order. With `None`, every active service.
    pub fn all_dependents(&self, id: Option<&str>) -> Result<Vec<ServiceId>, LifecycleError> {
        let index = id.map(|id| self.core.lookup(id)).transpose()?;
        let state = self.lock()?;
        let Some(index) = index else {
            return Ok(self.core.registry.ids(&state.active_order));
        };
        let found = self.core.active_dependents(&state, index);
        let mut ordered = vec![index];
        ordered.extend(
            state
                .active_order
                .iter()
                .copied()
                .filter(|&i| i != index && found.contains(&i)),
        );
        Ok(self.core.registry.ids(&ordered))
    }

    /// Members of `ids` that need no other member, directly or transitively.
    pub fn independent(&self, ids: &[&str]) -> Result<BTreeSet<ServiceId>, LifecycleError> {
        let members: BTreeSet<ServiceIndex> = self.lookup_all(ids)?.into_iter().collect();
        let registry = &self.core.registry;
        Ok(members
            .iter()
            .copied()
            .filter(|&m| {
                let needs = registry.requirements(m);
                !members.iter().any(|&other| other != m && needs.contains(&other))
            })
            .map(|m| registry.id(m).clone())
            .collect())
    }

    /// Services `start_up(id)` would activate, in activation order.
    pub fn resolve(&self, id: &str) -> Result<Vec<ServiceId>, LifecycleError> {
        let index = self.core.lookup(id)?;
        let state = self.lock()?;
        let plan = self.core.plan(&state, &[index])?;
        Ok(self.core.registry.ids(&plan))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.core.registry.len())
            .field("observers", &self.core.observers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::registry::RegistryBuilder;

    fn fgh() -> Orchestrator {
        let registry = RegistryBuilder::new()
            .register(Descriptor::builder("f").build())
            .register(Descriptor::builder("g").depends_on(["f"]).build())
            .register(Descriptor::builder("h").depends_on(["g", "f"]).build())
            .build()
            .unwrap();
        Orchestrator::builder(registry).with_observers(vec![]).build()
    }

    #[test]
    fn test_unknown_service_is_reported() {
        let orchestrator = fgh();
        let err = orchestrator.start_up("nope").unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownService { .. }));
        assert!(orchestrator.shut_down("nope").is_err());
        assert!(orchestrator.independent(&["f", "nope"]).is_err());
    }

    #[test]
    fn test_state_of_tracks_activation() {
        let orchestrator = fgh();
        assert_eq!(orchestrator.state_of("g").unwrap(), SlotState::Inactive);
        orchestrator.start_up("g").unwrap();
        assert_eq!(orchestrator.state_of("g").unwrap(), SlotState::Active);
        assert_eq!(orchestrator.state_of("h").unwrap(), SlotState::Inactive);
    }

    #[test]
    fn test_resolve_skips_active_services() {
        let orchestrator = fgh();
        let ids = |v: Vec<ServiceId>| v.into_iter().map(|i| i.to_string()).collect::<Vec<_>>();
        assert_eq!(ids(orchestrator.resolve("h").unwrap()), vec!["f", "g", "h"]);
        orchestrator.start_up("f").unwrap();
        assert_eq!(ids(orchestrator.resolve("h").unwrap()), vec!["g", "h"]);
    }

    #[test]
    fn test_global_installs_once() {
        assert!(install_global(fgh()).is_ok());
        assert!(install_global(fgh()).is_err());
        let installed = global().unwrap();
        assert_eq!(installed.registry().len(), 3);
    }

    #[test]
    fn test_debug_output() {
        let out = format!("{:?}", fgh());
        assert!(out.contains("services: 3"));
    }
}
