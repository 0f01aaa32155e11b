//! Lock-held lifecycle operations.
//!
//! Every function here takes the already locked [`State`]; the public
//! [`Orchestrator`](super::Orchestrator) methods acquire the lock once and
//! delegate. Nested factory calls re-enter through the same functions with
//! the same state and rollback list.

use super::context::{Checkpoint, ContextId};
use super::state::State;
use crate::config::ConfigProvider;
use crate::descriptor::ServiceId;
use crate::errors::LifecycleError;
use crate::observer::{EventKind, LifecycleEvent, Observer};
use crate::registry::{Registry, ServiceIndex};
use crate::resolver::Resolver;
use std::collections::HashSet;
use std::sync::Arc;

/// Immutable wiring shared by all operations.
pub(crate) struct Core {
    pub registry: Arc<Registry>,
    pub config: Arc<dyn ConfigProvider>,
    pub observers: Vec<Arc<dyn Observer>>,
}

impl Core {
    pub fn lookup(&self, id: &str) -> Result<ServiceIndex, LifecycleError> {
        self.registry
            .index_of(id)
            .ok_or_else(|| LifecycleError::UnknownService { id: id.into() })
    }

    pub fn emit(&self, kind: EventKind) {
        let event = LifecycleEvent::new(kind);
        for observer in &self.observers {
            tracing::trace!(observer = observer.name(), seq = event.seq, "dispatching event");
            observer.on_event(&event);
        }
    }

    /// Activate `roots` and everything they need.
    ///
    /// Newly activated services are appended to `own`. On failure everything
    /// appended by this call is deactivated again, newest first, before the
    /// error is returned.
    pub fn start(
        &self,
        state: &mut State,
        roots: &[ServiceIndex],
        own: &mut Vec<ServiceIndex>,
    ) -> Result<(), LifecycleError> {
        let plan = self.plan(state, roots)?;

        let mark = own.len();
        for index in plan {
            if state.is_active(index) {
                // Started by a nested call of an earlier factory.
                continue;
            }
            if let Err(err) = self.activate(state, index, own) {
                self.rollback(state, own, mark);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Services to activate for `roots`, given what is active already.
    pub fn plan(
        &self,
        state: &State,
        roots: &[ServiceIndex],
    ) -> Result<Vec<ServiceIndex>, LifecycleError> {
        let plan = Resolver::new(&self.registry)
            .resolve_with(roots, |index| state.is_active(index))
            .inspect_err(|err| {
                if let LifecycleError::DependencyCycle { path } = err {
                    self.emit(EventKind::CycleDetected { path: path.clone() });
                }
            })?;

        // A service whose factory is still running cannot be needed by
        // something that factory requests.
        if let Some(pos) = state
            .constructing
            .iter()
            .position(|index| plan.contains(index))
        {
            let mut cycle = state.constructing[pos..].to_vec();
            for &root in roots {
                if cycle.last() != Some(&root) {
                    cycle.push(root);
                }
            }
            cycle.push(state.constructing[pos]);
            let path = self.registry.ids(&cycle);
            self.emit(EventKind::CycleDetected { path: path.clone() });
            return Err(LifecycleError::DependencyCycle { path });
        }

        Ok(plan)
    }

    /// Undo the activations recorded in `own` after `mark`.
    pub fn rollback(&self, state: &mut State, own: &mut Vec<ServiceIndex>, mark: usize) {
        if own.len() <= mark {
            return;
        }
        let undo: Vec<ServiceIndex> = own.drain(mark..).collect();
        let mut stopped = Vec::with_capacity(undo.len());
        for &index in undo.iter().rev() {
            stopped.extend(self.shut_down(state, index));
        }
        self.emit(EventKind::RolledBack {
            services: self.registry.ids(&stopped),
        });
    }

    /// Deactivate `index` after all of its active dependents.
    ///
    /// Returns the services stopped, in the order they were stopped.
    pub fn shut_down(&self, state: &mut State, index: ServiceIndex) -> Vec<ServiceIndex> {
        if !state.is_active(index) {
            return Vec::new();
        }
        let doomed = self.active_dependents(state, index);
        let order: Vec<ServiceIndex> = state
            .active_order
            .iter()
            .rev()
            .copied()
            .filter(|i| doomed.contains(i))
            .collect();
        for &i in &order {
            self.deactivate(state, i);
        }
        order
    }

    fn deactivate(&self, state: &mut State, index: ServiceIndex) {
        let instance = state.slots[index].deactivate();
        state.active_order.retain(|&i| i != index);
        if let (Some(instance), Some(descriptor)) = (instance, self.registry.descriptor(index)) {
            descriptor.factory().destroy(instance);
        }
        self.emit(EventKind::Deactivated {
            service: self.registry.id(index).clone(),
        });
    }

    /// `index` plus every active service that transitively depends on it.
    pub fn active_dependents(&self, state: &State, index: ServiceIndex) -> HashSet<ServiceIndex> {
        let mut found = HashSet::from([index]);
        let mut stack = vec![index];
        while let Some(next) = stack.pop() {
            for &dependent in self.registry.dependents(next) {
                if state.is_active(dependent) && found.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
        found
    }

    /// Active services naming `index` as dependency or base, or, for `None`,
    /// active services with neither. Activation order.
    pub fn direct_dependents(&self, state: &State, index: Option<ServiceIndex>) -> Vec<ServiceIndex> {
        state
            .active_order
            .iter()
            .copied()
            .filter(|&candidate| match index {
                Some(index) => self.registry.dependents(index).contains(&candidate),
                None => self.registry.is_root(candidate),
            })
            .collect()
    }

    pub fn restart<F>(
        &self,
        state: &mut State,
        index: ServiceIndex,
        callback: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        let service = self.registry.id(index).clone();
        if !state.is_active(index) {
            return Err(LifecycleError::NotActive { id: service });
        }

        let affected = self.active_dependents(state, index);
        let dependents: Vec<ServiceIndex> = state
            .active_order
            .iter()
            .copied()
            .filter(|&i| i != index && affected.contains(&i))
            .collect();

        self.shut_down(state, index);

        let restored = callback().and_then(|()| {
            self.start(state, &[index], &mut Vec::new())?;
            for &dependent in &dependents {
                self.start(state, &[dependent], &mut Vec::new())?;
            }
            Ok(())
        });

        let dependents = self.registry.ids(&dependents);
        match restored {
            Ok(()) => {
                self.emit(EventKind::Restarted {
                    service,
                    dependents,
                });
                Ok(())
            }
            Err(source) => {
                self.emit(EventKind::RestartFailed {
                    service: service.clone(),
                    dependents: dependents.clone(),
                    error: format!("{source:#}"),
                });
                Err(LifecycleError::RestartFailed {
                    service,
                    dependents,
                    source,
                })
            }
        }
    }

    pub fn begin(&self, state: &mut State) -> ContextId {
        let id = state.issue_context();
        let snapshot = state.active_order.iter().copied().collect();
        state.contexts.push(Checkpoint {
            id,
            snapshot,
            abandoned: false,
        });
        self.emit(EventKind::ContextOpened { context: id });
        id
    }

    /// Close the innermost context, stopping what started since it opened.
    ///
    /// Abandoned contexts uncovered by this are released right after it.
    pub fn release(&self, state: &mut State, id: ContextId) -> Result<Vec<ServiceId>, LifecycleError> {
        if state.contexts.last().map(|c| c.id) != Some(id) {
            return Err(self.misplaced(state, id));
        }
        let mut stopped = self.release_innermost(state);
        while state.contexts.last().is_some_and(|c| c.abandoned) {
            stopped.extend(self.release_innermost(state));
        }
        Ok(stopped)
    }

    /// Release `id` now if it is innermost, otherwise as soon as it becomes so.
    pub fn abandon(&self, state: &mut State, id: ContextId) -> Result<Vec<ServiceId>, LifecycleError> {
        match state.contexts.iter_mut().rev().skip(1).find(|c| c.id == id) {
            Some(checkpoint) => {
                tracing::debug!(context = %id, "activation context abandoned, release deferred");
                checkpoint.abandoned = true;
                Ok(Vec::new())
            }
            None => self.release(state, id),
        }
    }

    fn misplaced(&self, state: &State, id: ContextId) -> LifecycleError {
        let context = id.raw();
        if state.contexts.iter().any(|c| c.id == id) {
            LifecycleError::ScopeOutOfOrder { context }
        } else if state.was_issued(id) {
            LifecycleError::ScopeReleased { context }
        } else {
            LifecycleError::UnknownScope { context }
        }
    }

    fn release_innermost(&self, state: &mut State) -> Vec<ServiceId> {
        let Some(checkpoint) = state.contexts.pop() else {
            return Vec::new();
        };

        let started: Vec<ServiceIndex> = state
            .active_order
            .iter()
            .copied()
            .filter(|i| !checkpoint.snapshot.contains(i))
            .collect();
        let mut stopped = Vec::with_capacity(started.len());
        for &index in started.iter().rev() {
            stopped.extend(self.shut_down(state, index));
        }

        let deactivated = self.registry.ids(&stopped);
        self.emit(EventKind::ContextReleased {
            context: checkpoint.id,
            deactivated: deactivated.clone(),
        });
        deactivated
    }
}
