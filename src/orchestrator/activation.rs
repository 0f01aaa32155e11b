//! Factory invocation and the context handed to factories.

use super::lifecycle::Core;
use super::state::State;
use crate::descriptor::ServiceId;
use crate::errors::LifecycleError;
use crate::observer::EventKind;
use crate::registry::ServiceIndex;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::sync::Arc;

/// View of the orchestrator given to a [`Factory`](crate::descriptor::Factory)
/// while it builds an instance.
///
/// Everything done through this context happens inside the activation call
/// that triggered the construction: services started here are rolled back
/// together with it if a later step of that call fails.
pub struct ServiceContext<'a> {
    core: &'a Core,
    state: &'a mut State,
    own: &'a mut Vec<ServiceIndex>,
    service: ServiceIndex,
    settings: Option<toml::Value>,
}

impl ServiceContext<'_> {
    /// Id of the service under construction.
    pub fn id(&self) -> &ServiceId {
        self.core.registry.id(self.service)
    }

    /// Settings supplied by the configuration provider, if any.
    pub fn settings(&self) -> Option<&toml::Value> {
        self.settings.as_ref()
    }

    /// Deserialize the settings into `T`.
    pub fn settings_as<T: DeserializeOwned>(&self) -> anyhow::Result<Option<T>> {
        self.settings
            .clone()
            .map(|value| value.try_into::<T>())
            .transpose()
            .with_context(|| format!("Invalid settings for service '{}'", self.id()))
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.core
            .registry
            .index_of(id)
            .is_some_and(|index| self.state.is_active(index))
    }

    /// Instance of an active service, if it has type `T`.
    pub fn dependency<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        let index = self.core.registry.index_of(id)?;
        let instance = self.state.slots[index].instance()?.clone();
        instance.downcast::<T>().ok()
    }

    /// Start another service as part of the current activation.
    ///
    /// If this fails, whatever it started itself has already been rolled
    /// back when the error is returned.
    pub fn start_up(&mut self, id: &str) -> Result<(), LifecycleError> {
        let index = self.core.lookup(id)?;
        if self.state.is_active(index) {
            return Ok(());
        }
        tracing::debug!(service = id, requested_by = %self.id(), "nested start_up");
        self.core.start(self.state, &[index], self.own)
    }
}

impl Core {
    /// Build one service and mark it active.
    pub(super) fn activate(
        &self,
        state: &mut State,
        index: ServiceIndex,
        own: &mut Vec<ServiceIndex>,
    ) -> Result<(), LifecycleError> {
        let Some(descriptor) = self.registry.descriptor(index) else {
            return Err(LifecycleError::UnknownService {
                id: ServiceId::new(format!("#{index}")),
            });
        };
        let service = descriptor.id().clone();
        let settings = self.config.settings(&service);

        state.constructing.push(index);
        let created = {
            let mut ctx = ServiceContext {
                core: self,
                state: &mut *state,
                own: &mut *own,
                service: index,
                settings,
            };
            descriptor.factory().create(&mut ctx)
        };
        state.constructing.pop();

        match created {
            Ok(instance) => {
                state.slots[index].activate(instance);
                state.active_order.push(index);
                own.push(index);
                self.emit(EventKind::Activated { service });
                Ok(())
            }
            Err(source) => {
                self.emit(EventKind::ActivationFailed {
                    service: service.clone(),
                    error: format!("{source:#}"),
                });
                Err(LifecycleError::Activation { service, source })
            }
        }
    }
}
