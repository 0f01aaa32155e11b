//! Typed error hierarchy for the service orchestrator.
//!
//! Two top-level enums cover the two phases of a service's life:
//! - `RegistryError`: descriptor table validation at wiring time
//! - `LifecycleError`: resolution, activation, restart and scope failures

use crate::descriptor::ServiceId;
use thiserror::Error;

/// Errors raised while building a [`Registry`](crate::registry::Registry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate service id: {id}")]
    DuplicateService { id: ServiceId },

    #[error("Unknown dependency '{dependency}' in service '{service}': no service with that id exists")]
    UnknownDependency {
        service: ServiceId,
        dependency: ServiceId,
    },

    #[error("Service '{service}' extends unknown service '{base}'")]
    UnknownExtends { service: ServiceId, base: ServiceId },

    #[error("Service '{service}' cannot extend itself")]
    SelfExtension { service: ServiceId },
}

/// Errors from orchestrator operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Unknown service: {id}")]
    UnknownService { id: ServiceId },

    #[error("Cyclic service dependency: {}", format_cycle(.path))]
    DependencyCycle { path: Vec<ServiceId> },

    #[error("Unable to start service '{service}': {source}")]
    Activation {
        service: ServiceId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unable to restart service '{service}' ({} dependents pending restoration): {source}", .dependents.len())]
    RestartFailed {
        service: ServiceId,
        /// Dependents that were stopped for the restart, in their former activation order.
        dependents: Vec<ServiceId>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Service '{id}' is not active")]
    NotActive { id: ServiceId },

    #[error("Activation context {context} is not the innermost open context")]
    ScopeOutOfOrder { context: u64 },

    #[error("Activation context {context} was already released")]
    ScopeReleased { context: u64 },

    #[error("Unknown activation context {context}")]
    UnknownScope { context: u64 },

    #[error("Orchestrator lock poisoned")]
    LockPoisoned,
}

impl LifecycleError {
    /// Services that must be started again to undo a failed restart: the
    /// restarted service followed by its recorded dependents.
    ///
    /// Empty for every other variant.
    pub fn pending_restoration(&self) -> Vec<ServiceId> {
        match self {
            LifecycleError::RestartFailed {
                service,
                dependents,
                ..
            } => std::iter::once(service.clone())
                .chain(dependents.iter().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Render a cycle path in "depends on" direction: `d -> c -> d`.
fn format_cycle(path: &[ServiceId]) -> String {
    path.iter()
        .map(ServiceId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ServiceId {
        ServiceId::from(s)
    }

    #[test]
    fn registry_error_unknown_dependency_names_both_sides() {
        let err = RegistryError::UnknownDependency {
            service: id("search"),
            dependency: id("index"),
        };
        let msg = err.to_string();
        assert!(msg.contains("search"));
        assert!(msg.contains("index"));
    }

    #[test]
    fn cycle_error_renders_path() {
        let err = LifecycleError::DependencyCycle {
            path: vec![id("d"), id("c"), id("d")],
        };
        assert_eq!(err.to_string(), "Cyclic service dependency: d -> c -> d");
    }

    #[test]
    fn activation_error_keeps_source() {
        let err = LifecycleError::Activation {
            service: id("storage"),
            source: anyhow::anyhow!("disk full"),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "disk full");
        assert!(err.to_string().contains("storage"));
    }

    #[test]
    fn restart_failed_lists_pending_restoration() {
        let err = LifecycleError::RestartFailed {
            service: id("f"),
            dependents: vec![id("g"), id("h")],
            source: anyhow::anyhow!("callback failed"),
        };
        assert_eq!(err.pending_restoration(), vec![id("f"), id("g"), id("h")]);
        assert!(err.to_string().contains("2 dependents"));
    }

    #[test]
    fn pending_restoration_empty_for_other_variants() {
        let err = LifecycleError::NotActive { id: id("f") };
        assert!(err.pending_restoration().is_empty());
        assert!(LifecycleError::LockPoisoned.pending_restoration().is_empty());
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        assert_std_error(&RegistryError::SelfExtension { service: id("x") });
        assert_std_error(&LifecycleError::ScopeOutOfOrder { context: 1 });
    }
}
