//! Dependency-aware service lifecycle orchestration.
//!
//! Services are declared as [`Descriptor`]s, validated into a [`Registry`],
//! and brought up and down by an [`Orchestrator`] that keeps every active
//! service's dependencies active.

pub mod config;
pub mod descriptor;
pub mod errors;
pub mod observer;
pub mod orchestrator;
pub mod registry;
pub mod resolver;

pub use config::{ConfigProvider, Manifest, NoConfig, StaticConfig};
pub use descriptor::{Descriptor, Factory, FnFactory, Instance, ServiceId};
pub use errors::{LifecycleError, RegistryError};
pub use observer::{EventKind, EventLog, LifecycleEvent, Observer, TracingObserver};
pub use orchestrator::{ContextId, Orchestrator, OrchestratorBuilder, ServiceContext};
pub use registry::{Registry, RegistryBuilder};
