//! Lifecycle events and their sinks.
//!
//! The orchestrator reports every state transition as a [`LifecycleEvent`]
//! to each registered [`Observer`]. Observers are called synchronously while
//! the orchestrator lock is held, in registration order; they must not call
//! back into the orchestrator.
//!
//! Two sinks ship with the crate:
//! - [`TracingObserver`] writes events through `tracing`
//! - [`EventLog`] records events in memory for later inspection
//!
//! Each event has a process-wide sequence number (`seq`) that increases
//! monotonically.

use crate::descriptor::ServiceId;
use crate::orchestrator::ContextId;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A fresh instance was created and the service is active.
    Activated { service: ServiceId },
    /// The instance was destroyed and the service is inactive.
    Deactivated { service: ServiceId },
    /// A factory returned an error.
    ActivationFailed { service: ServiceId, error: String },
    /// Activations of a failed call were undone, newest first.
    RolledBack { services: Vec<ServiceId> },
    /// Resolution hit a dependency cycle; nothing was activated.
    CycleDetected { path: Vec<ServiceId> },
    /// A restart brought the service and its dependents back.
    Restarted {
        service: ServiceId,
        dependents: Vec<ServiceId>,
    },
    /// A restart stopped part way; `dependents` await manual restoration.
    RestartFailed {
        service: ServiceId,
        dependents: Vec<ServiceId>,
        error: String,
    },
    ContextOpened { context: ContextId },
    ContextReleased {
        context: ContextId,
        deactivated: Vec<ServiceId>,
    },
}

/// A discrete lifecycle event.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, Ordering::Relaxed),
            at: Utc::now(),
            kind,
        }
    }
}

/// Receiver of lifecycle events.
pub trait Observer: Send + Sync + 'static {
    fn on_event(&self, event: &LifecycleEvent);

    /// Name used in diagnostics. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Writes lifecycle events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        let seq = event.seq;
        match &event.kind {
            EventKind::Activated { service } => {
                tracing::info!(seq, %service, "service activated");
            }
            EventKind::Deactivated { service } => {
                tracing::info!(seq, %service, "service deactivated");
            }
            EventKind::ActivationFailed { service, error } => {
                tracing::error!(seq, %service, %error, "service activation failed");
            }
            EventKind::RolledBack { services } => {
                tracing::warn!(seq, ?services, "activations rolled back");
            }
            EventKind::CycleDetected { path } => {
                tracing::error!(seq, ?path, "dependency cycle detected");
            }
            EventKind::Restarted {
                service,
                dependents,
            } => {
                tracing::info!(seq, %service, ?dependents, "service restarted");
            }
            EventKind::RestartFailed {
                service,
                dependents,
                error,
            } => {
                tracing::error!(
                    seq,
                    %service,
                    ?dependents,
                    %error,
                    "service restart failed, dependents pending restoration"
                );
            }
            EventKind::ContextOpened { context } => {
                tracing::debug!(seq, %context, "activation context opened");
            }
            EventKind::ContextReleased {
                context,
                deactivated,
            } => {
                tracing::debug!(seq, %context, ?deactivated, "activation context released");
            }
        }
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory event recorder.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Kinds of the recorded events, oldest first.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl Observer for EventLog {
    fn on_event(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn name(&self) -> &'static str {
        "event-log"
    }
}
