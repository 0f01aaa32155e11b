//! Activation contexts.
//!
//! A context is a checkpoint of the active set. Releasing it stops every
//! service that became active after the checkpoint was taken, whether it
//! was requested directly or pulled in as a dependency, and leaves
//! everything that was already running alone. Contexts nest and must be
//! released innermost first.
//!
//! ```text
//! begin() ─► [ctx 1] ─► begin() ─► [ctx 1, ctx 2] ─► release(2) ─► [ctx 1] ─► release(1) ─► []
//! ```

use super::Orchestrator;
use crate::descriptor::ServiceId;
use crate::errors::LifecycleError;
use crate::registry::ServiceIndex;
use std::collections::HashSet;
use std::fmt;

/// Handle of an open activation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct Checkpoint {
    pub id: ContextId,
    /// Services active when the context was opened.
    pub snapshot: HashSet<ServiceIndex>,
    /// Guard gone while inner contexts were still open; released as soon
    /// as it becomes innermost.
    pub abandoned: bool,
}

/// Context that is released when closed or dropped.
///
/// Dropping cannot report errors; use [`ScopedContext::close`] to observe them.
/// A guard dropped while inner contexts are still open is released together
/// with the last of them.
#[must_use = "dropping the scope immediately releases it"]
pub struct ScopedContext<'o> {
    orchestrator: &'o Orchestrator,
    id: ContextId,
    released: bool,
}

impl<'o> ScopedContext<'o> {
    pub(crate) fn new(orchestrator: &'o Orchestrator, id: ContextId) -> Self {
        Self {
            orchestrator,
            id,
            released: false,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Release the context, returning the services it stopped.
    ///
    /// Fails with [`LifecycleError::ScopeOutOfOrder`] while inner contexts
    /// are open; the context is then released with the last of them.
    pub fn close(mut self) -> Result<Vec<ServiceId>, LifecycleError> {
        self.released = true;
        let result = self.orchestrator.release(self.id);
        if let Err(LifecycleError::ScopeOutOfOrder { .. }) = result {
            self.orchestrator.abandon(self.id)?;
        }
        result
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.orchestrator.abandon(self.id) {
            tracing::error!(context = %self.id, error = %e, "Failed to release activation context");
        }
    }
}
