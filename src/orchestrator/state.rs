//! Mutable orchestrator state, only ever touched under the orchestrator lock.

use super::context::{Checkpoint, ContextId};
use super::slot::InstanceSlot;
use crate::registry::ServiceIndex;

pub(crate) struct State {
    /// One slot per registry entry.
    pub slots: Vec<InstanceSlot>,
    /// Active services, oldest activation first.
    pub active_order: Vec<ServiceIndex>,
    /// Services whose factory is currently running, outermost first.
    pub constructing: Vec<ServiceIndex>,
    /// Open activation contexts, innermost last.
    pub contexts: Vec<Checkpoint>,
    next_context: u64,
}

impl State {
    pub fn new(services: usize) -> Self {
        Self {
            slots: (0..services).map(|_| InstanceSlot::default()).collect(),
            active_order: Vec::new(),
            constructing: Vec::new(),
            contexts: Vec::new(),
            next_context: 1,
        }
    }

    pub fn is_active(&self, index: ServiceIndex) -> bool {
        self.slots.get(index).is_some_and(InstanceSlot::is_active)
    }

    pub fn issue_context(&mut self) -> ContextId {
        let id = ContextId::from_raw(self.next_context);
        self.next_context += 1;
        id
    }

    pub fn was_issued(&self, id: ContextId) -> bool {
        id.raw() > 0 && id.raw() < self.next_context
    }
}
