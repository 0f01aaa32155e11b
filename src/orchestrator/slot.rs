use crate::descriptor::Instance;

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Inactive,
    Active,
}

/// Per-descriptor cell holding the live implementation while active.
#[derive(Default)]
pub(crate) struct InstanceSlot {
    state: SlotState,
    instance: Option<Instance>,
}

impl InstanceSlot {
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SlotState::Active
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn activate(&mut self, instance: Instance) {
        self.state = SlotState::Active;
        self.instance = Some(instance);
    }

    /// Reset to inactive, handing back the instance for teardown.
    pub fn deactivate(&mut self) -> Option<Instance> {
        self.state = SlotState::Inactive;
        self.instance.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn instance_present_iff_active() {
        let mut slot = InstanceSlot::default();
        assert_eq!(slot.state(), SlotState::Inactive);
        assert!(slot.instance().is_none());

        slot.activate(Arc::new(7_u32));
        assert!(slot.is_active());
        assert!(slot.instance().is_some());

        let instance = slot.deactivate().unwrap();
        assert_eq!(instance.downcast_ref::<u32>(), Some(&7));
        assert!(!slot.is_active());
        assert!(slot.instance().is_none());
        assert!(slot.deactivate().is_none());
    }
}
