// ── DeviceGroup ──
//
// Devices bucketed by their non-empty `group` label after integration.

use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::model::Resource;

#[derive(Debug, Clone)]
pub struct DeviceGroup {
    label: String,
    members: Vec<Arc<Resource>>,
}

impl DeviceGroup {
    pub fn new(label: impl Into<String>, members: Vec<Arc<Resource>>) -> Result<Self, CoreError> {
        let label = label.into();
        if members.is_empty() {
            return Err(CoreError::semantic(format!(
                "Device group '{label}' must have at least one member."
            )));
        }
        Ok(Self { label, members })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn members(&self) -> &[Arc<Resource>] {
        &self.members
    }

    /// The coordinator that created the first member.
    pub fn coordinator(&self) -> Result<Arc<dyn Coordinator>, CoreError> {
        self.members
            .first()
            .ok_or_else(|| CoreError::semantic(format!("Device group '{}' is empty.", self.label)))?
            .coordinator()
    }

    /// Find a member by identity, declared name, or host.
    pub fn find_member(&self, key: &str) -> Option<Arc<Resource>> {
        self.members
            .iter()
            .find(|m| m.identity() == key || m.name() == key || m.host() == Some(key))
            .cloned()
    }
}
