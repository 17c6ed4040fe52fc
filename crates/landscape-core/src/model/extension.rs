// ── Protocol extensions ──
//
// A capability (ssh, power, serial, ...) attached to a resource. The
// extension never owns its resource or its coordinator; both are weak.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::command::CommandAgent;
use crate::coordinator::Coordinator;
use crate::error::CoreError;
use crate::model::Resource;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Display,
    EnumString,
)]
pub enum ExtensionKind {
    #[strum(serialize = "extension/ssh")]
    #[serde(rename = "extension/ssh")]
    Ssh,
    #[strum(serialize = "extension/power")]
    #[serde(rename = "extension/power")]
    Power,
    #[strum(serialize = "extension/serial")]
    #[serde(rename = "extension/serial")]
    Serial,
    #[strum(serialize = "extension/upnp")]
    #[serde(rename = "extension/upnp")]
    Upnp,
    #[strum(serialize = "extension/rest")]
    #[serde(rename = "extension/rest")]
    Rest,
}

/// Predicate used by the typed capability registry.
pub type CapabilityPredicate = Arc<dyn Fn(&ProtocolExtension, &[Value]) -> bool + Send + Sync>;

/// Status verification callback for one extension kind.
pub type StatusCheck = Arc<dyn Fn(&ProtocolExtension) -> bool + Send + Sync>;

/// A named capability: which extension answers it and how.
#[derive(Clone)]
pub struct Capability {
    pub kind: ExtensionKind,
    pub predicate: CapabilityPredicate,
}

pub struct ProtocolExtension {
    kind: ExtensionKind,
    extension_id: String,
    location: String,
    config: BTreeMap<String, Value>,
    owner: Weak<Resource>,
    coordinator: Weak<dyn Coordinator>,
    agent: Option<Arc<dyn CommandAgent>>,
}

impl ProtocolExtension {
    pub fn new(
        kind: ExtensionKind,
        owner: &Arc<Resource>,
        coordinator: Weak<dyn Coordinator>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            extension_id: Uuid::new_v4().to_string(),
            location: location.into(),
            config: BTreeMap::new(),
            owner: Arc::downgrade(owner),
            coordinator,
            agent: None,
        }
    }

    pub fn with_config(mut self, config: BTreeMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn CommandAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }

    pub fn agent(&self) -> Option<&Arc<dyn CommandAgent>> {
        self.agent.as_ref()
    }

    pub fn owner(&self) -> Result<Arc<Resource>, CoreError> {
        self.owner
            .upgrade()
            .ok_or(CoreError::Detached { handle: "resource" })
    }

    pub fn coordinator(&self) -> Result<Arc<dyn Coordinator>, CoreError> {
        self.coordinator
            .upgrade()
            .ok_or(CoreError::Detached {
                handle: "coordinator",
            })
    }
}

impl fmt::Debug for ProtocolExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolExtension")
            .field("kind", &self.kind)
            .field("extension_id", &self.extension_id)
            .field("location", &self.location)
            .field("config", &self.config)
            .field("has_agent", &self.agent.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kinds_use_extension_paths() {
        assert_eq!(ExtensionKind::Ssh.to_string(), "extension/ssh");
        assert_eq!(
            ExtensionKind::from_str("extension/power").unwrap(),
            ExtensionKind::Power
        );
    }
}
