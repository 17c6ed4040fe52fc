// ── Coordinator couplings ──
//
// A coupling ties one declaration key `<root>:<section>:<leaf>:<class>` to
// the coordinator that materializes it. Couplings are registered on the
// landscape builder or listed in settings.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::command::CommandAspects;
use crate::landscape::Landscape;

use super::{Coordinator, DeviceCoordinator, InterfaceCoordinator, ServiceCoordinator};

/// What kind of declaration a coupling claims.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CoordinatorRole {
    Device,
    Service,
    Power,
    Serial,
}

impl CoordinatorRole {
    /// Document root holding declarations of this role.
    pub fn root(self) -> &'static str {
        match self {
            Self::Service => "infrastructure",
            _ => "apod",
        }
    }

    /// Field naming the declaration's type.
    pub fn leaf(self) -> &'static str {
        match self {
            Self::Device => "deviceType",
            Self::Service => "serviceType",
            Self::Power => "powerType",
            Self::Serial => "serialType",
        }
    }

    /// Section used when a coupling does not name one.
    pub fn default_section(self) -> &'static str {
        match self {
            Self::Device => "nodes",
            Self::Service => "services",
            Self::Power => "power",
            Self::Serial => "serial",
        }
    }
}

pub fn integration_key(role: CoordinatorRole, section: &str, class: &str) -> String {
    format!("{}:{section}:{}:{class}", role.root(), role.leaf())
}

// ── Validation report ────────────────────────────────────────────────

/// Path-addressed findings gathered while validating declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<(String, String)>,
    pub warnings: Vec<(String, String)>,
}

impl ValidationReport {
    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push((path.into(), message.into()));
    }

    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push((path.into(), message.into()));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Landscape validation failures:")?;
        for (path, message) in &self.errors {
            writeln!(f, "    {path}: {message}")?;
        }
        Ok(())
    }
}

// ── Coupling trait ───────────────────────────────────────────────────

pub trait CoordinatorCoupling: Send + Sync {
    fn role(&self) -> CoordinatorRole;

    fn integration_section(&self) -> &str;

    fn integration_class(&self) -> &str;

    fn integration_root(&self) -> &str {
        self.role().root()
    }

    fn integration_leaf(&self) -> &str {
        self.role().leaf()
    }

    fn integration_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.integration_root(),
            self.integration_section(),
            self.integration_leaf(),
            self.integration_class()
        )
    }

    /// Item-level checks for declarations this coupling claims.
    fn validate_item(&self, _path: &str, _item: &Value, _report: &mut ValidationReport) {}

    /// Whether integration should depend on this coupling, given how many
    /// items the configuration declares for its key.
    fn attach_to_environment(&self, declared_items: usize) -> bool {
        declared_items > 0
    }

    fn create_coordinator(&self, landscape: &Landscape) -> Arc<dyn Coordinator>;
}

// ── Built-in couplings ───────────────────────────────────────────────

/// Serializable coupling description, as listed in settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingSpec {
    pub role: CoordinatorRole,

    #[serde(default)]
    pub section: Option<String>,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub must_include_ssh: bool,
}

impl CouplingSpec {
    pub fn new(role: CoordinatorRole, type_name: impl Into<String>) -> Self {
        Self {
            role,
            section: None,
            type_name: type_name.into(),
            must_include_ssh: false,
        }
    }

    /// Linux nodes under `apod.nodes`.
    pub fn defaults() -> Vec<Self> {
        vec![Self::new(CoordinatorRole::Device, "linux")]
    }

    pub fn into_coupling(self) -> Arc<dyn CoordinatorCoupling> {
        let section = self
            .section
            .unwrap_or_else(|| self.role.default_section().to_owned());
        Arc::new(StandardCoupling {
            role: self.role,
            section,
            class: self.type_name,
            must_include_ssh: self.must_include_ssh,
        })
    }
}

/// Coupling backed by one of the built-in coordinators.
#[derive(Debug, Clone)]
pub struct StandardCoupling {
    role: CoordinatorRole,
    section: String,
    class: String,
    must_include_ssh: bool,
}

impl StandardCoupling {
    pub fn device(section: impl Into<String>, class: impl Into<String>, must_include_ssh: bool) -> Self {
        Self {
            role: CoordinatorRole::Device,
            section: section.into(),
            class: class.into(),
            must_include_ssh,
        }
    }

    pub fn service(class: impl Into<String>) -> Self {
        Self {
            role: CoordinatorRole::Service,
            section: CoordinatorRole::Service.default_section().into(),
            class: class.into(),
            must_include_ssh: false,
        }
    }

    pub fn power(class: impl Into<String>) -> Self {
        Self::interface(CoordinatorRole::Power, class)
    }

    pub fn serial(class: impl Into<String>) -> Self {
        Self::interface(CoordinatorRole::Serial, class)
    }

    fn interface(role: CoordinatorRole, class: impl Into<String>) -> Self {
        Self {
            role,
            section: role.default_section().into(),
            class: class.into(),
            must_include_ssh: false,
        }
    }
}

impl CoordinatorCoupling for StandardCoupling {
    fn role(&self) -> CoordinatorRole {
        self.role
    }

    fn integration_section(&self) -> &str {
        &self.section
    }

    fn integration_class(&self) -> &str {
        &self.class
    }

    fn validate_item(&self, path: &str, item: &Value, report: &mut ValidationReport) {
        match self.role {
            CoordinatorRole::Device | CoordinatorRole::Service => {
                if item.get("host").and_then(Value::as_str).is_none() {
                    report.error(path, "missing 'host'");
                }
                let has_credentials = item
                    .get("credentials")
                    .and_then(Value::as_array)
                    .is_some_and(|c| !c.is_empty());
                if !has_credentials {
                    if self.must_include_ssh {
                        report.error(path, "no credentials declared, an 'ssh' credential is required");
                    } else {
                        report.warning(path, "no credentials declared");
                    }
                }
            }
            CoordinatorRole::Power | CoordinatorRole::Serial => {
                if item.get("name").and_then(Value::as_str).is_none() {
                    report.error(path, "missing 'name'");
                }
            }
        }
    }

    fn create_coordinator(&self, landscape: &Landscape) -> Arc<dyn Coordinator> {
        let aspects = CommandAspects::from(&landscape.settings().command);
        let weak = landscape.downgrade();
        match self.role {
            CoordinatorRole::Device => DeviceCoordinator::new(weak, self.must_include_ssh, aspects),
            CoordinatorRole::Service => ServiceCoordinator::new(weak, self.must_include_ssh, aspects),
            CoordinatorRole::Power => InterfaceCoordinator::power(weak, aspects),
            CoordinatorRole::Serial => InterfaceCoordinator::serial(weak, aspects),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_follow_root_section_leaf_class() {
        assert_eq!(
            StandardCoupling::device("nodes", "linux", false).integration_key(),
            "apod:nodes:deviceType:linux"
        );
        assert_eq!(
            StandardCoupling::service("dhcp").integration_key(),
            "infrastructure:services:serviceType:dhcp"
        );
        assert_eq!(
            StandardCoupling::power("dlipower").integration_key(),
            integration_key(CoordinatorRole::Power, "power", "dlipower")
        );
    }

    #[test]
    fn spec_defaults_section_by_role() {
        let spec: CouplingSpec =
            serde_json::from_value(json!({ "role": "serial", "type": "digi" })).unwrap();
        assert_eq!(
            spec.into_coupling().integration_key(),
            "apod:serial:serialType:digi"
        );
    }

    #[test]
    fn device_validation_depends_on_ssh_requirement() {
        let item = json!({ "deviceType": "linux", "host": "node1" });

        let mut lenient = ValidationReport::default();
        StandardCoupling::device("nodes", "linux", false).validate_item("apod.nodes[0]", &item, &mut lenient);
        assert!(!lenient.has_errors());
        assert_eq!(lenient.warnings.len(), 1);

        let mut strict = ValidationReport::default();
        StandardCoupling::device("nodes", "linux", true).validate_item("apod.nodes[0]", &item, &mut strict);
        assert!(strict.has_errors());
        assert!(strict.to_string().contains("apod.nodes[0]"));
    }
}
