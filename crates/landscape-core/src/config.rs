// ── Declarations and settings ──
//
// Typed views of the landscape and topology documents, plus the knobs that
// shape activation. Raw documents stay as `serde_json::Value` until the
// configuration layer has validated their structure.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::command::{ActionPattern, CommandAspects, LoggingPattern};
use crate::coordinator::CouplingSpec;

// ── Resource declarations ────────────────────────────────────────────

/// One declared device (`apod.<section>[]`) or service (`infrastructure.services[]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDeclaration {
    /// `deviceType` or `serviceType` in the document.
    #[serde(alias = "deviceType", alias = "serviceType")]
    pub resource_type: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub group: String,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub features: BTreeMap<String, Value>,

    /// Credential identifiers, resolved against the credential table.
    #[serde(default)]
    pub credentials: Vec<String>,

    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub ipaddr: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Optional regex whose first capture group becomes the identity.
    #[serde(default)]
    pub identity_pattern: Option<String>,

    /// The `apod` section the device was declared in; empty for services.
    #[serde(skip)]
    pub section: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResourceDeclaration {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains_key(feature)
    }

    /// `features.<feature>.interface`, naming a power or serial interface.
    pub fn feature_interface(&self, feature: &str) -> Option<&str> {
        self.features
            .get(feature)
            .and_then(|f| f.get("interface"))
            .and_then(Value::as_str)
    }

    /// Pretty dump used in configuration error messages.
    pub fn describe(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| format!("{self:?}"))
            .lines()
            .map(|line| format!("    {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A power (`apod.power[]`) or serial (`apod.serial[]`) interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDeclaration {
    pub name: String,

    #[serde(rename = "type", alias = "powerType", alias = "serialType")]
    pub interface_type: String,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub credentials: Vec<String>,

    #[serde(default)]
    pub skip: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A topology `clusters[]` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDeclaration {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub spares: Vec<String>,
}

// ── Activation parameters ────────────────────────────────────────────

/// Switches handed to every activation stage. Validation is on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationParams {
    pub disable_device_activation: bool,
    pub disable_service_activation: bool,
    pub validate_features: bool,
    pub validate_topology: bool,
}

impl Default for ActivationParams {
    fn default() -> Self {
        Self {
            disable_device_activation: false,
            disable_service_activation: false,
            validate_features: true,
            validate_topology: true,
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Yaml,
    Json,
}

impl RecordFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

/// Process-level settings for one landscape instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeSettings {
    /// Name of the registered factory used to build the singleton.
    pub flavor: String,

    pub landscape_file: Option<PathBuf>,
    pub topology_file: Option<PathBuf>,
    pub credentials_file: Option<PathBuf>,

    /// Where declared documents are recorded when `log_configuration` is set.
    pub output_directory: Option<PathBuf>,
    pub log_configuration: bool,
    pub record_format: RecordFormat,

    pub command: CommandDefaults,

    /// Coordinator couplings to install, in addition to any registered in code.
    pub couplings: Vec<CouplingSpec>,
}

impl Default for LandscapeSettings {
    fn default() -> Self {
        Self {
            flavor: "default".into(),
            landscape_file: None,
            topology_file: None,
            credentials_file: None,
            output_directory: None,
            log_configuration: false,
            record_format: RecordFormat::Yaml,
            command: CommandDefaults::default(),
            couplings: CouplingSpec::defaults(),
        }
    }
}

/// Default command aspects, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDefaults {
    pub action_pattern: ActionPattern,
    pub logging_pattern: LoggingPattern,
    pub inactivity_timeout_secs: f64,
    pub completion_timeout_secs: f64,
    pub completion_interval_secs: f64,
    pub monitor_delay_secs: f64,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        let aspects = CommandAspects::default();
        Self {
            action_pattern: aspects.action_pattern,
            logging_pattern: aspects.logging_pattern,
            inactivity_timeout_secs: aspects.inactivity_timeout.as_secs_f64(),
            completion_timeout_secs: aspects.completion_timeout.as_secs_f64(),
            completion_interval_secs: aspects.completion_interval.as_secs_f64(),
            monitor_delay_secs: aspects.monitor_delay.as_secs_f64(),
        }
    }
}

impl From<&CommandDefaults> for CommandAspects {
    fn from(d: &CommandDefaults) -> Self {
        Self {
            action_pattern: d.action_pattern,
            logging_pattern: d.logging_pattern,
            inactivity_timeout: secs(d.inactivity_timeout_secs),
            completion_timeout: secs(d.completion_timeout_secs),
            completion_interval: secs(d.completion_interval_secs),
            monitor_delay: secs(d.monitor_delay_secs),
        }
    }
}

/// Negative or non-finite values collapse to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
