// ── Configuration layer ──
//
// Loads the landscape, topology and credential documents from a
// `ConfigurationSource`, checks their structure, and produces the typed
// `DeclaredLandscape` the integration layer consumes. Every structural
// problem is collected with its document path before failing once.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{
    ClusterDeclaration, InterfaceDeclaration, LandscapeSettings, RecordFormat, ResourceDeclaration,
};
use crate::coordinator::{CoordinatorRole, ValidationReport, integration_key};
use crate::error::CoreError;
use crate::model::CredentialTable;

use super::InstallationLayer;

/// `apod` sections that never hold device declarations.
const RESERVED_SECTIONS: [&str; 3] = ["controller", "power", "serial"];

// ── Sources ──────────────────────────────────────────────────────────

/// Where declaration documents come from.
pub trait ConfigurationSource: Send + Sync {
    fn load_landscape(&self) -> BoxFuture<'_, Result<Value, CoreError>>;

    fn load_topology(&self) -> BoxFuture<'_, Result<Option<Value>, CoreError>> {
        Box::pin(async { Ok(None) })
    }

    fn load_credentials(&self) -> BoxFuture<'_, Result<CredentialTable, CoreError>> {
        Box::pin(async { Ok(CredentialTable::default()) })
    }
}

/// In-memory documents.
#[derive(Debug, Clone)]
pub struct StaticConfiguration {
    landscape: Value,
    topology: Option<Value>,
    credentials: CredentialTable,
}

impl StaticConfiguration {
    pub fn new(landscape: Value) -> Self {
        Self {
            landscape,
            topology: None,
            credentials: CredentialTable::default(),
        }
    }

    pub fn empty() -> Self {
        Self::new(json!({}))
    }

    pub fn with_topology(mut self, topology: Value) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialTable) -> Self {
        self.credentials = credentials;
        self
    }
}

impl ConfigurationSource for StaticConfiguration {
    fn load_landscape(&self) -> BoxFuture<'_, Result<Value, CoreError>> {
        Box::pin(async { Ok(self.landscape.clone()) })
    }

    fn load_topology(&self) -> BoxFuture<'_, Result<Option<Value>, CoreError>> {
        Box::pin(async { Ok(self.topology.clone()) })
    }

    fn load_credentials(&self) -> BoxFuture<'_, Result<CredentialTable, CoreError>> {
        Box::pin(async { Ok(self.credentials.clone()) })
    }
}

// ── DeclaredLandscape ────────────────────────────────────────────────

/// Validated, typed declarations. Items marked `skip` are already dropped.
#[derive(Debug, Clone, Default)]
pub struct DeclaredLandscape {
    pub landscape: Value,
    pub topology: Option<Value>,
    pub devices: Vec<ResourceDeclaration>,
    pub services: Vec<ResourceDeclaration>,
    pub power: Vec<InterfaceDeclaration>,
    pub serial: Vec<InterfaceDeclaration>,
    pub clusters: Vec<ClusterDeclaration>,
    pub credentials: CredentialTable,

    /// Integration keys the installed couplings attached to.
    pub dependencies: BTreeSet<String>,
}

impl DeclaredLandscape {
    pub fn device_key(decl: &ResourceDeclaration) -> String {
        integration_key(CoordinatorRole::Device, &decl.section, &decl.resource_type)
    }

    pub fn service_key(decl: &ResourceDeclaration) -> String {
        integration_key(
            CoordinatorRole::Service,
            CoordinatorRole::Service.default_section(),
            &decl.resource_type,
        )
    }

    pub fn interface_key(role: CoordinatorRole, decl: &InterfaceDeclaration) -> String {
        integration_key(role, role.default_section(), &decl.interface_type)
    }

    /// Whether any declared device names `feature` (`"power"`, `"serial"`).
    pub fn declares_feature(&self, feature: &str) -> bool {
        self.devices.iter().any(|d| d.has_feature(feature))
    }

    /// Number of declared items that map to `key`.
    pub fn count_for_key(&self, key: &str) -> usize {
        let devices = self.devices.iter().filter(|d| Self::device_key(d) == key);
        let services = self.services.iter().filter(|s| Self::service_key(s) == key);
        let power = self
            .power
            .iter()
            .filter(|p| Self::interface_key(CoordinatorRole::Power, p) == key);
        let serial = self
            .serial
            .iter()
            .filter(|s| Self::interface_key(CoordinatorRole::Serial, s) == key);
        devices.count() + services.count() + power.count() + serial.count()
    }
}

// ── Layer ────────────────────────────────────────────────────────────

pub struct ConfigurationLayer {
    source: Arc<dyn ConfigurationSource>,
    declared: OnceLock<Arc<DeclaredLandscape>>,
}

impl ConfigurationLayer {
    pub fn new(source: Arc<dyn ConfigurationSource>) -> Self {
        Self {
            source,
            declared: OnceLock::new(),
        }
    }

    pub fn declared(&self) -> Option<&Arc<DeclaredLandscape>> {
        self.declared.get()
    }

    pub(crate) async fn activate(
        &self,
        settings: &LandscapeSettings,
        installation: &InstallationLayer,
    ) -> Result<Arc<DeclaredLandscape>, CoreError> {
        let landscape = self.source.load_landscape().await?;
        let topology = self.source.load_topology().await?;
        let credentials = self.source.load_credentials().await?;

        let mut report = ValidationReport::default();
        let mut declared = DeclaredLandscape {
            landscape,
            topology,
            credentials,
            ..DeclaredLandscape::default()
        };
        collect_declarations(&mut declared, installation, &mut report);

        for (path, message) in &report.warnings {
            warn!(path = %path, "{message}");
        }
        if report.has_errors() {
            return Err(CoreError::configuration(report.to_string().trim_end()));
        }

        if settings.log_configuration {
            if let Some(dir) = &settings.output_directory {
                record_documents(dir, settings.record_format, &declared).await?;
            }
        }

        for (key, coupling) in installation.couplings() {
            let count = declared.count_for_key(key);
            if coupling.attach_to_environment(count) {
                debug!(key = %key, items = count, "coupling attached to environment");
                declared.dependencies.insert(key.to_owned());
            }
        }

        info!(
            devices = declared.devices.len(),
            services = declared.services.len(),
            power = declared.power.len(),
            serial = declared.serial.len(),
            clusters = declared.clusters.len(),
            credentials = declared.credentials.len(),
            "landscape configuration loaded"
        );

        let declared = Arc::new(declared);
        let _ = self.declared.set(Arc::clone(&declared));
        Ok(declared)
    }
}

// ── Structural validation ────────────────────────────────────────────

fn collect_declarations(
    declared: &mut DeclaredLandscape,
    installation: &InstallationLayer,
    report: &mut ValidationReport,
) {
    let landscape = declared.landscape.clone();

    if !landscape.is_object() {
        report.error("$", "expected a mapping at the document root");
        return;
    }

    if let Some(apod) = landscape.get("apod") {
        match apod.as_object() {
            Some(sections) => {
                for (section, items) in sections {
                    if section == RESERVED_SECTIONS[0] {
                        continue;
                    }
                    let path = format!("apod.{section}");
                    match section.as_str() {
                        "power" => {
                            declared.power =
                                interfaces(CoordinatorRole::Power, &path, items, installation, report);
                        }
                        "serial" => {
                            declared.serial =
                                interfaces(CoordinatorRole::Serial, &path, items, installation, report);
                        }
                        _ => {
                            let found = resources(
                                CoordinatorRole::Device,
                                section,
                                &path,
                                items,
                                installation,
                                report,
                            );
                            declared.devices.extend(found);
                        }
                    }
                }
            }
            None => report.error("apod", "expected a mapping"),
        }
    }

    if let Some(infrastructure) = landscape.get("infrastructure") {
        if let Some(services) = infrastructure.get("services") {
            declared.services = resources(
                CoordinatorRole::Service,
                "",
                "infrastructure.services",
                services,
                installation,
                report,
            );
        }
    }

    if let Some(topology) = declared.topology.clone() {
        if let Some(clusters) = topology.get("clusters") {
            declared.clusters = clusters_from(clusters, report);
        }
    }
}

/// Non-skipped mapping items of a list section, with their paths.
fn items<'a>(path: &str, section: &'a Value, report: &mut ValidationReport) -> Vec<(String, &'a Value)> {
    let Some(list) = section.as_array() else {
        report.error(path, "expected a list");
        return Vec::new();
    };

    list.iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let item_path = format!("{path}[{index}]");
            if !item.is_object() {
                report.error(item_path, "expected a mapping");
                return None;
            }
            if item.get("skip").and_then(Value::as_bool) == Some(true) {
                debug!(path = %item_path, "skipping declaration");
                return None;
            }
            Some((item_path, item))
        })
        .collect()
}

fn resources(
    role: CoordinatorRole,
    section: &str,
    path: &str,
    list: &Value,
    installation: &InstallationLayer,
    report: &mut ValidationReport,
) -> Vec<ResourceDeclaration> {
    let key_section = if role == CoordinatorRole::Device { section } else { role.default_section() };
    let mut declarations = Vec::new();

    for (item_path, item) in items(path, list, report) {
        let Some(class) = item.get(role.leaf()).and_then(Value::as_str) else {
            report.error(item_path, format!("missing '{}'", role.leaf()));
            continue;
        };
        if let Some(coupling) = installation.coupling(&integration_key(role, key_section, class)) {
            coupling.validate_item(&item_path, item, report);
        }
        if let Some(mut decl) = typed::<ResourceDeclaration>(&item_path, item, report) {
            decl.section = section.to_owned();
            declarations.push(decl);
        }
    }

    declarations
}

fn interfaces(
    role: CoordinatorRole,
    path: &str,
    list: &Value,
    installation: &InstallationLayer,
    report: &mut ValidationReport,
) -> Vec<InterfaceDeclaration> {
    let mut declarations = Vec::new();

    for (item_path, item) in items(path, list, report) {
        let class = item
            .get(role.leaf())
            .or_else(|| item.get("type"))
            .and_then(Value::as_str);
        let Some(class) = class else {
            report.error(item_path, format!("missing '{}'", role.leaf()));
            continue;
        };
        if let Some(coupling) = installation.coupling(&integration_key(role, role.default_section(), class)) {
            coupling.validate_item(&item_path, item, report);
        }
        if let Some(decl) = typed(&item_path, item, report) {
            declarations.push(decl);
        }
    }

    declarations
}

fn clusters_from(list: &Value, report: &mut ValidationReport) -> Vec<ClusterDeclaration> {
    let mut clusters = Vec::new();

    for (item_path, item) in items("clusters", list, report) {
        let mut complete = true;
        for field in ["name", "group"] {
            if item.get(field).and_then(Value::as_str).is_none() {
                report.error(item_path.clone(), format!("missing '{field}'"));
                complete = false;
            }
        }
        if complete {
            if let Some(decl) = typed(&item_path, item, report) {
                clusters.push(decl);
            }
        }
    }

    clusters
}

fn typed<T: DeserializeOwned>(path: &str, item: &Value, report: &mut ValidationReport) -> Option<T> {
    match serde_json::from_value(item.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            report.error(path, e.to_string());
            None
        }
    }
}

// ── Recording ────────────────────────────────────────────────────────

async fn record_documents(
    dir: &Path,
    format: RecordFormat,
    declared: &DeclaredLandscape,
) -> Result<(), CoreError> {
    tokio::fs::create_dir_all(dir).await?;

    let mut documents = vec![("landscape-declared", &declared.landscape)];
    if let Some(topology) = &declared.topology {
        documents.push(("topology-declared", topology));
    }

    for (stem, document) in documents {
        let rendered = match format {
            RecordFormat::Yaml => serde_yaml::to_string(document)?,
            RecordFormat::Json => serde_json::to_string_pretty(document)?,
        };
        let path = dir.join(format!("{stem}.{}", format.extension()));
        tokio::fs::write(&path, rendered).await?;
        debug!(path = %path.display(), "recorded declared document");
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::coordinator::StandardCoupling;
    use pretty_assertions::assert_eq;

    fn installation() -> InstallationLayer {
        let mut layer = InstallationLayer::default();
        layer
            .install(Arc::new(StandardCoupling::device("nodes", "linux", false)))
            .unwrap();
        layer
    }

    fn landscape_doc() -> Value {
        json!({
            "apod": {
                "controller": { "name": "ignored" },
                "nodes": [
                    { "deviceType": "linux", "host": "node1", "credentials": ["lab-ssh"] },
                    { "deviceType": "linux", "host": "node2", "skip": true },
                    { "deviceType": "linux", "host": "node3" }
                ],
                "power": [ { "name": "pdu1", "powerType": "dlipower", "host": "pdu1.lab" } ]
            },
            "infrastructure": {
                "services": [ { "serviceType": "dhcp", "host": "dhcp.lab" } ]
            }
        })
    }

    #[tokio::test]
    async fn declarations_are_typed_and_skips_dropped() {
        let layer = ConfigurationLayer::new(Arc::new(
            StaticConfiguration::new(landscape_doc())
                .with_topology(json!({ "clusters": [ { "name": "c1", "group": "g", "nodes": ["node1"] } ] })),
        ));

        let declared = layer
            .activate(&LandscapeSettings::default(), &installation())
            .await
            .unwrap();

        let hosts: Vec<_> = declared.devices.iter().filter_map(|d| d.host.as_deref()).collect();
        assert_eq!(hosts, ["node1", "node3"]);
        assert_eq!(declared.devices[0].section, "nodes");
        assert_eq!(declared.power[0].interface_type, "dlipower");
        assert_eq!(declared.services[0].resource_type, "dhcp");
        assert_eq!(declared.clusters[0].nodes, ["node1"]);
        assert!(declared.dependencies.contains("apod:nodes:deviceType:linux"));
        assert!(layer.declared().is_some());
    }

    #[tokio::test]
    async fn structural_errors_are_aggregated_with_paths() {
        let doc = json!({
            "apod": {
                "nodes": [ { "host": "node1" }, { "deviceType": "linux" } ],
                "racks": { "not": "a list" }
            },
            "infrastructure": { "services": [ { "host": "svc" } ] }
        });
        let layer = ConfigurationLayer::new(Arc::new(
            StaticConfiguration::new(doc).with_topology(json!({ "clusters": [ { "nodes": [] } ] })),
        ));

        let err = layer
            .activate(&LandscapeSettings::default(), &installation())
            .await
            .unwrap_err();
        let message = err.to_string();

        assert!(err.is_configuration());
        assert!(message.contains("Landscape validation failures:"));
        assert!(message.contains("apod.nodes[0]: missing 'deviceType'"));
        assert!(message.contains("apod.nodes[1]: missing 'host'"));
        assert!(message.contains("apod.racks: expected a list"));
        assert!(message.contains("infrastructure.services[0]: missing 'serviceType'"));
        assert!(message.contains("clusters[0]: missing 'name'"));
        assert!(message.contains("clusters[0]: missing 'group'"));
        assert!(layer.declared().is_none());
    }

    #[tokio::test]
    async fn declared_documents_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LandscapeSettings {
            log_configuration: true,
            output_directory: Some(dir.path().join("records")),
            record_format: RecordFormat::Json,
            ..LandscapeSettings::default()
        };
        let layer = ConfigurationLayer::new(Arc::new(
            StaticConfiguration::new(landscape_doc()).with_topology(json!({ "clusters": [] })),
        ));

        layer.activate(&settings, &installation()).await.unwrap();

        let recorded = std::fs::read_to_string(dir.path().join("records/landscape-declared.json")).unwrap();
        let value: Value = serde_json::from_str(&recorded).unwrap();
        assert_eq!(value, landscape_doc());
        assert!(dir.path().join("records/topology-declared.json").exists());
    }
}
