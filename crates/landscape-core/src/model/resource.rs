// ── Landscape resources ──
//
// A Device or Service: one lab endpoint created by a coordinator during
// integration. Extensions are attached after construction, at most one
// per kind. The match/status callback tables share one per-resource lock.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use strum::Display;
use tracing::debug;

use super::credential::Credential;
use super::extension::{Capability, CapabilityPredicate, ExtensionKind, ProtocolExtension, StatusCheck};
use super::identifier::FriendlyIdentifier;
use crate::command::CommandAgent;
use crate::config::ResourceDeclaration;
use crate::coordinator::{Coordinator, DeviceCoordinator};
use crate::error::CoreError;
use crate::landscape::{Landscape, WeakLandscape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Device,
    Service,
}

/// First and last time the landscape heard from a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContactTimes {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct CallbackTables {
    capabilities: BTreeMap<String, Capability>,
    status_checks: BTreeMap<ExtensionKind, StatusCheck>,
}

pub struct Resource {
    kind: ResourceKind,
    identifier: Arc<FriendlyIdentifier>,
    declaration: ResourceDeclaration,
    credentials: BTreeMap<String, Arc<Credential>>,
    extensions: RwLock<BTreeMap<ExtensionKind, Arc<ProtocolExtension>>>,
    callbacks: Mutex<CallbackTables>,
    contact: Mutex<ContactTimes>,
    resolved_ip: OnceLock<Option<IpAddr>>,
    landscape: WeakLandscape,
    coordinator: Weak<dyn Coordinator>,
}

impl Resource {
    pub fn new(
        kind: ResourceKind,
        identifier: impl Into<Arc<FriendlyIdentifier>>,
        declaration: ResourceDeclaration,
    ) -> Self {
        let coordinator: Weak<dyn Coordinator> = Weak::<DeviceCoordinator>::new();
        Self {
            kind,
            identifier: identifier.into(),
            declaration,
            credentials: BTreeMap::new(),
            extensions: RwLock::new(BTreeMap::new()),
            callbacks: Mutex::new(CallbackTables::default()),
            contact: Mutex::new(ContactTimes::default()),
            resolved_ip: OnceLock::new(),
            landscape: WeakLandscape::default(),
            coordinator,
        }
    }

    pub fn with_credentials(mut self, credentials: BTreeMap<String, Arc<Credential>>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_landscape(mut self, landscape: WeakLandscape) -> Self {
        self.landscape = landscape;
        self
    }

    pub fn with_coordinator(mut self, coordinator: Weak<dyn Coordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    // ── Identity and declaration ─────────────────────────────────────

    pub fn identity(&self) -> String {
        self.identifier.identity()
    }

    /// Shared with whoever created the resource; updates are seen by both.
    pub fn identifier(&self) -> &Arc<FriendlyIdentifier> {
        &self.identifier
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn resource_type(&self) -> &str {
        &self.declaration.resource_type
    }

    pub fn declaration(&self) -> &ResourceDeclaration {
        &self.declaration
    }

    /// Declared name, falling back to the host, then the identity.
    pub fn name(&self) -> String {
        self.declaration
            .name
            .clone()
            .or_else(|| self.declaration.host.clone())
            .unwrap_or_else(|| self.identity())
    }

    pub fn host(&self) -> Option<&str> {
        self.declaration.host.as_deref()
    }

    pub fn group(&self) -> &str {
        &self.declaration.group
    }

    pub fn role(&self) -> Option<&str> {
        self.declaration.role.as_deref()
    }

    pub fn section(&self) -> &str {
        &self.declaration.section
    }

    pub fn features(&self) -> &BTreeMap<String, Value> {
        &self.declaration.features
    }

    pub fn is_configured_for_power(&self) -> bool {
        self.declaration.has_feature("power")
    }

    pub fn is_configured_for_serial(&self) -> bool {
        self.declaration.has_feature("serial")
    }

    // ── Credentials ──────────────────────────────────────────────────

    pub fn credentials(&self) -> &BTreeMap<String, Arc<Credential>> {
        &self.credentials
    }

    pub fn credentials_by_category(&self, category: &str) -> Vec<Arc<Credential>> {
        self.credentials
            .values()
            .filter(|c| c.has_category(category))
            .cloned()
            .collect()
    }

    pub fn has_ssh_credential(&self) -> bool {
        self.credentials.values().any(|c| c.has_category("ssh"))
    }

    // ── Extensions ───────────────────────────────────────────────────

    /// Attach an extension. A second extension of the same kind is rejected
    /// and the existing one is left untouched.
    pub fn attach_extension(
        &self,
        extension: ProtocolExtension,
    ) -> Result<Arc<ProtocolExtension>, CoreError> {
        let kind = extension.kind();
        let mut extensions = self
            .extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if extensions.contains_key(&kind) {
            return Err(CoreError::semantic(format!(
                "An extension of type '{kind}' is already attached to '{}'.",
                self.identity()
            )));
        }

        let extension = Arc::new(extension);
        extensions.insert(kind, Arc::clone(&extension));
        debug!(resource = %self.identity(), extension = %kind, "attached extension");
        Ok(extension)
    }

    pub fn extension(&self, kind: ExtensionKind) -> Option<Arc<ProtocolExtension>> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    pub fn extension_kinds(&self) -> Vec<ExtensionKind> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// The command agent of the SSH extension, when one is attached.
    pub fn ssh_agent(&self) -> Option<Arc<dyn CommandAgent>> {
        self.extension(ExtensionKind::Ssh)
            .and_then(|ext| ext.agent().cloned())
    }

    // ── Capability and status callbacks ──────────────────────────────

    pub fn register_capability(
        &self,
        key: impl Into<String>,
        kind: ExtensionKind,
        predicate: CapabilityPredicate,
    ) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capabilities
            .insert(key.into(), Capability { kind, predicate });
    }

    /// Evaluate a registered capability against its extension.
    pub fn matches(&self, key: &str, args: &[Value]) -> Result<bool, CoreError> {
        let capability = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capabilities
            .get(key)
            .cloned()
            .ok_or_else(|| {
                CoreError::semantic(format!(
                    "No capability '{key}' is registered on '{}'.",
                    self.identity()
                ))
            })?;

        let extension = self.extension(capability.kind).ok_or_else(|| {
            CoreError::semantic(format!(
                "Capability '{key}' needs an '{}' extension, which '{}' does not have.",
                capability.kind,
                self.identity()
            ))
        })?;

        Ok((capability.predicate)(&extension, args))
    }

    pub fn register_status_check(&self, kind: ExtensionKind, check: StatusCheck) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status_checks
            .insert(kind, check);
    }

    /// Run every status check whose extension is attached.
    pub fn verify_status(&self) -> BTreeMap<ExtensionKind, bool> {
        let checks: Vec<(ExtensionKind, StatusCheck)> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status_checks
            .iter()
            .map(|(k, c)| (*k, Arc::clone(c)))
            .collect();

        checks
            .into_iter()
            .filter_map(|(kind, check)| self.extension(kind).map(|ext| (kind, check(&ext))))
            .collect()
    }

    // ── Contact and addressing ───────────────────────────────────────

    pub fn record_contact(&self) {
        let now = Utc::now();
        let mut contact = self.contact.lock().unwrap_or_else(PoisonError::into_inner);
        contact.first.get_or_insert(now);
        contact.last = Some(now);
    }

    pub fn contact_times(&self) -> ContactTimes {
        *self.contact.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declared `ipaddr`, else the first address `host` resolves to. Cached.
    pub async fn ip_address(&self) -> Option<IpAddr> {
        if let Some(ip) = self.resolved_ip.get() {
            return *ip;
        }

        let resolved = match (&self.declaration.ipaddr, &self.declaration.host) {
            (Some(ip), _) => ip.parse().ok(),
            (None, Some(host)) => match host.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => tokio::net::lookup_host((host.as_str(), 0))
                    .await
                    .ok()
                    .and_then(|mut addrs| addrs.next())
                    .map(|addr| addr.ip()),
            },
            (None, None) => None,
        };

        *self.resolved_ip.get_or_init(|| resolved)
    }

    // ── Owner handles ────────────────────────────────────────────────

    pub fn landscape(&self) -> Result<Landscape, CoreError> {
        self.landscape.upgrade()
    }

    pub fn coordinator(&self) -> Result<Arc<dyn Coordinator>, CoreError> {
        self.coordinator.upgrade().ok_or(CoreError::Detached {
            handle: "coordinator",
        })
    }

    pub fn checkout(&self) -> Result<Arc<Resource>, CoreError> {
        self.landscape()?.checkout_device(&self.identity())
    }

    pub fn checkin(&self) -> Result<(), CoreError> {
        self.landscape()?.checkin_device(self)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("kind", &self.kind)
            .field("identity", &self.identity())
            .field("type", &self.declaration.resource_type)
            .field("group", &self.declaration.group)
            .field("extensions", &self.extension_kinds())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(host: &str) -> Arc<Resource> {
        let decl = ResourceDeclaration {
            resource_type: "linux".into(),
            host: Some(host.into()),
            ipaddr: Some("10.0.0.7".into()),
            features: BTreeMap::from([("power".into(), json!({ "interface": "pdu1" }))]),
            ..ResourceDeclaration::default()
        };
        Arc::new(Resource::new(
            ResourceKind::Device,
            FriendlyIdentifier::new(host, host),
            decl,
        ))
    }

    fn ssh_extension(owner: &Arc<Resource>, location: &str) -> ProtocolExtension {
        ProtocolExtension::new(ExtensionKind::Ssh, owner, owner.coordinator.clone(), location)
    }

    #[test]
    fn duplicate_extension_is_rejected_without_mutation() {
        let dev = device("node1");
        let first = dev.attach_extension(ssh_extension(&dev, "node1:22")).unwrap();

        let err = dev
            .attach_extension(ssh_extension(&dev, "elsewhere:2222"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Semantic { .. }));

        let current = dev.extension(ExtensionKind::Ssh).unwrap();
        assert_eq!(current.extension_id(), first.extension_id());
        assert_eq!(current.location(), "node1:22");
    }

    #[test]
    fn extension_owner_is_weak() {
        let dev = device("node1");
        let ext = dev.attach_extension(ssh_extension(&dev, "node1:22")).unwrap();
        assert_eq!(ext.owner().unwrap().identity(), "node1");

        drop(dev);
        assert!(matches!(ext.owner(), Err(CoreError::Detached { .. })));
    }

    #[test]
    fn capability_registry_dispatches_to_extension() {
        let dev = device("node1");
        let config = BTreeMap::from([("username".to_owned(), json!("tester"))]);
        dev.attach_extension(ssh_extension(&dev, "node1:22").with_config(config))
            .unwrap();

        dev.register_capability(
            "ssh.user",
            ExtensionKind::Ssh,
            Arc::new(|ext: &ProtocolExtension, args: &[Value]| {
                ext.config().get("username") == args.first()
            }),
        );

        assert!(dev.matches("ssh.user", &[json!("tester")]).unwrap());
        assert!(!dev.matches("ssh.user", &[json!("root")]).unwrap());
        assert!(dev.matches("power.outlet", &[]).is_err());
    }

    #[test]
    fn status_checks_only_run_for_attached_extensions() {
        let dev = device("node1");
        dev.attach_extension(ssh_extension(&dev, "node1:22")).unwrap();
        dev.register_status_check(ExtensionKind::Ssh, Arc::new(|ext: &ProtocolExtension| ext.location() == "node1:22"));
        dev.register_status_check(ExtensionKind::Power, Arc::new(|_: &ProtocolExtension| true));

        let status = dev.verify_status();
        assert_eq!(status.len(), 1);
        assert_eq!(status.get(&ExtensionKind::Ssh), Some(&true));
    }

    #[test]
    fn contact_times_track_first_and_last() {
        let dev = device("node1");
        assert_eq!(dev.contact_times(), ContactTimes::default());

        dev.record_contact();
        let first = dev.contact_times();
        dev.record_contact();
        let second = dev.contact_times();

        assert_eq!(first.first, second.first);
        assert!(second.last >= first.last);
    }

    #[tokio::test]
    async fn declared_ip_address_wins() {
        let dev = device("node1");
        assert_eq!(dev.ip_address().await, Some("10.0.0.7".parse().unwrap()));
        assert!(dev.is_configured_for_power());
        assert!(!dev.is_configured_for_serial());
    }

    #[test]
    fn detached_resource_cannot_checkout() {
        let dev = device("node1");
        assert!(matches!(dev.checkout(), Err(CoreError::Detached { .. })));
    }
}
