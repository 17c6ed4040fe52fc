// ── Coordinators ──
//
// A coordinator is the per-protocol registry that materializes resources
// from declarations, attaches their protocol extensions and verifies that
// they are reachable. Every hook has a default that concrete coordinators
// override where their protocol differs.

mod coupling;
mod device;
mod interface;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, warn};

pub use coupling::{
    CoordinatorCoupling, CoordinatorRole, CouplingSpec, StandardCoupling, ValidationReport,
    integration_key,
};
pub use device::{DeviceCoordinator, ServiceCoordinator};
pub use interface::InterfaceCoordinator;

use crate::command::{CONNECTIVITY_PROBE, CommandAgent, CommandAspects, ExpectedStatus, SshTarget};
use crate::config::{ActivationParams, ClusterDeclaration, InterfaceDeclaration, ResourceDeclaration};
use crate::error::CoreError;
use crate::landscape::{Landscape, WeakLandscape};
use crate::model::{
    DeviceCluster, DeviceGroup, ExtensionKind, FriendlyIdentifier, ProtocolExtension, Resource,
    ResourceKind,
};
use crate::store::EntityCollection;

/// One row of a connectivity sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub host: String,
    pub ip: Option<IpAddr>,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl ConnectivityReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.status == Some(0)
    }
}

// ── Coordinator trait ────────────────────────────────────────────────

pub trait Coordinator: Send + Sync + 'static {
    /// Concrete type name, used in diagnostics.
    fn type_name(&self) -> &'static str;

    fn core(&self) -> &CoordinatorCore;

    fn activate<'a>(
        &'a self,
        _params: &'a ActivationParams,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            debug!(
                coordinator = self.type_name(),
                children = self.core().len(),
                "coordinator activated"
            );
            Ok(())
        })
    }

    fn establish_connectivity<'a>(
        &'a self,
        _params: &'a ActivationParams,
    ) -> BoxFuture<'a, Result<Vec<ConnectivityReport>, CoreError>> {
        self.verify_connectivity(CONNECTIVITY_PROBE, false)
    }

    /// Run `probe` against every child with an SSH agent. In strict mode the
    /// first failure is returned; otherwise failures are collected per child.
    fn verify_connectivity<'a>(
        &'a self,
        probe: &'a str,
        raise_on_error: bool,
    ) -> BoxFuture<'a, Result<Vec<ConnectivityReport>, CoreError>> {
        Box::pin(verify_children(self.core(), probe, raise_on_error))
    }

    /// The single creation point for resources of this coordinator.
    fn create_resource(
        &self,
        landscape: &Landscape,
        declaration: &ResourceDeclaration,
    ) -> Result<(Arc<FriendlyIdentifier>, Arc<Resource>), CoreError> {
        create_resource_default(self, landscape, declaration)
    }

    fn attach_protocol_extensions(&self, resource: &Arc<Resource>) -> Result<(), CoreError> {
        attach_extension_for_ssh(self, resource)
    }

    /// Build the agent behind a resource's SSH extension. `None` means the
    /// coordinator does not speak SSH.
    fn create_ssh_agent(
        &self,
        _resource: &Arc<Resource>,
        _target: SshTarget,
    ) -> Result<Option<Arc<dyn CommandAgent>>, CoreError> {
        if self.core().must_include_ssh() {
            return Err(CoreError::not_overloaded("create_ssh_agent", self.type_name()));
        }
        Ok(None)
    }

    /// Register a power or serial interface declaration.
    fn register_interface(&self, _declaration: &InterfaceDeclaration) -> Result<(), CoreError> {
        Err(CoreError::not_overloaded("register_interface", self.type_name()))
    }

    fn create_cluster(
        &self,
        declaration: &ClusterDeclaration,
        group: Arc<DeviceGroup>,
    ) -> Result<DeviceCluster, CoreError> {
        DeviceCluster::from_declaration(declaration, group)
    }
}

// ── CoordinatorCore ──────────────────────────────────────────────────

/// State shared by every coordinator: owner handles and the child registry.
pub struct CoordinatorCore {
    landscape: WeakLandscape,
    this: Weak<dyn Coordinator>,
    kind: ResourceKind,
    must_include_ssh: bool,
    aspects: CommandAspects,
    children: EntityCollection<Resource>,
}

impl CoordinatorCore {
    pub fn new(landscape: WeakLandscape, this: Weak<dyn Coordinator>, kind: ResourceKind) -> Self {
        Self {
            landscape,
            this,
            kind,
            must_include_ssh: false,
            aspects: CommandAspects::default(),
            children: EntityCollection::new(),
        }
    }

    pub fn with_must_include_ssh(mut self, must_include_ssh: bool) -> Self {
        self.must_include_ssh = must_include_ssh;
        self
    }

    pub fn with_aspects(mut self, aspects: CommandAspects) -> Self {
        self.aspects = aspects;
        self
    }

    pub fn landscape(&self) -> Result<Landscape, CoreError> {
        self.landscape.upgrade()
    }

    pub fn weak_landscape(&self) -> WeakLandscape {
        self.landscape.clone()
    }

    /// Weak handle to the coordinator that owns this core.
    pub fn this(&self) -> Weak<dyn Coordinator> {
        self.this.clone()
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn must_include_ssh(&self) -> bool {
        self.must_include_ssh
    }

    pub fn aspects(&self) -> &CommandAspects {
        &self.aspects
    }

    // ── Child registry ───────────────────────────────────────────────

    pub fn register(&self, resource: Arc<Resource>) -> Result<(), CoreError> {
        let host = resource.host().map(str::to_owned);
        self.children
            .insert(resource.identity(), host.as_deref(), resource)
    }

    pub(crate) fn unregister(&self, identity: &str) -> Option<Arc<Resource>> {
        self.children.remove(identity)
    }

    pub fn children(&self) -> Arc<Vec<Arc<Resource>>> {
        self.children.snapshot()
    }

    pub fn subscribe_children(&self) -> watch::Receiver<Arc<Vec<Arc<Resource>>>> {
        self.children.subscribe()
    }

    pub fn lookup_by_key(&self, identity: &str) -> Option<Arc<Resource>> {
        self.children.get_by_key(identity)
    }

    pub fn lookup_by_host(&self, host: &str) -> Option<Arc<Resource>> {
        self.children.get_by_host(host)
    }

    pub async fn lookup_by_ip(&self, ip: IpAddr) -> Option<Arc<Resource>> {
        for child in self.children.snapshot().iter() {
            if child.ip_address().await == Some(ip) {
                return Some(Arc::clone(child));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

// ── Default hook implementations ─────────────────────────────────────

/// Build the identifier, construct the resource, register it, then attach
/// extensions. The registry insert is the only step under the coordinator's
/// lock; extension discovery runs after it.
pub fn create_resource_default<C: Coordinator + ?Sized>(
    coordinator: &C,
    landscape: &Landscape,
    declaration: &ResourceDeclaration,
) -> Result<(Arc<FriendlyIdentifier>, Arc<Resource>), CoreError> {
    let core = coordinator.core();
    let host = declaration.host.as_deref().ok_or_else(|| {
        CoreError::configuration(format!(
            "{} requires a 'host' for every {}.\n{}:\n{}",
            coordinator.type_name(),
            core.kind(),
            core.kind().to_string().to_uppercase(),
            declaration.describe()
        ))
    })?;

    let identifier = Arc::new(match &declaration.identity_pattern {
        Some(pattern) => FriendlyIdentifier::with_pattern(host, host, pattern)?,
        None => FriendlyIdentifier::new(host, host),
    });

    let credentials = landscape
        .credentials()?
        .resolve(&declaration.credentials)
        .map_err(|e| {
            CoreError::configuration(format!(
                "{e}\n{}:\n{}",
                core.kind().to_string().to_uppercase(),
                declaration.describe()
            ))
        })?;

    let resource = Arc::new(
        Resource::new(core.kind(), Arc::clone(&identifier), declaration.clone())
            .with_credentials(credentials)
            .with_landscape(landscape.downgrade())
            .with_coordinator(core.this()),
    );

    core.register(Arc::clone(&resource))?;

    if let Err(err) = coordinator.attach_protocol_extensions(&resource) {
        core.unregister(&resource.identity());
        return Err(err);
    }

    debug!(
        coordinator = coordinator.type_name(),
        resource = %identifier,
        "created landscape resource"
    );
    Ok((identifier, resource))
}

/// Attach an SSH extension when the resource has an `ssh` credential and a host.
pub fn attach_extension_for_ssh<C: Coordinator + ?Sized>(
    coordinator: &C,
    resource: &Arc<Resource>,
) -> Result<(), CoreError> {
    let core = coordinator.core();
    let credential = resource.credentials_by_category("ssh").into_iter().next();

    let problem = match (credential, resource.host()) {
        (Some(credential), Some(host)) => {
            let target = SshTarget {
                host: host.to_owned(),
                port: resource.declaration().port.unwrap_or(22),
                username: credential.username.clone(),
                keyfile: credential.keyfile.clone(),
            };

            if let Some(agent) = coordinator.create_ssh_agent(resource, target.clone())? {
                let config: BTreeMap<String, Value> = [
                    ("username".to_owned(), json!(target.username)),
                    ("port".to_owned(), json!(target.port)),
                    ("credential".to_owned(), json!(credential.identifier)),
                ]
                .into_iter()
                .collect();

                let extension =
                    ProtocolExtension::new(ExtensionKind::Ssh, resource, core.this(), agent.location())
                        .with_config(config)
                        .with_agent(agent);
                resource.attach_extension(extension)?;

                resource.register_capability(
                    "ssh.user",
                    ExtensionKind::Ssh,
                    Arc::new(|ext: &ProtocolExtension, args: &[Value]| {
                        ext.config().get("username") == args.first()
                    }),
                );
                resource.register_status_check(
                    ExtensionKind::Ssh,
                    Arc::new(|ext: &ProtocolExtension| ext.agent().is_some()),
                );
            }
            None
        }
        (Some(_), None) => Some("missing 'host'"),
        (None, _) => Some("missing 'ssh' credential"),
    };

    match problem {
        Some(problem) if core.must_include_ssh() => Err(CoreError::configuration(format!(
            "{} client needs to have an 'ssh' credential. ({problem})",
            coordinator.type_name()
        ))),
        Some(problem) => {
            debug!(resource = %resource.identity(), reason = problem, "no ssh extension attached");
            Ok(())
        }
        None => Ok(()),
    }
}

async fn verify_children(
    core: &CoordinatorCore,
    probe: &str,
    raise_on_error: bool,
) -> Result<Vec<ConnectivityReport>, CoreError> {
    let mut reports = Vec::new();

    for child in core.children().iter() {
        let Some(agent) = child.ssh_agent() else {
            continue;
        };
        let host = child.host().unwrap_or_default().to_owned();
        let ip = child.ip_address().await;

        match agent.run_cmd(probe, &ExpectedStatus::Exact(0), None).await {
            Ok(out) => {
                child.record_contact();
                reports.push(ConnectivityReport {
                    host,
                    ip,
                    status: Some(out.status),
                    stdout: out.stdout,
                    stderr: out.stderr,
                    error: None,
                });
            }
            Err(err) if raise_on_error => return Err(err),
            Err(err) => {
                warn!(host = %host, error = %err, "connectivity probe failed");
                reports.push(ConnectivityReport {
                    host,
                    ip,
                    status: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: Some(err.to_string()),
                });
            }
        }
    }

    Ok(reports)
}
