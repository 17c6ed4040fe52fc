// ── Integration layer ──
//
// Matches validated declarations to coordinators by integration key and
// asks each coordinator to materialize its resources. Declarations nobody
// claims are recorded as unrecognized; resources whose creation fails with
// a configuration error are recorded as failed. Neither stops the run.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ActivationParams, InterfaceDeclaration, ResourceDeclaration};
use crate::coordinator::{Coordinator, CoordinatorRole};
use crate::error::CoreError;
use crate::landscape::Landscape;
use crate::model::{DeviceGroup, Resource};

use super::{DeclaredLandscape, InstallationLayer};

/// A declaration no installed coupling claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecognizedDeclaration {
    pub key: String,
    pub description: String,
}

/// A declaration whose resource could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedResource {
    pub key: String,
    pub host: Option<String>,
    pub message: String,
}

struct CoordinatorEntry {
    role: CoordinatorRole,
    coordinator: Arc<dyn Coordinator>,
}

/// Everything integration produced.
#[derive(Default)]
pub struct IntegratedLandscape {
    devices: IndexMap<String, Arc<Resource>>,
    services: IndexMap<String, Arc<Resource>>,
    device_groups: BTreeMap<String, Arc<DeviceGroup>>,
    coordinators: BTreeMap<String, CoordinatorEntry>,
    unrecognized: Vec<UnrecognizedDeclaration>,
    failed: Vec<FailedResource>,
}

impl IntegratedLandscape {
    pub fn devices(&self) -> Vec<Arc<Resource>> {
        self.devices.values().cloned().collect()
    }

    pub fn device(&self, identity: &str) -> Option<Arc<Resource>> {
        self.devices.get(identity).cloned()
    }

    pub fn services(&self) -> Vec<Arc<Resource>> {
        self.services.values().cloned().collect()
    }

    pub fn device_groups(&self) -> Vec<Arc<DeviceGroup>> {
        self.device_groups.values().cloned().collect()
    }

    pub fn device_group(&self, label: &str) -> Option<Arc<DeviceGroup>> {
        self.device_groups.get(label).cloned()
    }

    /// Coordinators created for `role`, ordered by integration key.
    pub fn coordinators(&self, role: CoordinatorRole) -> Vec<Arc<dyn Coordinator>> {
        self.coordinators
            .values()
            .filter(|e| e.role == role)
            .map(|e| Arc::clone(&e.coordinator))
            .collect()
    }

    pub fn coordinator(&self, key: &str) -> Option<Arc<dyn Coordinator>> {
        self.coordinators.get(key).map(|e| Arc::clone(&e.coordinator))
    }

    pub fn unrecognized(&self) -> &[UnrecognizedDeclaration] {
        &self.unrecognized
    }

    pub fn failed(&self) -> &[FailedResource] {
        &self.failed
    }
}

// ── Layer ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct IntegrationLayer {
    integrated: OnceLock<Arc<IntegratedLandscape>>,
}

impl IntegrationLayer {
    pub fn integrated(&self) -> Option<&Arc<IntegratedLandscape>> {
        self.integrated.get()
    }

    pub(crate) fn activate(
        &self,
        landscape: &Landscape,
        declared: &DeclaredLandscape,
        installation: &InstallationLayer,
        params: &ActivationParams,
    ) -> Result<Arc<IntegratedLandscape>, CoreError> {
        let mut run = IntegrationRun {
            landscape,
            declared,
            installation,
            integrated: IntegratedLandscape::default(),
        };

        if params.disable_device_activation {
            info!("device activation disabled; no devices will be integrated");
        } else {
            for decl in &declared.devices {
                run.integrate_resource(CoordinatorRole::Device, decl)?;
            }
        }

        if params.disable_service_activation {
            info!("service activation disabled; no services will be integrated");
        } else {
            for decl in &declared.services {
                run.integrate_resource(CoordinatorRole::Service, decl)?;
            }
        }

        for (role, feature, interfaces) in [
            (CoordinatorRole::Power, "power", &declared.power),
            (CoordinatorRole::Serial, "serial", &declared.serial),
        ] {
            if !declared.declares_feature(feature) {
                debug!(feature, "no device declares the feature; interfaces not integrated");
                continue;
            }
            for decl in interfaces {
                run.integrate_interface(role, decl)?;
            }
        }

        let mut integrated = run.integrated;
        integrated.device_groups = build_groups(&integrated.devices)?;

        info!(
            devices = integrated.devices.len(),
            services = integrated.services.len(),
            groups = integrated.device_groups.len(),
            coordinators = integrated.coordinators.len(),
            unrecognized = integrated.unrecognized.len(),
            failed = integrated.failed.len(),
            "landscape integration complete"
        );

        let integrated = Arc::new(integrated);
        let _ = self.integrated.set(Arc::clone(&integrated));
        Ok(integrated)
    }
}

struct IntegrationRun<'a> {
    landscape: &'a Landscape,
    declared: &'a DeclaredLandscape,
    installation: &'a InstallationLayer,
    integrated: IntegratedLandscape,
}

impl IntegrationRun<'_> {
    /// The coordinator for `key`, created on first use.
    fn coordinator(&mut self, role: CoordinatorRole, key: &str) -> Option<Arc<dyn Coordinator>> {
        if let Some(entry) = self.integrated.coordinators.get(key) {
            return Some(Arc::clone(&entry.coordinator));
        }
        if !self.declared.dependencies.contains(key) {
            return None;
        }
        let coupling = self.installation.coupling(key)?;
        let coordinator = coupling.create_coordinator(self.landscape);
        debug!(key, coordinator = coordinator.type_name(), "created coordinator");
        self.integrated.coordinators.insert(
            key.to_owned(),
            CoordinatorEntry {
                role,
                coordinator: Arc::clone(&coordinator),
            },
        );
        Some(coordinator)
    }

    fn unrecognized(&mut self, key: String, description: String) {
        warn!(key = %key, "no coordinator coupling for declaration");
        self.integrated
            .unrecognized
            .push(UnrecognizedDeclaration { key, description });
    }

    fn failed(&mut self, key: String, host: Option<String>, err: &CoreError) {
        warn!(key = %key, host = host.as_deref().unwrap_or("-"), error = %err, "resource not integrated");
        self.integrated.failed.push(FailedResource {
            key,
            host,
            message: err.to_string(),
        });
    }

    fn integrate_resource(
        &mut self,
        role: CoordinatorRole,
        decl: &ResourceDeclaration,
    ) -> Result<(), CoreError> {
        let key = match role {
            CoordinatorRole::Service => DeclaredLandscape::service_key(decl),
            _ => DeclaredLandscape::device_key(decl),
        };
        let Some(coordinator) = self.coordinator(role, &key) else {
            self.unrecognized(key, decl.describe());
            return Ok(());
        };

        match coordinator.create_resource(self.landscape, decl) {
            Ok((identifier, resource)) => {
                let table = match role {
                    CoordinatorRole::Service => &mut self.integrated.services,
                    _ => &mut self.integrated.devices,
                };
                let identity = identifier.identity();
                if table.contains_key(&identity) {
                    return Err(CoreError::semantic(format!(
                        "Two coordinators created a resource with identity '{identity}'."
                    )));
                }
                table.insert(identity, resource);
                Ok(())
            }
            Err(err) if err.is_configuration() => {
                self.failed(key, decl.host.clone(), &err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn integrate_interface(
        &mut self,
        role: CoordinatorRole,
        decl: &InterfaceDeclaration,
    ) -> Result<(), CoreError> {
        let key = DeclaredLandscape::interface_key(role, decl);
        let Some(coordinator) = self.coordinator(role, &key) else {
            self.unrecognized(key, format!("{role} interface '{}'", decl.name));
            return Ok(());
        };

        match coordinator.register_interface(decl) {
            Ok(()) => Ok(()),
            Err(err) if err.is_configuration() => {
                self.failed(key, decl.host.clone(), &err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Bucket devices by their non-empty `group` label.
fn build_groups(
    devices: &IndexMap<String, Arc<Resource>>,
) -> Result<BTreeMap<String, Arc<DeviceGroup>>, CoreError> {
    let mut buckets: BTreeMap<String, Vec<Arc<Resource>>> = BTreeMap::new();
    for device in devices.values() {
        if !device.group().is_empty() {
            buckets
                .entry(device.group().to_owned())
                .or_default()
                .push(Arc::clone(device));
        }
    }

    buckets
        .into_iter()
        .map(|(label, members)| {
            let group = DeviceGroup::new(label.clone(), members)?;
            Ok((label, Arc::new(group)))
        })
        .collect()
}
