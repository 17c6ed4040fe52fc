// ── Power and serial interface coordinators ──
//
// Interfaces are not resources. They are registered by name during
// integration and bound to devices during operational activation, through
// each device's `features.<power|serial>.interface`.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use crate::command::CommandAspects;
use crate::config::{ActivationParams, InterfaceDeclaration};
use crate::error::CoreError;
use crate::landscape::WeakLandscape;
use crate::model::{ExtensionKind, ProtocolExtension, ResourceKind};

use super::{Coordinator, CoordinatorCore};

pub struct InterfaceCoordinator {
    core: CoordinatorCore,
    kind: ExtensionKind,
    interfaces: RwLock<BTreeMap<String, InterfaceDeclaration>>,
}

impl InterfaceCoordinator {
    pub fn power(landscape: WeakLandscape, aspects: CommandAspects) -> Arc<Self> {
        Self::new(landscape, ExtensionKind::Power, aspects)
    }

    pub fn serial(landscape: WeakLandscape, aspects: CommandAspects) -> Arc<Self> {
        Self::new(landscape, ExtensionKind::Serial, aspects)
    }

    fn new(landscape: WeakLandscape, kind: ExtensionKind, aspects: CommandAspects) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let this: Weak<dyn Coordinator> = weak.clone();
            Self {
                core: CoordinatorCore::new(landscape, this, ResourceKind::Device)
                    .with_aspects(aspects),
                kind,
                interfaces: RwLock::new(BTreeMap::new()),
            }
        })
    }

    /// The device feature this coordinator binds (`"power"` or `"serial"`).
    pub fn feature(&self) -> &'static str {
        match self.kind {
            ExtensionKind::Serial => "serial",
            _ => "power",
        }
    }

    pub fn extension_kind(&self) -> ExtensionKind {
        self.kind
    }

    pub fn interface(&self, name: &str) -> Option<InterfaceDeclaration> {
        self.interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn bind_devices(&self) -> Result<usize, CoreError> {
        let landscape = self.core.landscape()?;
        let feature = self.feature();
        let mut bound = 0;

        for device in landscape.devices() {
            let Some(name) = device.declaration().feature_interface(feature) else {
                continue;
            };
            let Some(iface) = self.interface(name) else {
                continue;
            };

            let config: BTreeMap<String, Value> = device
                .features()
                .get(feature)
                .and_then(Value::as_object)
                .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            let location = iface.host.clone().unwrap_or_else(|| iface.name.clone());

            let extension = ProtocolExtension::new(self.kind, &device, self.core.this(), location)
                .with_config(config);
            device.attach_extension(extension)?;
            bound += 1;
        }

        Ok(bound)
    }
}

impl Coordinator for InterfaceCoordinator {
    fn type_name(&self) -> &'static str {
        match self.kind {
            ExtensionKind::Serial => "SerialCoordinator",
            _ => "PowerCoordinator",
        }
    }

    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    fn register_interface(&self, declaration: &InterfaceDeclaration) -> Result<(), CoreError> {
        let mut interfaces = self
            .interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if interfaces.contains_key(&declaration.name) {
            return Err(CoreError::configuration(format!(
                "Duplicate {} interface '{}'.",
                self.feature(),
                declaration.name
            )));
        }
        debug!(
            coordinator = self.type_name(),
            interface = %declaration.name,
            interface_type = %declaration.interface_type,
            "registered interface"
        );
        interfaces.insert(declaration.name.clone(), declaration.clone());
        Ok(())
    }

    fn activate<'a>(
        &'a self,
        _params: &'a ActivationParams,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let bound = self.bind_devices()?;
            info!(coordinator = self.type_name(), devices = bound, "bound interfaces");
            Ok(())
        })
    }

    fn establish_connectivity<'a>(
        &'a self,
        _params: &'a ActivationParams,
    ) -> BoxFuture<'a, Result<Vec<super::ConnectivityReport>, CoreError>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
