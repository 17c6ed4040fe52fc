// ── Built-in device and service coordinators ──

use std::sync::{Arc, Weak};

use crate::command::{CommandAgent, CommandAspects, SshCommandAgent, SshTarget};
use crate::error::CoreError;
use crate::landscape::WeakLandscape;
use crate::model::{Resource, ResourceKind};

use super::{Coordinator, CoordinatorCore};

/// Coordinates devices reached over SSH.
pub struct DeviceCoordinator {
    core: CoordinatorCore,
}

impl DeviceCoordinator {
    pub fn new(landscape: WeakLandscape, must_include_ssh: bool, aspects: CommandAspects) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let this: Weak<dyn Coordinator> = weak.clone();
            Self {
                core: CoordinatorCore::new(landscape, this, ResourceKind::Device)
                    .with_must_include_ssh(must_include_ssh)
                    .with_aspects(aspects),
            }
        })
    }
}

impl Coordinator for DeviceCoordinator {
    fn type_name(&self) -> &'static str {
        "DeviceCoordinator"
    }

    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    fn create_ssh_agent(
        &self,
        _resource: &Arc<Resource>,
        target: SshTarget,
    ) -> Result<Option<Arc<dyn CommandAgent>>, CoreError> {
        let agent: Arc<dyn CommandAgent> =
            Arc::new(SshCommandAgent::new(target, self.core.aspects().clone()));
        Ok(Some(agent))
    }
}

/// Coordinates infrastructure services. Services get an SSH extension only
/// when they declare an `ssh` credential.
pub struct ServiceCoordinator {
    core: CoordinatorCore,
}

impl ServiceCoordinator {
    pub fn new(landscape: WeakLandscape, must_include_ssh: bool, aspects: CommandAspects) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let this: Weak<dyn Coordinator> = weak.clone();
            Self {
                core: CoordinatorCore::new(landscape, this, ResourceKind::Service)
                    .with_must_include_ssh(must_include_ssh)
                    .with_aspects(aspects),
            }
        })
    }
}

impl Coordinator for ServiceCoordinator {
    fn type_name(&self) -> &'static str {
        "ServiceCoordinator"
    }

    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    fn create_ssh_agent(
        &self,
        _resource: &Arc<Resource>,
        target: SshTarget,
    ) -> Result<Option<Arc<dyn CommandAgent>>, CoreError> {
        let agent: Arc<dyn CommandAgent> =
            Arc::new(SshCommandAgent::new(target, self.core.aspects().clone()));
        Ok(Some(agent))
    }
}
