// ── Landscape ──
//
// Orchestrates the layers through three gated activation stages. Each
// stage elects a leader under the landscape lock, releases the lock while
// the leader works, and releases followers through a one-shot gate. The
// same lock serializes every checkout and checkin.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ActivationParams, LandscapeSettings};
use crate::coordinator::{Coordinator, CoordinatorCoupling, CoordinatorRole};
use crate::error::CoreError;
use crate::layers::{
    ConfigurationLayer, ConfigurationSource, DeclaredLandscape, FailedResource, InstallationLayer,
    IntegratedLandscape, IntegrationLayer, OperationalLayer, StaticConfiguration,
    UnrecognizedDeclaration,
};
use crate::model::{CredentialTable, DeviceCluster, DeviceGroup, Resource, ResourceFilter, select};
use crate::pool::{PoolSnapshot, ResourcePool};

// ── Phases and stages ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
pub enum LandscapePhase {
    New,
    Configuring,
    Configured,
    Integrating,
    Integrated,
    Operational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
enum Stage {
    Configuration,
    Integration,
    Operational,
}

impl Stage {
    fn index(self) -> usize {
        self as usize
    }

    /// Phase entered when a leader is elected, if the stage has one.
    fn entering_phase(self) -> Option<LandscapePhase> {
        match self {
            Self::Configuration => Some(LandscapePhase::Configuring),
            Self::Integration => Some(LandscapePhase::Integrating),
            Self::Operational => None,
        }
    }
}

// ── Gate ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Pending,
    Open,
    Failed(String),
}

/// One-shot broadcast: pending until the leader opens or fails it.
struct Gate(watch::Sender<GateState>);

impl Gate {
    fn new() -> Self {
        Self(watch::channel(GateState::Pending).0)
    }

    fn open(&self) {
        self.0.send_replace(GateState::Open);
    }

    fn fail(&self, message: String) {
        self.0.send_replace(GateState::Failed(message));
    }

    async fn wait(&self, stage: Stage) -> Result<(), CoreError> {
        let mut rx = self.0.subscribe();
        let state = rx
            .wait_for(|state| *state != GateState::Pending)
            .await
            .map_err(|_| CoreError::Detached {
                handle: "landscape",
            })?
            .clone();

        match state {
            GateState::Failed(message) => Err(CoreError::ActivationFailed {
                stage: stage.to_string(),
                message,
            }),
            _ => Ok(()),
        }
    }
}

/// Fails the gate if the leader's work is dropped before it finishes.
struct LeaderGuard<'a> {
    gate: &'a Gate,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(mut self, result: &Result<(), CoreError>) {
        match result {
            Ok(()) => self.gate.open(),
            Err(err) => self.gate.fail(err.to_string()),
        }
        self.settled = true;
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.fail("activation was cancelled before it completed".into());
        }
    }
}

// ── State ────────────────────────────────────────────────────────────

struct LandscapeState {
    phase: LandscapePhase,
    leaders: [bool; 3],
    pool: Option<ResourcePool>,
}

struct LandscapeInner {
    settings: LandscapeSettings,
    installation: InstallationLayer,
    configuration: ConfigurationLayer,
    integration: IntegrationLayer,
    operational: OperationalLayer,
    state: Mutex<LandscapeState>,
    gates: [Gate; 3],
}

/// The lab landscape. Cloning is cheap and every clone shares one state.
#[derive(Clone)]
pub struct Landscape {
    inner: Arc<LandscapeInner>,
}

/// Non-owning handle held by resources and coordinators.
#[derive(Clone, Default)]
pub struct WeakLandscape(Weak<LandscapeInner>);

impl WeakLandscape {
    pub fn upgrade(&self) -> Result<Landscape, CoreError> {
        self.0
            .upgrade()
            .map(|inner| Landscape { inner })
            .ok_or(CoreError::Detached {
                handle: "landscape",
            })
    }
}

impl std::fmt::Debug for WeakLandscape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakLandscape")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

impl Landscape {
    pub fn builder() -> LandscapeBuilder {
        LandscapeBuilder::default()
    }

    pub fn downgrade(&self) -> WeakLandscape {
        WeakLandscape(Arc::downgrade(&self.inner))
    }

    pub fn settings(&self) -> &LandscapeSettings {
        &self.inner.settings
    }

    pub fn installation(&self) -> &InstallationLayer {
        &self.inner.installation
    }

    pub fn phase(&self) -> LandscapePhase {
        self.lock_state().phase
    }

    fn lock_state(&self) -> MutexGuard<'_, LandscapeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: LandscapePhase) {
        self.lock_state().phase = phase;
    }

    // ── Activation ───────────────────────────────────────────────────

    /// Elect a leader for `stage`. The leader runs `work`; everyone else
    /// waits on the stage gate. A stage never runs twice.
    async fn run_stage(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<(), CoreError>>,
    ) -> Result<(), CoreError> {
        let is_leader = {
            let mut state = self.lock_state();
            let claimed = &mut state.leaders[stage.index()];
            if *claimed {
                false
            } else {
                *claimed = true;
                if let Some(phase) = stage.entering_phase() {
                    state.phase = phase;
                }
                true
            }
        };

        let gate = &self.inner.gates[stage.index()];
        if !is_leader {
            debug!(stage = %stage, "waiting for activation leader");
            return gate.wait(stage).await;
        }

        info!(stage = %stage, "activating landscape stage");
        let guard = LeaderGuard {
            gate,
            settled: false,
        };
        let result = work.await;
        if let Err(err) = &result {
            warn!(stage = %stage, error = %err, "landscape stage failed");
        }
        guard.settle(&result);
        result
    }

    pub async fn activate_configuration(&self, _params: &ActivationParams) -> Result<(), CoreError> {
        self.run_stage(Stage::Configuration, async {
            self.inner
                .configuration
                .activate(&self.inner.settings, &self.inner.installation)
                .await?;
            self.set_phase(LandscapePhase::Configured);
            Ok(())
        })
        .await
    }

    pub async fn activate_integration(&self, params: &ActivationParams) -> Result<(), CoreError> {
        self.activate_configuration(params).await?;
        self.run_stage(Stage::Integration, async {
            let declared = self.declared()?;
            self.inner
                .integration
                .activate(self, &declared, &self.inner.installation, params)?;
            self.set_phase(LandscapePhase::Integrated);
            Ok(())
        })
        .await
    }

    pub async fn activate_operations(&self, params: &ActivationParams) -> Result<(), CoreError> {
        self.activate_integration(params).await?;
        self.run_stage(Stage::Operational, async {
            let declared = self.declared()?;
            let integrated = self.integrated()?;
            let clusters = self
                .inner
                .operational
                .activate(&declared, &integrated, params)
                .await?;

            let mut state = self.lock_state();
            state.pool = Some(ResourcePool::seed(integrated.devices(), clusters));
            state.phase = LandscapePhase::Operational;
            Ok(())
        })
        .await
    }

    /// Run all three stages.
    pub async fn startup_landscape(&self, params: &ActivationParams) -> Result<(), CoreError> {
        self.activate_operations(params).await
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn declared(&self) -> Result<Arc<DeclaredLandscape>, CoreError> {
        self.inner
            .configuration
            .declared()
            .cloned()
            .ok_or_else(|| CoreError::semantic("The landscape has not been configured."))
    }

    pub fn credentials(&self) -> Result<CredentialTable, CoreError> {
        Ok(self.declared()?.credentials.clone())
    }

    pub fn integrated(&self) -> Result<Arc<IntegratedLandscape>, CoreError> {
        self.inner
            .integration
            .integrated()
            .cloned()
            .ok_or_else(|| CoreError::semantic("The landscape has not been integrated."))
    }

    /// Integrated devices, in declaration order. Empty before integration.
    pub fn devices(&self) -> Vec<Arc<Resource>> {
        self.integrated().map(|i| i.devices()).unwrap_or_default()
    }

    pub fn device(&self, identity: &str) -> Option<Arc<Resource>> {
        self.integrated().ok()?.device(identity)
    }

    pub fn services(&self) -> Vec<Arc<Resource>> {
        self.integrated().map(|i| i.services()).unwrap_or_default()
    }

    pub fn device_groups(&self) -> Vec<Arc<DeviceGroup>> {
        self.integrated()
            .map(|i| i.device_groups())
            .unwrap_or_default()
    }

    pub fn clusters(&self) -> Vec<Arc<DeviceCluster>> {
        self.inner
            .operational
            .clusters()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn coordinators(&self, role: CoordinatorRole) -> Vec<Arc<dyn Coordinator>> {
        self.integrated()
            .map(|i| i.coordinators(role))
            .unwrap_or_default()
    }

    pub fn unrecognized(&self) -> Vec<UnrecognizedDeclaration> {
        self.integrated()
            .map(|i| i.unrecognized().to_vec())
            .unwrap_or_default()
    }

    pub fn failed(&self) -> Vec<FailedResource> {
        self.integrated()
            .map(|i| i.failed().to_vec())
            .unwrap_or_default()
    }

    pub fn select_devices(
        &self,
        include: &[ResourceFilter],
        exclude: &[ResourceFilter],
    ) -> Vec<Arc<Resource>> {
        select(self.devices(), include, exclude)
    }

    pub fn select_services(
        &self,
        include: &[ResourceFilter],
        exclude: &[ResourceFilter],
    ) -> Vec<Arc<Resource>> {
        select(self.services(), include, exclude)
    }

    // ── Checkout / checkin ───────────────────────────────────────────

    fn with_pool<T>(
        &self,
        on_missing: impl FnOnce(String) -> CoreError,
        op: impl FnOnce(&mut ResourcePool) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut state = self.lock_state();
        match state.pool.as_mut() {
            Some(pool) => op(pool),
            None => Err(on_missing(
                "The landscape is not operational; the pool is empty.".into(),
            )),
        }
    }

    pub fn checkout_device(&self, identity: &str) -> Result<Arc<Resource>, CoreError> {
        let device = self.with_pool(
            |message| CoreError::Checkout { message },
            |pool| pool.checkout_device(identity),
        )?;
        debug!(device = identity, "checked out device");
        Ok(device)
    }

    pub fn checkin_device(&self, device: &Resource) -> Result<(), CoreError> {
        let identity = device.identity();
        self.with_pool(
            |message| CoreError::Checkin { message },
            |pool| pool.checkin_device(&identity),
        )?;
        debug!(device = %identity, "checked in device");
        Ok(())
    }

    pub fn checkout_cluster(&self, name: &str) -> Result<Arc<DeviceCluster>, CoreError> {
        let cluster = self.with_pool(
            |message| CoreError::Checkout { message },
            |pool| pool.checkout_cluster(name),
        )?;
        debug!(cluster = name, "checked out cluster");
        Ok(cluster)
    }

    pub fn checkin_cluster(&self, cluster: &DeviceCluster) -> Result<(), CoreError> {
        self.with_pool(
            |message| CoreError::Checkin { message },
            |pool| pool.checkin_cluster(cluster.name()),
        )?;
        debug!(cluster = %cluster.name(), "checked in cluster");
        Ok(())
    }

    /// Pool contents, once operational.
    pub fn pool_snapshot(&self) -> Option<PoolSnapshot> {
        self.lock_state().pool.as_ref().map(ResourcePool::snapshot)
    }
}

impl std::fmt::Debug for Landscape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Landscape")
            .field("flavor", &self.inner.settings.flavor)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a landscape. Couplings listed in the settings are installed
/// first, then the ones registered here.
#[derive(Default)]
pub struct LandscapeBuilder {
    settings: LandscapeSettings,
    source: Option<Arc<dyn ConfigurationSource>>,
    couplings: Vec<Arc<dyn CoordinatorCoupling>>,
}

impl LandscapeBuilder {
    #[must_use]
    pub fn settings(mut self, settings: LandscapeSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl ConfigurationSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn coupling(mut self, coupling: impl CoordinatorCoupling + 'static) -> Self {
        self.couplings.push(Arc::new(coupling));
        self
    }

    pub fn build(self) -> Result<Landscape, CoreError> {
        let mut installation = InstallationLayer::default();
        for spec in self.settings.couplings.iter().cloned() {
            installation.install(spec.into_coupling())?;
        }
        for coupling in self.couplings {
            installation.install(coupling)?;
        }

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(StaticConfiguration::empty()));

        let inner = LandscapeInner {
            settings: self.settings,
            installation,
            configuration: ConfigurationLayer::new(source),
            integration: IntegrationLayer::default(),
            operational: OperationalLayer::default(),
            state: Mutex::new(LandscapeState {
                phase: LandscapePhase::New,
                leaders: [false; 3],
                pool: None,
            }),
            gates: [Gate::new(), Gate::new(), Gate::new()],
        };

        Ok(Landscape {
            inner: Arc::new(inner),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkout_before_operational_is_rejected() {
        let landscape = Landscape::builder().build().unwrap();
        let err = landscape.checkout_device("node1").unwrap_err();
        assert!(matches!(err, CoreError::Checkout { .. }));
        assert_eq!(landscape.phase(), LandscapePhase::New);
        assert!(landscape.pool_snapshot().is_none());
    }

    #[tokio::test]
    async fn empty_landscape_reaches_operational() {
        let landscape = Landscape::builder().build().unwrap();
        landscape
            .startup_landscape(&ActivationParams::default())
            .await
            .unwrap();

        assert_eq!(landscape.phase(), LandscapePhase::Operational);
        assert!(landscape.devices().is_empty());
        assert_eq!(landscape.pool_snapshot(), Some(PoolSnapshot::default()));

        // Re-entry is a no-op.
        landscape
            .activate_configuration(&ActivationParams::default())
            .await
            .unwrap();
        assert_eq!(landscape.phase(), LandscapePhase::Operational);
    }

    #[test]
    fn weak_handle_detaches_with_the_landscape() {
        let landscape = Landscape::builder().build().unwrap();
        let weak = landscape.downgrade();
        assert!(weak.upgrade().is_ok());

        drop(landscape);
        assert!(matches!(weak.upgrade(), Err(CoreError::Detached { .. })));
    }
}
