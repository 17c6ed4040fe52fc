//! Resource registry for a lab test fleet.
//!
//! This crate owns the landscape model and the machinery test runs use to
//! share it:
//!
//! - **[`Landscape`]**: Orchestrates four layers through three gated
//!   activation stages ([`activate_configuration`](Landscape::activate_configuration),
//!   [`activate_integration`](Landscape::activate_integration),
//!   [`activate_operations`](Landscape::activate_operations)). One caller
//!   leads each stage; concurrent callers wait on its gate.
//!
//! - **[`Coordinator`]**: Per-protocol registry that materializes
//!   [`Resource`]s from declarations, attaches their protocol extensions and
//!   verifies connectivity. Selected by integration key through a
//!   [`CoordinatorCoupling`].
//!
//! - **Checkout pool**: Available/outstanding partition of devices and
//!   clusters, mutated only under the landscape lock.
//!
//! - **Command engine** ([`command`]): Runs commands through a
//!   [`CommandAgent`] under an action pattern (`SINGLE_CALL`,
//!   `DO_UNTIL_SUCCESS`, `DO_WHILE_SUCCESS`) with inactivity and completion
//!   timeouts and a watchdog on every attempt.

pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod landscape;
pub mod layers;
pub mod model;
pub mod pool;
pub mod singleton;
mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{
    ActionPattern, CommandAgent, CommandAspects, CommandOutput, ExpectedStatus, LocalCommandAgent,
    LoggingPattern, SshCommandAgent, SshTarget,
};
pub use config::{
    ActivationParams, ClusterDeclaration, InterfaceDeclaration, LandscapeSettings, RecordFormat,
    ResourceDeclaration,
};
pub use coordinator::{
    ConnectivityReport, Coordinator, CoordinatorCore, CoordinatorCoupling, CoordinatorRole,
    CouplingSpec, DeviceCoordinator, InterfaceCoordinator, ServiceCoordinator, StandardCoupling,
};
pub use error::{CommandTimeout, CoreError};
pub use landscape::{Landscape, LandscapeBuilder, LandscapePhase, WeakLandscape};
pub use layers::{ConfigurationSource, DeclaredLandscape, StaticConfiguration};
pub use model::{
    Credential, CredentialTable, DeviceCluster, DeviceGroup, ExtensionKind, FriendlyIdentifier,
    ProtocolExtension, Resource, ResourceFilter, ResourceKind,
};
pub use pool::PoolSnapshot;
pub use singleton::{landscape_singleton, register_landscape_factory};
