// ── Landscape domain model ──

pub mod cluster;
pub mod credential;
pub mod extension;
pub mod filter;
pub mod group;
pub mod identifier;
pub mod resource;

pub use cluster::DeviceCluster;
pub use credential::{Credential, CredentialTable};
pub use extension::{Capability, CapabilityPredicate, ExtensionKind, ProtocolExtension, StatusCheck};
pub use filter::{ResourceFilter, select};
pub use group::DeviceGroup;
pub use identifier::FriendlyIdentifier;
pub use resource::{ContactTimes, Resource, ResourceKind};
