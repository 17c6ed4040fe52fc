// ── Landscape layers ──
//
// The four sequentially dependent managers a landscape delegates to:
// installation, configuration, integration and operations.

mod configuration;
mod installation;
mod integration;
mod operational;

pub use configuration::{
    ConfigurationLayer, ConfigurationSource, DeclaredLandscape, StaticConfiguration,
};
pub use installation::InstallationLayer;
pub use integration::{
    FailedResource, IntegratedLandscape, IntegrationLayer, UnrecognizedDeclaration,
};
pub use operational::OperationalLayer;
