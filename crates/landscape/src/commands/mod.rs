//! Command dispatch: bridges CLI args -> landscape stages -> output formatting.

pub mod config_cmd;
pub mod inventory;
pub mod pool;
pub mod run;
pub mod validate;
pub mod verify;

use std::path::PathBuf;

use landscape_config::{FILES_FLAVOR, config_path, load_settings_from, register_file_factory};
use landscape_core::singleton::DEFAULT_FLAVOR;
use landscape_core::{ActivationParams, Landscape, LandscapeSettings, landscape_singleton};

use crate::cli::{ActivationArgs, Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a landscape-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    landscape: &Landscape,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Validate => validate::handle(landscape, global).await,
        Command::Inventory(args) => inventory::handle(landscape, args, global).await,
        Command::Verify(args) => verify::handle(landscape, args, global).await,
        Command::Pool(args) => pool::handle(landscape, args, global).await,
        // Run, Config and Completions are handled before dispatch
        Command::Run(_) | Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

// ── Settings & landscape ─────────────────────────────────────────────

pub fn settings_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Settings from file and environment, with document paths from flags on top.
pub fn resolve_settings(global: &GlobalOpts) -> Result<LandscapeSettings, CliError> {
    let mut settings = load_settings_from(&settings_path(global))?;

    if let Some(ref path) = global.landscape {
        settings.landscape_file = Some(path.clone());
    }
    if let Some(ref path) = global.topology {
        settings.topology_file = Some(path.clone());
    }
    if let Some(ref path) = global.credentials {
        settings.credentials_file = Some(path.clone());
    }
    Ok(settings)
}

/// The process landscape, built from the file-backed flavor.
pub fn open_landscape(global: &GlobalOpts) -> Result<&'static Landscape, CliError> {
    let mut settings = resolve_settings(global)?;
    if settings.landscape_file.is_none() {
        return Err(CliError::NoLandscape {
            path: settings_path(global).display().to_string(),
        });
    }
    if settings.flavor == DEFAULT_FLAVOR {
        settings.flavor = FILES_FLAVOR.into();
    }

    register_file_factory()?;
    Ok(landscape_singleton(&settings)?)
}

pub fn activation_params(args: &ActivationArgs) -> ActivationParams {
    ActivationParams {
        disable_device_activation: args.disable_devices,
        disable_service_activation: args.disable_services,
        validate_features: !args.no_feature_check,
        validate_topology: !args.no_topology_check,
    }
}
