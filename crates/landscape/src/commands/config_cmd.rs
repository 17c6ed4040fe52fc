//! Config subcommand handlers.

use landscape_config::{FILES_FLAVOR, save_settings, store_password};
use landscape_core::LandscapeSettings;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{resolve_settings, settings_path};

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn render_settings(
    format: &OutputFormat,
    settings: &LandscapeSettings,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            toml::to_string_pretty(settings).map_err(|e| CliError::Settings {
                message: format!("failed to serialize settings: {e}"),
            })
        }
        other => Ok(output::render_single(
            other,
            settings,
            |_| String::new(),
            |_| String::new(),
        )),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = settings_path(global);
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!(
                        "{} already exists; pass --force to replace it",
                        path.display()
                    ),
                });
            }

            let mut settings = LandscapeSettings {
                landscape_file: global.landscape.clone(),
                topology_file: global.topology.clone(),
                credentials_file: global.credentials.clone(),
                ..LandscapeSettings::default()
            };
            if settings.landscape_file.is_some() {
                settings.flavor = FILES_FLAVOR.into();
            }

            save_settings(&settings, &path)?;
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let settings = resolve_settings(global)?;
            output::print_output(&render_settings(&global.output, &settings)?, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&settings_path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword { identifier } => {
            let password = rpassword::prompt_password(format!("Password for '{identifier}': "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            store_password(&identifier, &password)?;
            if !global.quiet {
                eprintln!("Stored password for '{identifier}' in the system keyring");
            }
            Ok(())
        }
    }
}
