//! File-backed configuration for the lab landscape.
//!
//! TOML settings (defaults + file + `LANDSCAPE_*` environment), landscape
//! and topology documents in YAML/JSON/TOML, and credential documents whose
//! passwords resolve through env var, keyring, then plaintext. The
//! [`FileConfigurationSource`] hands all of it to `landscape_core` through
//! its `ConfigurationSource` trait.

mod source;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use landscape_core::{Credential, CoreError, CredentialTable, LandscapeSettings};

pub use source::{FILES_FLAVOR, FileConfigurationSource, build_landscape, register_file_factory};

/// Keyring service name for stored credential passwords.
pub const KEYRING_SERVICE: &str = "landscape";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to parse {}: {reason}", path.display())]
    Document { path: PathBuf, reason: String },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Core(inner) => inner,
            other => CoreError::configuration(other.to_string()),
        }
    }
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "landscape", "landscape").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("settings.toml");
            p
        },
        |dirs| dirs.config_dir().join("settings.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("landscape");
    p
}

// ── Settings loading ────────────────────────────────────────────────

/// Load settings from the canonical path plus environment.
pub fn load_settings() -> Result<LandscapeSettings, ConfigError> {
    load_settings_from(&config_path())
}

/// Defaults, then the TOML file at `path` (if present), then
/// `LANDSCAPE_*` variables with `__` separating nested keys.
pub fn load_settings_from(path: &Path) -> Result<LandscapeSettings, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(LandscapeSettings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LANDSCAPE_").split("__"));

    let settings: LandscapeSettings = figment.extract()?;
    debug!(path = %path.display(), flavor = %settings.flavor, "loaded settings");
    Ok(settings)
}

/// Serialize settings to TOML and write them to `path`.
pub fn save_settings(settings: &LandscapeSettings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Documents ───────────────────────────────────────────────────────

/// Parse a document by its file extension. An empty document reads as `{}`.
pub fn parse_document(path: &Path, text: &str) -> Result<Value, ConfigError> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase);

    let parsed: Result<Value, String> = match extension.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        Some("json") => serde_json::from_str(text).map_err(|e| e.to_string()),
        Some("toml") => toml::from_str(text).map_err(|e| e.to_string()),
        _ => {
            return Err(ConfigError::Validation {
                field: path.display().to_string(),
                reason: "expected a .yaml, .yml, .json or .toml document".into(),
            });
        }
    };

    match parsed {
        Ok(Value::Null) => Ok(Value::Object(serde_json::Map::new())),
        Ok(value) => Ok(value),
        Err(reason) => Err(ConfigError::Document {
            path: path.to_path_buf(),
            reason,
        }),
    }
}

/// Read and parse a document from disk.
pub fn load_document(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_document(path, &text)
}

// ── Credentials ─────────────────────────────────────────────────────

/// Top-level shape of a credentials document.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CredentialsDocument {
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

/// One credential as written in a credentials document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialEntry {
    pub identifier: String,

    /// Protocol categories, e.g. `ssh`, `power`.
    #[serde(default)]
    pub categories: Vec<String>,

    pub username: Option<String>,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    pub keyfile: Option<PathBuf>,
}

impl CredentialEntry {
    /// Resolve the password from the credential chain.
    pub fn resolve_password(&self) -> Option<SecretString> {
        // 1. Named env var
        if let Some(ref env_name) = self.password_env {
            if let Ok(val) = std::env::var(env_name) {
                return Some(SecretString::from(val));
            }
        }

        // 2. System keyring
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_key(&self.identifier)) {
            if let Ok(secret) = entry.get_password() {
                return Some(SecretString::from(secret));
            }
        }

        // 3. Plaintext in document
        self.password.clone().map(SecretString::from)
    }

    pub fn into_credential(self) -> Credential {
        let password = self.resolve_password();
        Credential {
            identifier: self.identifier,
            categories: self.categories,
            username: self.username,
            password,
            keyfile: self.keyfile,
        }
    }
}

fn keyring_key(identifier: &str) -> String {
    format!("{identifier}/password")
}

/// Store a credential password in the system keyring.
pub fn store_password(identifier: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_key(identifier))?;
    entry.set_password(password)?;
    Ok(())
}

/// Build the credential table from a parsed credentials document.
pub fn credential_table(document: &Value) -> Result<CredentialTable, ConfigError> {
    let parsed: CredentialsDocument =
        serde_json::from_value(document.clone()).map_err(|e| ConfigError::Validation {
            field: "credentials".into(),
            reason: e.to_string(),
        })?;

    let credentials = parsed
        .credentials
        .into_iter()
        .map(CredentialEntry::into_credential)
        .collect();
    Ok(CredentialTable::from_credentials(credentials)?)
}

/// Read a credentials document from disk into a credential table.
pub fn load_credentials(path: &Path) -> Result<CredentialTable, ConfigError> {
    credential_table(&load_document(path)?)
}
