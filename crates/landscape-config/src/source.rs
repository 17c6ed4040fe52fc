// ── File-backed configuration source ──
//
// Reads the landscape, topology and credentials documents named in the
// settings. Paths are read on every load; the configuration layer only
// loads once per landscape.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use landscape_core::{
    ConfigurationSource, CoreError, CredentialTable, Landscape, LandscapeSettings,
    register_landscape_factory,
};

use crate::{ConfigError, credential_table, parse_document};

/// Flavor name of the file-backed singleton factory.
pub const FILES_FLAVOR: &str = "files";

#[derive(Debug, Clone)]
pub struct FileConfigurationSource {
    landscape_file: PathBuf,
    topology_file: Option<PathBuf>,
    credentials_file: Option<PathBuf>,
}

impl FileConfigurationSource {
    pub fn new(landscape_file: impl Into<PathBuf>) -> Self {
        Self {
            landscape_file: landscape_file.into(),
            topology_file: None,
            credentials_file: None,
        }
    }

    pub fn with_topology(mut self, path: impl Into<PathBuf>) -> Self {
        self.topology_file = Some(path.into());
        self
    }

    pub fn with_credentials(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Source for the document paths in `settings`. A landscape file is required.
    pub fn from_settings(settings: &LandscapeSettings) -> Result<Self, ConfigError> {
        let Some(ref landscape_file) = settings.landscape_file else {
            return Err(ConfigError::Validation {
                field: "landscape_file".into(),
                reason: "no landscape document configured".into(),
            });
        };

        Ok(Self {
            landscape_file: landscape_file.clone(),
            topology_file: settings.topology_file.clone(),
            credentials_file: settings.credentials_file.clone(),
        })
    }

    pub fn landscape_file(&self) -> &Path {
        &self.landscape_file
    }
}

async fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let text = tokio::fs::read_to_string(path).await?;
    let document = parse_document(path, &text)?;
    debug!(path = %path.display(), "read document");
    Ok(document)
}

impl ConfigurationSource for FileConfigurationSource {
    fn load_landscape(&self) -> BoxFuture<'_, Result<Value, CoreError>> {
        Box::pin(async move { Ok(read_document(&self.landscape_file).await?) })
    }

    fn load_topology(&self) -> BoxFuture<'_, Result<Option<Value>, CoreError>> {
        Box::pin(async move {
            match self.topology_file {
                Some(ref path) => Ok(Some(read_document(path).await?)),
                None => Ok(None),
            }
        })
    }

    fn load_credentials(&self) -> BoxFuture<'_, Result<CredentialTable, CoreError>> {
        Box::pin(async move {
            let Some(ref path) = self.credentials_file else {
                return Ok(CredentialTable::default());
            };
            let document = read_document(path).await?;

            // Keyring lookups block.
            let table = tokio::task::spawn_blocking(move || credential_table(&document))
                .await
                .map_err(|e| CoreError::configuration(format!("credential loading aborted: {e}")))??;
            info!(path = %path.display(), count = table.len(), "loaded credentials");
            Ok(table)
        })
    }
}

// ── Landscape construction ──────────────────────────────────────────

/// Build a landscape from settings, reading documents from the configured
/// files when a landscape file is set.
pub fn build_landscape(settings: &LandscapeSettings) -> Result<Landscape, CoreError> {
    let builder = Landscape::builder().settings(settings.clone());
    if settings.landscape_file.is_some() {
        let source = FileConfigurationSource::from_settings(settings)?;
        builder.source(source).build()
    } else {
        builder.build()
    }
}

fn files_factory(settings: &LandscapeSettings) -> Result<Landscape, CoreError> {
    let source = FileConfigurationSource::from_settings(settings)?;
    Landscape::builder()
        .settings(settings.clone())
        .source(source)
        .build()
}

/// Make the `"files"` flavor available to `landscape_singleton`.
pub fn register_file_factory() -> Result<(), CoreError> {
    register_landscape_factory(FILES_FLAVOR, files_factory)
}
