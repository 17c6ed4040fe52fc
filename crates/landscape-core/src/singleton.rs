// ── Process-wide landscape ──
//
// Factories are registered by flavor name before first use; the first
// call to `landscape_singleton` builds the instance with the factory named
// by `settings.flavor`. The instance is never replaced or torn down for
// the rest of the process.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::info;

use crate::config::LandscapeSettings;
use crate::error::CoreError;
use crate::landscape::Landscape;

/// Builds a landscape from settings.
pub type LandscapeFactory = fn(&LandscapeSettings) -> Result<Landscape, CoreError>;

pub const DEFAULT_FLAVOR: &str = "default";

static FACTORIES: OnceLock<Mutex<BTreeMap<String, LandscapeFactory>>> = OnceLock::new();
static LANDSCAPE: OnceLock<Landscape> = OnceLock::new();
static INIT: Mutex<()> = Mutex::new(());

fn factories() -> &'static Mutex<BTreeMap<String, LandscapeFactory>> {
    FACTORIES.get_or_init(|| {
        let mut table: BTreeMap<String, LandscapeFactory> = BTreeMap::new();
        table.insert(DEFAULT_FLAVOR.to_owned(), default_factory);
        Mutex::new(table)
    })
}

fn default_factory(settings: &LandscapeSettings) -> Result<Landscape, CoreError> {
    Landscape::builder().settings(settings.clone()).build()
}

/// Register a factory under `name`. Names are claimed once.
pub fn register_landscape_factory(
    name: impl Into<String>,
    factory: LandscapeFactory,
) -> Result<(), CoreError> {
    let name = name.into();
    let mut table = factories().lock().unwrap_or_else(PoisonError::into_inner);
    if table.contains_key(&name) {
        return Err(CoreError::semantic(format!(
            "A landscape factory named '{name}' is already registered."
        )));
    }
    table.insert(name, factory);
    Ok(())
}

pub fn registered_flavors() -> Vec<String> {
    factories()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect()
}

/// The process-wide landscape, built on first call. Later calls ignore
/// `settings` and return the same instance.
pub fn landscape_singleton(settings: &LandscapeSettings) -> Result<&'static Landscape, CoreError> {
    if let Some(landscape) = LANDSCAPE.get() {
        return Ok(landscape);
    }

    let _init = INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(landscape) = LANDSCAPE.get() {
        return Ok(landscape);
    }

    let factory = {
        let table = factories().lock().unwrap_or_else(PoisonError::into_inner);
        table.get(&settings.flavor).copied().ok_or_else(|| {
            let names: Vec<&str> = table.keys().map(String::as_str).collect();
            CoreError::configuration(format!(
                "No landscape factory is registered for flavor '{}'. REGISTERED: {}",
                settings.flavor,
                names.join(", ")
            ))
        })?
    };

    let landscape = factory(settings)?;
    info!(flavor = %settings.flavor, "created process landscape");
    Ok(LANDSCAPE.get_or_init(|| landscape))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lab_factory(settings: &LandscapeSettings) -> Result<Landscape, CoreError> {
        let mut settings = settings.clone();
        settings.couplings.clear();
        Landscape::builder().settings(settings).build()
    }

    // The only test in this crate that touches process-wide state.
    #[test]
    fn singleton_is_built_once_from_the_named_flavor() {
        register_landscape_factory("lab", lab_factory).unwrap();
        assert!(register_landscape_factory("lab", lab_factory).is_err());
        assert!(registered_flavors().contains(&DEFAULT_FLAVOR.to_owned()));

        let missing = LandscapeSettings {
            flavor: "nope".into(),
            ..LandscapeSettings::default()
        };
        assert!(landscape_singleton(&missing).unwrap_err().is_configuration());

        let settings = LandscapeSettings {
            flavor: "lab".into(),
            ..LandscapeSettings::default()
        };
        let first = landscape_singleton(&settings).unwrap();
        assert!(first.installation().is_empty());

        let second = landscape_singleton(&LandscapeSettings::default()).unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
