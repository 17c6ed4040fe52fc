// ── Installation layer ──
//
// Holds the coupling types known to this landscape, keyed by integration key.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::coordinator::CoordinatorCoupling;
use crate::error::CoreError;

#[derive(Default)]
pub struct InstallationLayer {
    couplings: BTreeMap<String, Arc<dyn CoordinatorCoupling>>,
}

impl InstallationLayer {
    pub fn install(&mut self, coupling: Arc<dyn CoordinatorCoupling>) -> Result<(), CoreError> {
        let key = coupling.integration_key();
        if self.couplings.contains_key(&key) {
            return Err(CoreError::semantic(format!(
                "A coordinator coupling for '{key}' is already installed."
            )));
        }
        debug!(key = %key, role = %coupling.role(), "installed coupling");
        self.couplings.insert(key, coupling);
        Ok(())
    }

    pub fn coupling(&self, key: &str) -> Option<&Arc<dyn CoordinatorCoupling>> {
        self.couplings.get(key)
    }

    pub fn couplings(&self) -> impl Iterator<Item = (&str, &Arc<dyn CoordinatorCoupling>)> {
        self.couplings.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn keys(&self) -> Vec<String> {
        self.couplings.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.couplings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.couplings.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::coordinator::StandardCoupling;

    #[test]
    fn same_key_twice_is_a_semantic_error() {
        let mut layer = InstallationLayer::default();
        layer
            .install(Arc::new(StandardCoupling::device("nodes", "linux", false)))
            .unwrap();

        let err = layer
            .install(Arc::new(StandardCoupling::device("nodes", "linux", true)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Semantic { .. }));
        assert_eq!(layer.keys(), ["apod:nodes:deviceType:linux"]);
    }
}
