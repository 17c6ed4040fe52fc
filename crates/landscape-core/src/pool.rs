// ── Operational resource pool ──
//
// Available/outstanding partition of devices and clusters. Every operation
// validates first and mutates after, so a failed call leaves both sets as
// they were. Nodes of an outstanding cluster belong to that cluster until
// the cluster is checked in. Callers hold the landscape lock around every
// call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::CoreError;
use crate::model::{DeviceCluster, Resource};

/// Identities in each pool, for display and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub available: Vec<String>,
    pub outstanding: Vec<String>,
    pub clusters_available: Vec<String>,
    pub clusters_outstanding: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct ResourcePool {
    available: BTreeMap<String, Arc<Resource>>,
    outstanding: BTreeMap<String, Arc<Resource>>,
    clusters: BTreeMap<String, Arc<DeviceCluster>>,
    clusters_outstanding: BTreeSet<String>,
    /// Node identity → the outstanding cluster holding it.
    held_by: BTreeMap<String, String>,
}

impl ResourcePool {
    pub(crate) fn seed(
        devices: impl IntoIterator<Item = Arc<Resource>>,
        clusters: BTreeMap<String, Arc<DeviceCluster>>,
    ) -> Self {
        Self {
            available: devices.into_iter().map(|d| (d.identity(), d)).collect(),
            outstanding: BTreeMap::new(),
            clusters,
            clusters_outstanding: BTreeSet::new(),
            held_by: BTreeMap::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            available: self.available.keys().cloned().collect(),
            outstanding: self.outstanding.keys().cloned().collect(),
            clusters_available: self
                .clusters
                .keys()
                .filter(|name| !self.clusters_outstanding.contains(*name))
                .cloned()
                .collect(),
            clusters_outstanding: self.clusters_outstanding.iter().cloned().collect(),
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub(crate) fn checkout_device(&mut self, identity: &str) -> Result<Arc<Resource>, CoreError> {
        let Some(device) = self.available.remove(identity) else {
            return Err(CoreError::Checkout {
                message: format!(
                    "Device '{identity}' is not available for checkout.\n{}",
                    self.describe_pools()
                ),
            });
        };
        self.outstanding.insert(identity.to_owned(), Arc::clone(&device));
        Ok(device)
    }

    pub(crate) fn checkin_device(&mut self, identity: &str) -> Result<(), CoreError> {
        if let Some(cluster) = self.held_by.get(identity) {
            return Err(CoreError::Checkin {
                message: format!(
                    "Device '{identity}' is held by cluster '{cluster}'; check in the cluster instead.\n{}",
                    self.describe_pools()
                ),
            });
        }
        let Some(device) = self.outstanding.remove(identity) else {
            return Err(CoreError::Checkin {
                message: format!(
                    "Device '{identity}' was not checked out.\n{}",
                    self.describe_pools()
                ),
            });
        };
        self.available.insert(identity.to_owned(), device);
        Ok(())
    }

    // ── Clusters ─────────────────────────────────────────────────────

    pub(crate) fn checkout_cluster(&mut self, name: &str) -> Result<Arc<DeviceCluster>, CoreError> {
        let Some(cluster) = self.clusters.get(name).cloned() else {
            let existing: Vec<&str> = self.clusters.keys().map(String::as_str).collect();
            return Err(CoreError::Checkout {
                message: format!(
                    "Cluster '{name}' does not exist. EXISTING: {}",
                    existing.join(", ")
                ),
            });
        };

        if self.clusters_outstanding.contains(name) {
            return Err(CoreError::Checkout {
                message: format!("Cluster '{name}' has already been checked out."),
            });
        }

        let unavailable: Vec<&str> = cluster
            .nodes()
            .keys()
            .filter(|id| !self.available.contains_key(*id))
            .map(String::as_str)
            .collect();
        if !unavailable.is_empty() {
            return Err(CoreError::Checkout {
                message: format!(
                    "Cluster '{name}' is not available for checkout.\nUNAVAILABLE NODES:\n{}",
                    indented(unavailable)
                ),
            });
        }

        for id in cluster.nodes().keys() {
            if let Some(device) = self.available.remove(id) {
                self.outstanding.insert(id.clone(), device);
                self.held_by.insert(id.clone(), name.to_owned());
            }
        }
        self.clusters_outstanding.insert(name.to_owned());
        Ok(cluster)
    }

    pub(crate) fn checkin_cluster(&mut self, name: &str) -> Result<(), CoreError> {
        let cluster = match self.clusters.get(name) {
            Some(cluster) if self.clusters_outstanding.contains(name) => Arc::clone(cluster),
            _ => {
                return Err(CoreError::Checkin {
                    message: format!(
                        "Cluster '{name}' was not checked out.\n{}",
                        self.describe_pools()
                    ),
                });
            }
        };

        for id in cluster.nodes().keys() {
            if self.held_by.get(id).is_some_and(|owner| owner == name) {
                self.held_by.remove(id);
                if let Some(device) = self.outstanding.remove(id) {
                    self.available.insert(id.clone(), device);
                }
            }
        }
        self.clusters_outstanding.remove(name);
        Ok(())
    }

    fn describe_pools(&self) -> String {
        format!(
            "AVAILABLE POOL:\n{}\nOUTSTANDING POOL:\n{}",
            indented(self.available.keys().map(String::as_str)),
            indented(self.outstanding.keys().map(String::as_str))
        )
    }
}

fn indented<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|item| format!("    {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
