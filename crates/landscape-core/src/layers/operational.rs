// ── Operational layer ──
//
// Brings integrated coordinators online, checks connectivity, overlays the
// cluster topology on the device groups, and validates the result. The
// checkout pool itself is seeded by the landscape under its lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::config::ActivationParams;
use crate::coordinator::CoordinatorRole;
use crate::error::CoreError;
use crate::model::{DeviceCluster, ExtensionKind};

use super::{DeclaredLandscape, IntegratedLandscape};

const ACTIVATION_ORDER: [CoordinatorRole; 4] = [
    CoordinatorRole::Power,
    CoordinatorRole::Serial,
    CoordinatorRole::Device,
    CoordinatorRole::Service,
];

#[derive(Default)]
pub struct OperationalLayer {
    clusters: OnceLock<BTreeMap<String, Arc<DeviceCluster>>>,
}

impl OperationalLayer {
    pub fn clusters(&self) -> Option<&BTreeMap<String, Arc<DeviceCluster>>> {
        self.clusters.get()
    }

    pub(crate) async fn activate(
        &self,
        declared: &DeclaredLandscape,
        integrated: &IntegratedLandscape,
        params: &ActivationParams,
    ) -> Result<BTreeMap<String, Arc<DeviceCluster>>, CoreError> {
        for role in ACTIVATION_ORDER {
            for coordinator in integrated.coordinators(role) {
                coordinator.activate(params).await?;
            }
        }

        for coordinator in integrated.coordinators(CoordinatorRole::Device) {
            let reports = coordinator.establish_connectivity(params).await?;
            for report in reports {
                if report.is_ok() {
                    debug!(host = %report.host, ip = ?report.ip, "device reachable");
                } else {
                    warn!(
                        host = %report.host,
                        status = ?report.status,
                        error = report.error.as_deref().unwrap_or(""),
                        "device did not answer the connectivity probe"
                    );
                }
            }
        }

        let clusters = overlay_topology(declared, integrated)?;

        if params.validate_features {
            validate_features(integrated);
        }
        if params.validate_topology {
            validate_topology(&clusters)?;
        }

        info!(clusters = clusters.len(), "landscape operational");
        let _ = self.clusters.set(clusters.clone());
        Ok(clusters)
    }
}

fn overlay_topology(
    declared: &DeclaredLandscape,
    integrated: &IntegratedLandscape,
) -> Result<BTreeMap<String, Arc<DeviceCluster>>, CoreError> {
    let mut clusters = BTreeMap::new();

    for decl in &declared.clusters {
        let group = integrated.device_group(&decl.group).ok_or_else(|| {
            CoreError::configuration(format!(
                "Cluster '{}' references unknown device group '{}'.",
                decl.name, decl.group
            ))
        })?;
        if clusters.contains_key(&decl.name) {
            return Err(CoreError::configuration(format!(
                "Cluster '{}' is declared more than once.",
                decl.name
            )));
        }

        let cluster = group.coordinator()?.create_cluster(decl, Arc::clone(&group))?;
        debug!(
            cluster = %decl.name,
            group = %decl.group,
            nodes = cluster.nodes().len(),
            spares = cluster.spares().len(),
            "built cluster"
        );
        clusters.insert(decl.name.clone(), Arc::new(cluster));
    }

    Ok(clusters)
}

/// Devices declaring a feature without the matching extension are logged.
fn validate_features(integrated: &IntegratedLandscape) {
    for device in integrated.devices() {
        for (feature, kind) in [("power", ExtensionKind::Power), ("serial", ExtensionKind::Serial)] {
            if device.declaration().has_feature(feature) && device.extension(kind).is_none() {
                warn!(
                    device = %device.identity(),
                    feature,
                    "device declares a feature with no matching extension"
                );
            }
        }
    }
}

/// A device may belong to at most one cluster, and only once within it.
fn validate_topology(clusters: &BTreeMap<String, Arc<DeviceCluster>>) -> Result<(), CoreError> {
    let mut membership: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut doubled = Vec::new();
    for (name, cluster) in clusters {
        for identity in cluster.member_identities() {
            membership.entry(identity).or_default().insert(name.as_str());
        }
        doubled.extend(
            cluster
                .nodes()
                .keys()
                .filter(|id| cluster.spares().contains_key(*id))
                .map(|id| format!("    {id}: {name}")),
        );
    }

    let mut problems = Vec::new();
    let conflicts: Vec<String> = membership
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .map(|(identity, owners)| {
            let owners: Vec<&str> = owners.into_iter().collect();
            format!("    {identity}: {}", owners.join(", "))
        })
        .collect();
    if !conflicts.is_empty() {
        problems.push(format!(
            "Devices belong to more than one cluster:\n{}",
            conflicts.join("\n")
        ));
    }
    if !doubled.is_empty() {
        problems.push(format!(
            "Devices are both a node and a spare of the same cluster:\n{}",
            doubled.join("\n")
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CoreError::configuration(problems.join("\n")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{ClusterDeclaration, ResourceDeclaration};
    use crate::model::{DeviceGroup, FriendlyIdentifier, Resource, ResourceKind};

    fn group() -> Arc<DeviceGroup> {
        let devices = ["n1", "n2", "n3"]
            .into_iter()
            .map(|host| {
                let decl = ResourceDeclaration {
                    resource_type: "linux".into(),
                    host: Some(host.into()),
                    group: "rack".into(),
                    ..ResourceDeclaration::default()
                };
                Arc::new(Resource::new(
                    ResourceKind::Device,
                    FriendlyIdentifier::new(host, host),
                    decl,
                ))
            })
            .collect();
        Arc::new(DeviceGroup::new("rack", devices).unwrap())
    }

    fn cluster(name: &str, nodes: &[&str], spares: &[&str]) -> (String, Arc<DeviceCluster>) {
        let decl = ClusterDeclaration {
            name: name.into(),
            group: "rack".into(),
            nodes: nodes.iter().map(ToString::to_string).collect(),
            spares: spares.iter().map(ToString::to_string).collect(),
        };
        let cluster = DeviceCluster::from_declaration(&decl, group()).unwrap();
        (name.to_owned(), Arc::new(cluster))
    }

    #[test]
    fn node_and_spare_of_one_cluster_is_reported_once() {
        let clusters = BTreeMap::from([cluster("c1", &["n1", "n2"], &["n2"])]);
        let message = validate_topology(&clusters).unwrap_err().to_string();

        assert!(message.contains("both a node and a spare of the same cluster:\n    n2: c1"));
        assert!(!message.contains("more than one cluster"));
        assert!(!message.contains("c1, c1"));
    }

    #[test]
    fn shared_device_names_each_cluster_once() {
        let clusters = BTreeMap::from([
            cluster("c1", &["n1", "n2"], &[]),
            cluster("c2", &["n2"], &["n3"]),
        ]);
        let message = validate_topology(&clusters).unwrap_err().to_string();
        assert!(message.contains("more than one cluster:\n    n2: c1, c2"));
    }

    #[test]
    fn disjoint_clusters_pass() {
        let clusters = BTreeMap::from([
            cluster("c1", &["n1"], &["n2"]),
            cluster("c2", &["n3"], &[]),
        ]);
        assert!(validate_topology(&clusters).is_ok());
    }
}
