// ── DeviceCluster ──
//
// Topology overlay: a named set of nodes and spares drawn from one device
// group. Nodes and spares are keyed by identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ClusterDeclaration;
use crate::error::CoreError;
use crate::model::{DeviceGroup, Resource};

#[derive(Debug, Clone)]
pub struct DeviceCluster {
    name: String,
    nodes: BTreeMap<String, Arc<Resource>>,
    spares: BTreeMap<String, Arc<Resource>>,
    group: Arc<DeviceGroup>,
}

impl DeviceCluster {
    pub fn new(
        name: impl Into<String>,
        nodes: BTreeMap<String, Arc<Resource>>,
        spares: BTreeMap<String, Arc<Resource>>,
        group: Arc<DeviceGroup>,
    ) -> Self {
        Self {
            name: name.into(),
            nodes,
            spares,
            group,
        }
    }

    /// Resolve a topology declaration against the members of its group.
    pub fn from_declaration(
        decl: &ClusterDeclaration,
        group: Arc<DeviceGroup>,
    ) -> Result<Self, CoreError> {
        if decl.group != group.label() {
            return Err(CoreError::semantic(format!(
                "Cluster '{}' declares group '{}' but was given group '{}'.",
                decl.name,
                decl.group,
                group.label()
            )));
        }

        let nodes = resolve_members(&decl.name, "node", &decl.nodes, &group)?;
        let spares = resolve_members(&decl.name, "spare", &decl.spares, &group)?;
        Ok(Self::new(decl.name.clone(), nodes, spares, group))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &BTreeMap<String, Arc<Resource>> {
        &self.nodes
    }

    pub fn spares(&self) -> &BTreeMap<String, Arc<Resource>> {
        &self.spares
    }

    pub fn group(&self) -> &Arc<DeviceGroup> {
        &self.group
    }

    /// Identities of nodes and spares, in that order.
    pub fn member_identities(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().chain(self.spares.keys()).map(String::as_str)
    }
}

fn resolve_members(
    cluster: &str,
    what: &str,
    keys: &[String],
    group: &DeviceGroup,
) -> Result<BTreeMap<String, Arc<Resource>>, CoreError> {
    let mut resolved = BTreeMap::new();
    let mut unknown = Vec::new();

    for key in keys {
        match group.find_member(key) {
            Some(device) => {
                resolved.insert(device.identity(), device);
            }
            None => unknown.push(key.as_str()),
        }
    }

    if unknown.is_empty() {
        return Ok(resolved);
    }

    let members: Vec<String> = group.members().iter().map(|m| m.identity()).collect();
    Err(CoreError::configuration(format!(
        "Cluster '{cluster}' references unknown {what}s [{}]; group '{}' has [{}].",
        unknown.join(", "),
        group.label(),
        members.join(", ")
    )))
}
