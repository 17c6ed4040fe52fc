//! `landscape inventory`: integrated devices and services.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use tracing::warn;

use landscape_core::{Landscape, Resource, ResourceFilter, ResourceKind};

use crate::cli::{GlobalOpts, InventoryArgs, InventoryKind};
use crate::error::CliError;
use crate::output;

use super::activation_params;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ResourceView {
    identity: String,
    kind: ResourceKind,
    resource_type: String,
    host: Option<String>,
    group: String,
    role: Option<String>,
    extensions: Vec<String>,
}

impl From<&Arc<Resource>> for ResourceView {
    fn from(r: &Arc<Resource>) -> Self {
        Self {
            identity: r.identity(),
            kind: r.kind(),
            resource_type: r.resource_type().to_owned(),
            host: r.host().map(str::to_owned),
            group: r.group().to_owned(),
            role: r.role().map(str::to_owned),
            extensions: r.extension_kinds().iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Type")]
    rtype: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Extensions")]
    extensions: String,
}

impl From<&ResourceView> for ResourceRow {
    fn from(v: &ResourceView) -> Self {
        Self {
            identity: v.identity.clone(),
            kind: v.kind.to_string(),
            rtype: v.resource_type.clone(),
            host: v.host.clone().unwrap_or_default(),
            group: v.group.clone(),
            role: v.role.clone().unwrap_or_default(),
            extensions: v
                .extensions
                .iter()
                .map(|e| e.trim_start_matches("extension/"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

// ── Filters ─────────────────────────────────────────────────────────

/// `type=linux`, `group=rack-a`, `name=node1`, `role=primary`, or
/// `type=linux,role=primary`.
pub fn parse_filter(spec: &str) -> Result<ResourceFilter, CliError> {
    let invalid = |reason: &str| CliError::Validation {
        field: "filter".into(),
        reason: format!("'{spec}': {reason}"),
    };

    let mut resource_type = None;
    let mut role = None;
    let mut single = None;

    for part in spec.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| invalid("expected key=value"))?;
        let value = value.trim().to_owned();
        match key.trim() {
            "type" => resource_type = Some(value),
            "role" => role = Some(value),
            "group" => single = Some(ResourceFilter::ByGroup(value)),
            "name" => single = Some(ResourceFilter::ByName(value)),
            other => return Err(invalid(&format!("unknown key '{other}'"))),
        }
    }

    match (resource_type, role, single) {
        (Some(resource_type), Some(role), None) => Ok(ResourceFilter::ByTypeAndRole {
            resource_type,
            role,
        }),
        (Some(resource_type), None, None) => Ok(ResourceFilter::ByType(resource_type)),
        (None, Some(role), None) => Ok(ResourceFilter::ByRole(role)),
        (None, None, Some(filter)) => Ok(filter),
        _ => Err(invalid("only type and role combine")),
    }
}

fn parse_filters(specs: &[String]) -> Result<Vec<ResourceFilter>, CliError> {
    specs.iter().map(|s| parse_filter(s)).collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    landscape: &Landscape,
    args: InventoryArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let include = parse_filters(&args.include)?;
    let exclude = parse_filters(&args.exclude)?;

    landscape
        .activate_integration(&activation_params(&args.activation))
        .await?;

    let mut resources = Vec::new();
    if matches!(args.kind, InventoryKind::All | InventoryKind::Devices) {
        resources.extend(landscape.select_devices(&include, &exclude));
    }
    if matches!(args.kind, InventoryKind::All | InventoryKind::Services) {
        resources.extend(landscape.select_services(&include, &exclude));
    }

    for skipped in landscape.unrecognized() {
        warn!(key = %skipped.key, "no coupling for declaration");
    }
    for failed in landscape.failed() {
        warn!(key = %failed.key, host = ?failed.host, "resource failed: {}", failed.message);
    }

    let views: Vec<ResourceView> = resources.iter().map(ResourceView::from).collect();
    let out = output::render_list(&global.output, &views, |v| ResourceRow::from(v), |v| {
        v.identity.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn type_and_role_combine() {
        assert_eq!(
            parse_filter("type=linux,role=primary").unwrap(),
            ResourceFilter::ByTypeAndRole {
                resource_type: "linux".into(),
                role: "primary".into()
            }
        );
        assert_eq!(
            parse_filter("group=rack-a").unwrap(),
            ResourceFilter::ByGroup("rack-a".into())
        );
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(parse_filter("linux").is_err());
        assert!(parse_filter("colour=red").is_err());
        assert!(parse_filter("group=a,name=b").is_err());
    }
}
