// ── Resource filters ──
//
// Include/exclude selection over integrated resources.

use std::sync::Arc;

use crate::model::Resource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    ByType(String),
    ByTypeAndRole { resource_type: String, role: String },
    ByGroup(String),
    ByName(String),
    ByRole(String),
}

impl ResourceFilter {
    pub fn matches(&self, resource: &Resource) -> bool {
        match self {
            Self::ByType(t) => resource.resource_type() == t,
            Self::ByTypeAndRole {
                resource_type,
                role,
            } => resource.resource_type() == resource_type && resource.role() == Some(role.as_str()),
            Self::ByGroup(g) => resource.group() == g,
            Self::ByName(n) => resource.name() == *n,
            Self::ByRole(r) => resource.role() == Some(r.as_str()),
        }
    }
}

/// Keep resources matching any include filter (all when `include` is empty),
/// then drop those matching any exclude filter. Order is preserved.
pub fn select(
    resources: impl IntoIterator<Item = Arc<Resource>>,
    include: &[ResourceFilter],
    exclude: &[ResourceFilter],
) -> Vec<Arc<Resource>> {
    resources
        .into_iter()
        .filter(|r| include.is_empty() || include.iter().any(|f| f.matches(r)))
        .filter(|r| !exclude.iter().any(|f| f.matches(r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceDeclaration;
    use crate::model::{FriendlyIdentifier, ResourceKind};

    fn device(host: &str, kind: &str, group: &str, role: Option<&str>) -> Arc<Resource> {
        let decl = ResourceDeclaration {
            resource_type: kind.into(),
            host: Some(host.into()),
            group: group.into(),
            role: role.map(Into::into),
            ..ResourceDeclaration::default()
        };
        Arc::new(Resource::new(
            ResourceKind::Device,
            FriendlyIdentifier::new(host, host),
            decl,
        ))
    }

    fn names(selected: &[Arc<Resource>]) -> Vec<String> {
        selected.iter().map(|r| r.identity()).collect()
    }

    #[test]
    fn include_then_exclude() {
        let all = vec![
            device("a", "linux", "rack1", Some("primary")),
            device("b", "linux", "rack1", Some("backup")),
            device("c", "macos", "rack2", None),
        ];

        let linux = select(all.clone(), &[ResourceFilter::ByType("linux".into())], &[]);
        assert_eq!(names(&linux), ["a", "b"]);

        let no_backup = select(
            all.clone(),
            &[],
            &[ResourceFilter::ByRole("backup".into())],
        );
        assert_eq!(names(&no_backup), ["a", "c"]);

        let typed_role = select(
            all,
            &[
                ResourceFilter::ByTypeAndRole {
                    resource_type: "linux".into(),
                    role: "backup".into(),
                },
                ResourceFilter::ByGroup("rack2".into()),
            ],
            &[ResourceFilter::ByName("c".into())],
        );
        assert_eq!(names(&typed_role), ["b"]);
    }
}
