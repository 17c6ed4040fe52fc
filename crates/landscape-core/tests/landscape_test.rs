#![allow(clippy::unwrap_used)]
// End-to-end activation, pool and connectivity tests against in-memory
// declarations. Test coordinators run their "ssh" commands locally.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use landscape_core::coordinator::StandardCoupling;
use landscape_core::{
    ActivationParams, CommandAgent, CommandAspects, ConfigurationSource, Coordinator,
    CoordinatorCore, CoordinatorCoupling, CoordinatorRole, CoreError, Credential, CredentialTable,
    ExtensionKind, Landscape, LandscapePhase, LandscapeSettings, LocalCommandAgent, Resource,
    ResourceDeclaration, ResourceFilter, ResourceKind, SshTarget, StaticConfiguration,
};

// ── Test coordinators ───────────────────────────────────────────────

/// Device coordinator whose SSH extension runs commands on this host.
struct LocalCoordinator {
    core: CoordinatorCore,
    overrides_agent: bool,
}

impl Coordinator for LocalCoordinator {
    fn type_name(&self) -> &'static str {
        "LocalCoordinator"
    }

    fn core(&self) -> &CoordinatorCore {
        &self.core
    }

    fn create_ssh_agent(
        &self,
        _resource: &Arc<Resource>,
        _target: SshTarget,
    ) -> Result<Option<Arc<dyn CommandAgent>>, CoreError> {
        if !self.overrides_agent {
            return Err(CoreError::not_overloaded("create_ssh_agent", self.type_name()));
        }
        Ok(Some(Arc::new(LocalCommandAgent::new(
            self.core.aspects().clone(),
        ))))
    }
}

struct LocalCoupling {
    class: &'static str,
    overrides_agent: bool,
}

impl CoordinatorCoupling for LocalCoupling {
    fn role(&self) -> CoordinatorRole {
        CoordinatorRole::Device
    }

    fn integration_section(&self) -> &str {
        "nodes"
    }

    fn integration_class(&self) -> &str {
        self.class
    }

    fn create_coordinator(&self, landscape: &Landscape) -> Arc<dyn Coordinator> {
        let aspects = CommandAspects::default().with_inactivity_timeout(Duration::from_millis(500));
        let overrides_agent = self.overrides_agent;
        let coordinator: Arc<LocalCoordinator> = Arc::new_cyclic(|weak: &Weak<LocalCoordinator>| {
            let this: Weak<dyn Coordinator> = weak.clone();
            LocalCoordinator {
                core: CoordinatorCore::new(landscape.downgrade(), this, ResourceKind::Device)
                    .with_must_include_ssh(true)
                    .with_aspects(aspects),
                overrides_agent,
            }
        });
        coordinator
    }
}

/// Counts loads and takes a while, so concurrent activations overlap.
struct SlowSource {
    loads: Arc<AtomicUsize>,
    fail: bool,
}

impl ConfigurationSource for SlowSource {
    fn load_landscape(&self) -> BoxFuture<'_, Result<Value, CoreError>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                Err(CoreError::configuration("landscape document is malformed"))
            } else {
                Ok(json!({}))
            }
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn bare_settings() -> LandscapeSettings {
    LandscapeSettings {
        couplings: Vec::new(),
        ..LandscapeSettings::default()
    }
}

fn credentials() -> CredentialTable {
    CredentialTable::from_credentials(vec![
        Credential::new("lab-ssh", &["ssh"]).with_username("tester"),
        Credential::new("pdu-login", &["power"]).with_username("admin"),
    ])
    .unwrap()
}

fn node(host: &str, ip: &str, group: &str) -> Value {
    json!({
        "deviceType": "local",
        "host": host,
        "ipaddr": ip,
        "group": group,
        "credentials": ["lab-ssh"]
    })
}

fn lab_declarations() -> Value {
    let mut node1 = node("node1", "10.0.0.1", "rack-a");
    node1["role"] = json!("primary");
    node1["features"] = json!({ "power": { "interface": "pdu1", "outlet": 1 } });
    let mut node2 = node("node2", "10.0.0.2", "rack-a");
    node2["features"] = json!({ "power": { "interface": "pdu1", "outlet": 2 } });

    json!({
        "apod": {
            "nodes": [
                node1,
                node2,
                node("node3", "10.0.0.3", "rack-a"),
                node("node4", "10.0.0.4", "rack-b"),
                { "deviceType": "macos", "host": "mac1", "credentials": ["lab-ssh"] },
                { "deviceType": "strict", "host": "node9", "ipaddr": "10.0.0.9", "credentials": ["pdu-login"] }
            ],
            "power": [ { "name": "pdu1", "powerType": "dlipower", "host": "pdu1.lab" } ]
        },
        "infrastructure": {
            "services": [ { "serviceType": "dhcp", "host": "dhcp.lab", "ipaddr": "10.0.1.1", "credentials": ["lab-ssh"] } ]
        }
    })
}

fn lab_landscape(topology: Value) -> Landscape {
    Landscape::builder()
        .settings(bare_settings())
        .source(
            StaticConfiguration::new(lab_declarations())
                .with_topology(topology)
                .with_credentials(credentials()),
        )
        .coupling(LocalCoupling {
            class: "local",
            overrides_agent: true,
        })
        .coupling(StandardCoupling::device("nodes", "strict", true))
        .coupling(StandardCoupling::service("dhcp"))
        .coupling(StandardCoupling::power("dlipower"))
        .build()
        .unwrap()
}

fn one_cluster() -> Value {
    json!({
        "clusters": [
            { "name": "c1", "group": "rack-a", "nodes": ["node1", "node2"], "spares": ["node3"] }
        ]
    })
}

fn identities(resources: &[Arc<Resource>]) -> Vec<String> {
    resources.iter().map(|r| r.identity()).collect()
}

// ── Activation ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_configuration_runs_once() {
    let loads = Arc::new(AtomicUsize::new(0));
    let landscape = Landscape::builder()
        .settings(bare_settings())
        .source(SlowSource {
            loads: Arc::clone(&loads),
            fail: false,
        })
        .build()
        .unwrap();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let landscape = landscape.clone();
            tokio::spawn(async move {
                landscape
                    .activate_configuration(&ActivationParams::default())
                    .await?;
                Ok::<_, CoreError>(landscape.phase())
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), LandscapePhase::Configured);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn leader_failure_releases_followers_with_an_error() {
    let loads = Arc::new(AtomicUsize::new(0));
    let landscape = Landscape::builder()
        .settings(bare_settings())
        .source(SlowSource {
            loads: Arc::clone(&loads),
            fail: true,
        })
        .build()
        .unwrap();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let landscape = landscape.clone();
            tokio::spawn(async move {
                landscape
                    .activate_configuration(&ActivationParams::default())
                    .await
            })
        })
        .collect();

    let mut errors = Vec::new();
    for task in tasks {
        errors.push(task.await.unwrap().unwrap_err());
    }
    assert_eq!(errors.iter().filter(|e| e.is_configuration()).count(), 1);
    assert_eq!(
        errors
            .iter()
            .filter(|e| matches!(e, CoreError::ActivationFailed { .. }))
            .count(),
        1
    );

    // The stage never re-runs.
    let again = landscape
        .activate_integration(&ActivationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(again, CoreError::ActivationFailed { ref stage, .. } if stage == "configuration"));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn startup_integrates_the_lab() {
    let landscape = lab_landscape(one_cluster());
    landscape
        .startup_landscape(&ActivationParams::default())
        .await
        .unwrap();

    assert_eq!(landscape.phase(), LandscapePhase::Operational);
    assert_eq!(
        identities(&landscape.devices()),
        ["node1", "node2", "node3", "node4"]
    );
    assert_eq!(identities(&landscape.services()), ["dhcp.lab"]);

    let unrecognized = landscape.unrecognized();
    assert_eq!(unrecognized.len(), 1);
    assert_eq!(unrecognized[0].key, "apod:nodes:deviceType:macos");

    let failed = landscape.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].host.as_deref(), Some("node9"));
    assert!(
        failed[0]
            .message
            .contains("DeviceCoordinator client needs to have an 'ssh' credential")
    );

    let groups: Vec<(String, usize)> = landscape
        .device_groups()
        .iter()
        .map(|g| (g.label().to_owned(), g.members().len()))
        .collect();
    assert_eq!(groups, [("rack-a".to_owned(), 3), ("rack-b".to_owned(), 1)]);
    assert_eq!(landscape.clusters().len(), 1);
}

#[tokio::test]
async fn extensions_are_bound_during_activation() {
    let landscape = lab_landscape(one_cluster());
    landscape
        .startup_landscape(&ActivationParams::default())
        .await
        .unwrap();

    let node1 = landscape.device("node1").unwrap();
    let power = node1.extension(ExtensionKind::Power).unwrap();
    assert_eq!(power.location(), "pdu1.lab");
    assert_eq!(power.config().get("outlet"), Some(&json!(1)));
    assert_eq!(power.coordinator().unwrap().type_name(), "PowerCoordinator");
    assert!(landscape.device("node3").unwrap().extension(ExtensionKind::Power).is_none());

    let ssh = node1.extension(ExtensionKind::Ssh).unwrap();
    assert_eq!(ssh.location(), "localhost");
    assert!(node1.matches("ssh.user", &[json!("tester")]).unwrap());
    assert_eq!(node1.verify_status().get(&ExtensionKind::Ssh), Some(&true));

    // The operational connectivity sweep already reached every node.
    assert!(node1.contact_times().last.is_some());
    assert_eq!(node1.coordinator().unwrap().type_name(), "LocalCoordinator");
}

#[tokio::test]
async fn created_identifier_stays_linked_to_the_resource() {
    let landscape = lab_landscape(one_cluster());
    landscape
        .startup_landscape(&ActivationParams::default())
        .await
        .unwrap();

    let coordinator = landscape
        .coordinators(CoordinatorRole::Device)
        .into_iter()
        .find(|c| c.type_name() == "LocalCoordinator")
        .unwrap();
    let declaration = ResourceDeclaration {
        resource_type: "local".into(),
        host: Some("node7".into()),
        credentials: vec!["lab-ssh".into()],
        ..ResourceDeclaration::default()
    };

    let (identifier, resource) = coordinator
        .create_resource(&landscape, &declaration)
        .unwrap();
    identifier.update_full_identifier("node7.lab.example.com");

    assert!(Arc::ptr_eq(&identifier, resource.identifier()));
    let registered = coordinator.core().lookup_by_key("node7").unwrap();
    assert_eq!(
        registered.identifier().full_identifier().as_str(),
        "node7.lab.example.com"
    );
    assert_eq!(registered.identity(), "node7");
}

#[tokio::test]
async fn devices_in_two_clusters_fail_operations() {
    let topology = json!({
        "clusters": [
            { "name": "c1", "group": "rack-a", "nodes": ["node1", "node2"] },
            { "name": "c2", "group": "rack-a", "nodes": ["node2"], "spares": ["node3"] }
        ]
    });
    let landscape = lab_landscape(topology);

    let err = landscape
        .startup_landscape(&ActivationParams::default())
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("node2: c1, c2"));
    assert_eq!(landscape.phase(), LandscapePhase::Integrated);
    assert!(landscape.pool_snapshot().is_none());

    let relaxed = ActivationParams {
        validate_topology: false,
        ..ActivationParams::default()
    };
    let again = landscape.activate_operations(&relaxed).await.unwrap_err();
    assert!(matches!(again, CoreError::ActivationFailed { .. }));
}

#[tokio::test]
async fn unknown_cluster_group_is_a_configuration_error() {
    let landscape = lab_landscape(json!({
        "clusters": [ { "name": "c1", "group": "rack-z", "nodes": ["node1"] } ]
    }));
    let err = landscape
        .startup_landscape(&ActivationParams::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown device group 'rack-z'"));
}

#[tokio::test]
async fn missing_override_is_reported() {
    let landscape = Landscape::builder()
        .settings(bare_settings())
        .source(
            StaticConfiguration::new(json!({
                "apod": { "nodes": [ node("node1", "10.0.0.1", "rack-a") ] }
            }))
            .with_credentials(credentials()),
        )
        .coupling(LocalCoupling {
            class: "local",
            overrides_agent: false,
        })
        .build()
        .unwrap();

    let err = landscape
        .activate_integration(&ActivationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::NotOverloaded { ref operation, ref type_name }
            if operation == "create_ssh_agent" && type_name == "LocalCoordinator"
    ));
}

#[tokio::test]
async fn disabled_device_activation_integrates_no_devices() {
    let landscape = lab_landscape(json!({ "clusters": [] }));
    let params = ActivationParams {
        disable_device_activation: true,
        ..ActivationParams::default()
    };
    landscape.startup_landscape(&params).await.unwrap();

    assert!(landscape.devices().is_empty());
    assert_eq!(landscape.services().len(), 1);
}

// ── Pool ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cluster_and_device_checkout() {
    let landscape = lab_landscape(one_cluster());
    landscape
        .startup_landscape(&ActivationParams::default())
        .await
        .unwrap();

    let cluster = landscape.checkout_cluster("c1").unwrap();
    assert_eq!(cluster.nodes().len(), 2);

    let err = landscape.checkout_device("node1").unwrap_err();
    assert!(matches!(err, CoreError::Checkout { .. }));

    let node2 = landscape.device("node2").unwrap();
    let err = node2.checkin().unwrap_err();
    assert!(matches!(err, CoreError::Checkin { .. }));
    assert!(landscape.checkout_device("node2").is_err());

    let node4 = landscape.device("node4").unwrap();
    let checked_out = node4.checkout().unwrap();
    assert!(Arc::ptr_eq(&node4, &checked_out));

    let snapshot = landscape.pool_snapshot().unwrap();
    assert_eq!(snapshot.available, ["node3"]);
    assert_eq!(snapshot.outstanding, ["node1", "node2", "node4"]);

    node4.checkin().unwrap();
    landscape.checkin_cluster(&cluster).unwrap();
    assert_eq!(
        landscape.pool_snapshot().unwrap().available,
        ["node1", "node2", "node3", "node4"]
    );

    let err = landscape.checkin_device(&node4).unwrap_err();
    assert!(matches!(err, CoreError::Checkin { .. }));
}

#[tokio::test]
async fn device_selection_filters() {
    let landscape = lab_landscape(one_cluster());
    landscape
        .activate_integration(&ActivationParams::default())
        .await
        .unwrap();

    let rack_a = landscape.select_devices(
        &[ResourceFilter::ByGroup("rack-a".into())],
        &[ResourceFilter::ByRole("primary".into())],
    );
    assert_eq!(identities(&rack_a), ["node2", "node3"]);
    assert_eq!(landscape.coordinators(CoordinatorRole::Power).len(), 1);
}

// ── Connectivity ────────────────────────────────────────────────────

#[tokio::test]
async fn connectivity_sweep_tolerant_and_strict() {
    let landscape = lab_landscape(json!({ "clusters": [] }));
    landscape
        .activate_integration(&ActivationParams::default())
        .await
        .unwrap();

    let coordinators = landscape.coordinators(CoordinatorRole::Device);
    let local = coordinators
        .iter()
        .find(|c| c.type_name() == "LocalCoordinator")
        .unwrap();

    let reports = local.verify_connectivity("exit 3", false).await.unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.status == Some(3) && r.error.is_none()));
    assert_eq!(reports[0].ip, Some("10.0.0.1".parse().unwrap()));

    let reports = local.verify_connectivity("sleep 5", false).await.unwrap();
    assert!(reports.iter().all(|r| r.error.is_some() && !r.is_ok()));

    let err = local.verify_connectivity("sleep 5", true).await.unwrap_err();
    assert!(matches!(err, CoreError::InactivityTimeout { .. }));
}
