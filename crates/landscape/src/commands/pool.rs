//! `landscape pool`: the operational checkout pool.
//!
//! Devices and clusters named on the command line are checked out, the
//! pool is shown while they are held, and everything is checked back in.

use std::sync::Arc;

use landscape_core::{DeviceCluster, Landscape, PoolSnapshot, Resource};

use crate::cli::{GlobalOpts, PoolArgs};
use crate::error::CliError;
use crate::output;

use super::activation_params;

fn detail(snap: &PoolSnapshot) -> String {
    let section = |title: &str, items: &[String]| {
        let mut lines = vec![format!("{title} ({})", items.len())];
        lines.extend(items.iter().map(|item| format!("    {item}")));
        lines.join("\n")
    };
    [
        section("Available devices", &snap.available),
        section("Outstanding devices", &snap.outstanding),
        section("Available clusters", &snap.clusters_available),
        section("Outstanding clusters", &snap.clusters_outstanding),
    ]
    .join("\n")
}

pub async fn handle(
    landscape: &Landscape,
    args: PoolArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    landscape
        .startup_landscape(&activation_params(&args.activation))
        .await?;

    let mut clusters = Vec::new();
    let mut devices = Vec::new();
    let held = hold(landscape, &args, &mut clusters, &mut devices);

    let snapshot = landscape.pool_snapshot();

    // Release whatever was taken, even when a later checkout failed.
    for device in devices.iter().rev() {
        landscape.checkin_device(device)?;
    }
    for cluster in clusters.iter().rev() {
        landscape.checkin_cluster(cluster)?;
    }
    held?;

    let snapshot = snapshot.unwrap_or_default();
    let out = output::render_single(&global.output, &snapshot, detail, |s| {
        s.available.join("\n")
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

fn hold(
    landscape: &Landscape,
    args: &PoolArgs,
    clusters: &mut Vec<Arc<DeviceCluster>>,
    devices: &mut Vec<Arc<Resource>>,
) -> Result<(), CliError> {
    for name in &args.cluster {
        clusters.push(landscape.checkout_cluster(name)?);
    }
    for identity in &args.device {
        devices.push(landscape.checkout_device(identity)?);
    }
    Ok(())
}
