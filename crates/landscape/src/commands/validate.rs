//! `landscape validate`: run the configuration stage and summarize it.

use serde::Serialize;

use landscape_core::{ActivationParams, Landscape};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ValidationSummary {
    devices: usize,
    services: usize,
    power_interfaces: usize,
    serial_interfaces: usize,
    clusters: usize,
    credentials: usize,
    dependencies: Vec<String>,
}

fn detail(s: &ValidationSummary) -> String {
    let mut lines = vec![
        format!("Devices:      {}", s.devices),
        format!("Services:     {}", s.services),
        format!("Power:        {}", s.power_interfaces),
        format!("Serial:       {}", s.serial_interfaces),
        format!("Clusters:     {}", s.clusters),
        format!("Credentials:  {}", s.credentials),
        "Dependencies:".to_owned(),
    ];
    lines.extend(s.dependencies.iter().map(|key| format!("    {key}")));
    lines.join("\n")
}

pub async fn handle(landscape: &Landscape, global: &GlobalOpts) -> Result<(), CliError> {
    landscape
        .activate_configuration(&ActivationParams::default())
        .await?;
    let declared = landscape.declared()?;

    let summary = ValidationSummary {
        devices: declared.devices.len(),
        services: declared.services.len(),
        power_interfaces: declared.power.len(),
        serial_interfaces: declared.serial.len(),
        clusters: declared.clusters.len(),
        credentials: declared.credentials.len(),
        dependencies: declared.dependencies.iter().cloned().collect(),
    };

    let out = output::render_single(&global.output, &summary, detail, |s| {
        s.dependencies.join("\n")
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
