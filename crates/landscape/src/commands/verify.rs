//! `landscape verify`: connectivity probe across device and service coordinators.

use tabled::Tabled;

use landscape_core::command::CONNECTIVITY_PROBE;
use landscape_core::{ConnectivityReport, CoordinatorRole, Landscape};

use crate::cli::{GlobalOpts, VerifyArgs};
use crate::error::CliError;
use crate::output;

use super::activation_params;

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Result")]
    result: String,
}

pub async fn handle(
    landscape: &Landscape,
    args: VerifyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    landscape
        .activate_integration(&activation_params(&args.activation))
        .await?;

    let probe = args.probe.as_deref().unwrap_or(CONNECTIVITY_PROBE);
    let mut reports: Vec<ConnectivityReport> = Vec::new();
    for role in [CoordinatorRole::Device, CoordinatorRole::Service] {
        for coordinator in landscape.coordinators(role) {
            reports.extend(coordinator.verify_connectivity(probe, args.strict).await?);
        }
    }

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &reports,
        |r| ReportRow {
            host: r.host.clone(),
            ip: r.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            status: r.status.map(|s| s.to_string()).unwrap_or_default(),
            result: r
                .error
                .clone()
                .unwrap_or_else(|| output::status_cell(r.is_ok(), color)),
        },
        |r| r.host.clone(),
    );
    output::print_output(&out, global.quiet);

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        return Err(CliError::Connectivity {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}
