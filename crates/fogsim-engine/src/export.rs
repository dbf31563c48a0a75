//! Result export
//!
//! Writes the per-policy summary as CSV and, optionally, the full reports
//! (including the per-device breakdown) as JSON.

use std::fs;
use std::path::Path;

use fogsim_core::Result;
use serde::Serialize;
use tracing::info;

use crate::metrics::PolicyReport;

/// Timestamped name for a result file, e.g. `results_2025-11-03_14-02-51.csv`
pub fn timestamped_name(prefix: &str, extension: &str) -> String {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("{prefix}_{stamp}.{extension}")
}

/// Write the summary CSV: one row per policy run
pub fn write_summary_csv(path: &Path, reports: &[PolicyReport]) -> Result<()> {
    let mut out = String::from(
        "policy,config,completion_rate,utilization,load_balance,load_balance_spread,avg_response_ms,total_energy,offload_rate,messages\n",
    );
    for r in reports {
        out.push_str(&format!(
            "{},{},{:.4},{:.4},{:.4},{:.4},{:.2},{:.2},{:.4},{}\n",
            r.policy,
            r.config.replace(',', ";"),
            r.completion_rate,
            r.utilization,
            r.load_balance_stddev,
            r.load_balance_spread,
            r.avg_response_ms,
            r.total_energy_j,
            r.offload_rate,
            r.messages,
        ));
    }
    fs::write(path, out)?;
    info!(path = %path.display(), "summary CSV written");
    Ok(())
}

/// Write the per-device breakdown of one report as CSV
pub fn write_device_csv(path: &Path, report: &PolicyReport) -> Result<()> {
    let mut out = String::from("device,total_mips,completed,failed,mean_utilization,energy_j,messages\n");
    for d in &report.devices {
        out.push_str(&format!(
            "{},{},{},{},{:.4},{:.2},{}\n",
            d.device, d.total_mips, d.completed, d.failed, d.mean_utilization, d.energy_j, d.messages,
        ));
    }
    fs::write(path, out)?;
    Ok(())
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    generated_at: String,
    reports: &'a [PolicyReport],
}

/// Write full reports, device breakdown included, as pretty JSON
pub fn write_json(path: &Path, reports: &[PolicyReport]) -> Result<()> {
    let envelope = JsonEnvelope {
        generated_at: chrono::Local::now().to_rfc3339(),
        reports,
    };
    fs::write(path, serde_json::to_string_pretty(&envelope)?)?;
    info!(path = %path.display(), "JSON report written");
    Ok(())
}
