//! Status and metrics commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, MetricSnapshot};
use crate::output::{
    color_status, format_optional_timestamp, format_percent, format_timestamp, print_info,
    print_json, print_warning, render_table, OutputFormat,
};

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Last Action")]
    last_action: String,
    #[tabled(rename = "Last Scaled")]
    last_scaled: String,
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Flatten a snapshot into one row per metric and service
fn metric_rows(snapshot: &MetricSnapshot) -> Vec<MetricRow> {
    snapshot
        .iter()
        .flat_map(|(metric, values)| {
            values.iter().map(move |(service, value)| MetricRow {
                metric: metric.clone(),
                service: service.clone(),
                value: format_percent(*value),
            })
        })
        .collect()
}

/// Show overall autoscaler status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Autoscaler Status".bold());
            println!("{}", "=".repeat(50));
            println!("Status:     {}", color_status(&health.status));
            println!("Timestamp:  {}", format_timestamp(&health.timestamp));
            if health.scaling_in_progress {
                println!("Scaling:    {}", "in progress".yellow());
            }
            println!();

            if health.services.is_empty() {
                print_warning("No services configured");
                return Ok(());
            }

            let rows: Vec<ServiceRow> = health
                .services
                .values()
                .map(|s| ServiceRow {
                    name: s.name.clone(),
                    replicas: s
                        .replicas
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    last_action: s.last_action.clone().unwrap_or_else(|| "-".to_string()),
                    last_scaled: format_optional_timestamp(s.last_scale_action.as_ref()),
                })
                .collect();
            println!("{}", render_table(rows));

            if health.metrics.is_empty() {
                println!();
                print_info("No metrics collected yet");
            }
        }
    }

    Ok(())
}

/// Show the latest metrics snapshot
pub async fn show_metrics(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot = client.metrics().await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            if snapshot.is_empty() {
                print_warning("No metrics in the current snapshot");
                return Ok(());
            }
            println!("{}", render_table(metric_rows(&snapshot)));
        }
    }

    Ok(())
}
