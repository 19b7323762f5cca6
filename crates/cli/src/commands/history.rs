//! Scaling history command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ScalingAction};
use crate::output::{
    color_action, format_percent, format_timestamp, print_json, print_warning, render_table,
    OutputFormat,
};

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "Healthy")]
    healthy: String,
}

/// Keep actions for `service` (if given), then the `limit` most recent
pub fn filter_history(
    history: Vec<ScalingAction>,
    service: Option<&str>,
    limit: Option<usize>,
) -> Vec<ScalingAction> {
    let filtered: Vec<ScalingAction> = history
        .into_iter()
        .filter(|a| service.map_or(true, |s| a.service == s))
        .collect();

    match limit {
        Some(limit) if filtered.len() > limit => filtered[filtered.len() - limit..].to_vec(),
        _ => filtered,
    }
}

/// Show recorded scaling actions, oldest first
pub async fn show_history(
    client: &ApiClient,
    service: Option<String>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let history = filter_history(client.history().await?, service.as_deref(), limit);

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Table => {
            if history.is_empty() {
                print_warning("No scaling actions recorded");
                return Ok(());
            }

            let total = history.len();
            let rows: Vec<HistoryRow> = history
                .into_iter()
                .map(|a| HistoryRow {
                    timestamp: format_timestamp(&a.timestamp),
                    service: a.service,
                    action: color_action(&a.action),
                    replicas: format!("{} -> {}", a.from_replicas, a.to_replicas),
                    reason: a.reason,
                    load: a
                        .observed_value
                        .map(format_percent)
                        .unwrap_or_else(|| "-".to_string()),
                    healthy: if a.health_confirmed { "yes" } else { "timeout" }.to_string(),
                })
                .collect();

            println!("{}", render_table(rows));
            println!("\nTotal: {} actions", total);
        }
    }

    Ok(())
}
