//! Scaling policy: decides whether a service should gain or lose a replica.
//!
//! This module is pure. The caller supplies the service configuration, the
//! current metrics snapshot, the service's cooldown state and the current
//! time; the result depends on nothing else.

use crate::models::{
    DecisionReason, MetricSnapshot, ScaleDirection, ScalingDecision, ScalingState, ServiceConfig,
};
use chrono::{DateTime, Utc};

/// Decide the scaling action for `config.name`.
///
/// Order of checks: cooldown, metric availability, then thresholds. Only
/// metrics listed in `config.metric_names` that have a value for the service
/// are averaged; an empty intersection is "no data", never zero load.
pub fn decide(
    config: &ServiceConfig,
    snapshot: &MetricSnapshot,
    state: &ScalingState,
    now: DateTime<Utc>,
) -> ScalingDecision {
    if in_cooldown(config, state, now) {
        return ScalingDecision::none(DecisionReason::Cooldown);
    }

    let available: Vec<f64> = config
        .metric_names
        .iter()
        .filter_map(|metric| snapshot.value(metric, &config.name))
        .collect();

    if available.is_empty() {
        return ScalingDecision::none(DecisionReason::NoMetrics);
    }

    let avg = available.iter().sum::<f64>() / available.len() as f64;

    if avg > config.scale_up_threshold {
        ScalingDecision::with_value(ScaleDirection::Up, DecisionReason::HighLoad, avg)
    } else if avg < config.scale_down_threshold {
        ScalingDecision::with_value(ScaleDirection::Down, DecisionReason::LowLoad, avg)
    } else {
        ScalingDecision::with_value(ScaleDirection::None, DecisionReason::Stable, avg)
    }
}

/// True while `now` is within `config.cooldown` of the service's last action.
/// A last action stamped in the future counts as inside the window.
fn in_cooldown(config: &ServiceConfig, state: &ScalingState, now: DateTime<Utc>) -> bool {
    match state.last_action_at {
        None => false,
        Some(last) => match now.signed_duration_since(last).to_std() {
            Ok(elapsed) => elapsed < config.cooldown,
            Err(_) => true,
        },
    }
}
