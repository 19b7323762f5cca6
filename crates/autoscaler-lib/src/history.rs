//! Bounded scaling-action history
//!
//! A FIFO ring buffer: once the configured capacity is reached, every new
//! entry evicts the oldest one.

use crate::models::ScalingAction;
use std::collections::VecDeque;

/// Default number of actions kept in memory
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Ring buffer of executed scaling actions, oldest first
#[derive(Debug, Clone)]
pub struct ScalingHistory {
    entries: VecDeque<ScalingAction>,
    capacity: usize,
}

impl Default for ScalingHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ScalingHistory {
    /// Create a history holding at most `capacity` entries (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an action, evicting the oldest entries when at capacity
    pub fn push(&mut self, action: ScalingAction) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(action);
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<ScalingAction> {
        self.entries.iter().cloned().collect()
    }

    /// The `limit` most recent entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<ScalingAction> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Most recent entry for `service`
    pub fn last_for(&self, service: &str) -> Option<&ScalingAction> {
        self.entries.iter().rev().find(|a| a.service == service)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionReason, ScaleDirection};
    use chrono::Utc;

    fn action(service: &str, to: u32) -> ScalingAction {
        ScalingAction {
            timestamp: Utc::now(),
            service: service.to_string(),
            action: ScaleDirection::Up,
            from_replicas: to - 1,
            to_replicas: to,
            reason: DecisionReason::HighLoad,
            observed_value: Some(90.0),
            health_confirmed: true,
        }
    }

    #[test]
    fn test_history_capacity_limit() {
        let mut history = ScalingHistory::with_capacity(3);
        for to in 1..=5 {
            history.push(action("web", to));
        }

        assert_eq!(history.len(), 3);
        let targets: Vec<u32> = history.entries().iter().map(|a| a.to_replicas).collect();
        assert_eq!(targets, vec![3, 4, 5]);
    }

    #[test]
    fn test_history_recent() {
        let mut history = ScalingHistory::default();
        for to in 1..=12 {
            history.push(action("web", to));
        }

        let recent = history.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.first().unwrap().to_replicas, 3);
        assert_eq!(recent.last().unwrap().to_replicas, 12);

        // Asking for more than stored returns everything
        assert_eq!(history.recent(50).len(), 12);
    }

    #[test]
    fn test_history_last_for_service() {
        let mut history = ScalingHistory::default();
        history.push(action("web", 3));
        history.push(action("api", 4));
        history.push(action("web", 5));

        assert_eq!(history.last_for("web").unwrap().to_replicas, 5);
        assert_eq!(history.last_for("api").unwrap().to_replicas, 4);
        assert!(history.last_for("worker").is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut history = ScalingHistory::with_capacity(0);
        history.push(action("web", 2));
        history.push(action("web", 3));

        assert_eq!(history.capacity(), 1);
        assert_eq!(history.len(), 1);
    }
}
