//! Per-endpoint in-flight counters with capacity rules.

use crate::core::config::QueueConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-flight count against capacity for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub in_flight: usize,
    pub capacity: usize,
}

impl QueueStatus {
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.in_flight as f64 / self.capacity as f64
    }
}

#[derive(Debug)]
pub struct EndpointQueues {
    in_flight: DashMap<String, usize>,
    config: QueueConfig,
}

impl EndpointQueues {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            in_flight: DashMap::new(),
            config,
        }
    }

    /// Capacity of the first rule whose pattern occurs in `endpoint`
    pub fn capacity_for(&self, endpoint: &str) -> usize {
        self.config
            .rules
            .iter()
            .find(|rule| endpoint.contains(&rule.pattern))
            .map_or(self.config.default_capacity, |rule| rule.capacity)
    }

    pub fn try_acquire(&self, endpoint: &str) -> bool {
        let capacity = self.capacity_for(endpoint);
        let mut count = self.in_flight.entry(endpoint.to_string()).or_insert(0);
        if *count >= capacity {
            return false;
        }
        *count += 1;
        true
    }

    pub fn release(&self, endpoint: &str) {
        match self.in_flight.get_mut(endpoint) {
            Some(mut count) if *count > 0 => *count -= 1,
            _ => tracing::debug!(endpoint, "Release without matching admission ignored"),
        }
    }

    pub fn in_flight(&self, endpoint: &str) -> usize {
        self.in_flight.get(endpoint).map_or(0, |count| *count)
    }

    /// Sum of every endpoint's in-flight count
    pub fn total_in_flight(&self) -> usize {
        self.in_flight.iter().map(|entry| *entry.value()).sum()
    }

    pub fn statuses(&self) -> BTreeMap<String, QueueStatus> {
        self.in_flight
            .iter()
            .map(|entry| {
                let status = QueueStatus {
                    in_flight: *entry.value(),
                    capacity: self.capacity_for(entry.key()),
                };
                (entry.key().clone(), status)
            })
            .collect()
    }
}

/// Queue slot held for the lifetime of an admitted request.
///
/// Dropping the permit releases the slot on every exit path.
#[derive(Debug)]
pub struct QueuePermit {
    queues: Arc<EndpointQueues>,
    endpoint: String,
}

impl QueuePermit {
    pub(crate) fn new(queues: Arc<EndpointQueues>, endpoint: String) -> Self {
        Self { queues, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for QueuePermit {
    fn drop(&mut self) {
        self.queues.release(&self.endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::QueueRule;

    fn queues(default_capacity: usize) -> EndpointQueues {
        EndpointQueues::new(QueueConfig {
            default_capacity,
            rules: vec![QueueRule {
                pattern: "/feed".to_string(),
                capacity: 3,
            }],
        })
    }

    #[test]
    fn test_capacity_rules() {
        let queues = queues(2);
        assert_eq!(queues.capacity_for("/api/feed/home"), 3);
        assert_eq!(queues.capacity_for("/api/profile"), 2);
    }

    #[test]
    fn test_capacity_plus_one_rejected() {
        let queues = queues(2);
        assert!(queues.try_acquire("/profile"));
        assert!(queues.try_acquire("/profile"));
        assert!(!queues.try_acquire("/profile"));

        queues.release("/profile");
        assert!(queues.try_acquire("/profile"));
        assert!(!queues.try_acquire("/profile"));
    }

    #[test]
    fn test_release_never_underflows() {
        let queues = queues(2);
        queues.release("/profile");
        queues.release("/never-seen");
        assert_eq!(queues.in_flight("/profile"), 0);
        assert_eq!(queues.total_in_flight(), 0);
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let queues = Arc::new(queues(1));
        assert!(queues.try_acquire("/profile"));
        let permit = QueuePermit::new(Arc::clone(&queues), "/profile".to_string());
        assert_eq!(queues.in_flight("/profile"), 1);

        drop(permit);
        assert_eq!(queues.in_flight("/profile"), 0);
    }
}
