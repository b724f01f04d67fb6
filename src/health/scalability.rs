//! Capacity projection from the latest metrics.
//!
//! Three independent estimates of how many concurrent users the process can
//! serve; the smallest is the binding constraint.

use crate::core::config::ScalabilityConfig;
use serde::Serialize;

/// Which estimate bounds capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Constraint {
    Memory,
    Database,
    Throughput,
}

/// Inputs read from the metrics and memory components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityInputs {
    pub heap_used_mb: f64,
    /// `None` before any query has been recorded
    pub avg_query_ms: Option<f64>,
    pub db_pool_size: u32,
    pub requests_per_minute: f64,
    pub error_rate: f64,
}

/// Limits at which bottlenecks are reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BottleneckLimits {
    pub memory_warning_mb: f64,
    pub query_slow_ms: f64,
    pub max_error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityEstimates {
    pub memory: u64,
    pub database: u64,
    pub throughput: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalabilityAssessment {
    pub current_capacity_estimate: u64,
    pub max_users_estimate: u64,
    pub binding_constraint: Constraint,
    pub estimates: CapacityEstimates,
    pub bottlenecks: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn assess(inputs: &CapacityInputs, config: &ScalabilityConfig, limits: &BottleneckLimits) -> ScalabilityAssessment {
    let headroom_mb = (config.memory_budget_mb - inputs.heap_used_mb).max(0.0);
    let memory = headroom_mb / config.memory_per_user_mb;

    // queries per second the pool can sustain at the observed latency
    let database = match inputs.avg_query_ms {
        Some(ms) if ms > 0.0 => (1000.0 / ms) * f64::from(inputs.db_pool_size) * config.users_per_db_qps,
        _ => config.baseline_capacity,
    };

    let throughput = if inputs.requests_per_minute > 0.0 {
        inputs.requests_per_minute * config.users_per_rpm
    } else {
        config.baseline_capacity
    };

    let (binding_constraint, current) = [
        (Constraint::Memory, memory),
        (Constraint::Database, database),
        (Constraint::Throughput, throughput),
    ]
    .into_iter()
    .fold((Constraint::Memory, f64::INFINITY), |best, candidate| {
        if candidate.1 < best.1 {
            candidate
        } else {
            best
        }
    });

    let mut bottlenecks = Vec::new();
    let mut recommendations = Vec::new();

    if inputs.heap_used_mb > limits.memory_warning_mb {
        bottlenecks.push(format!("Memory usage high: {:.0}MB", inputs.heap_used_mb));
        recommendations.push("Reduce object pool sizes or add memory per instance".to_string());
    }
    if let Some(ms) = inputs.avg_query_ms.filter(|ms| *ms > limits.query_slow_ms) {
        bottlenecks.push(format!("Database queries slow: {:.1}ms average", ms));
        recommendations.push("Cache hot queries and add indexes for slow lookups".to_string());
    }
    if inputs.error_rate > limits.max_error_rate {
        bottlenecks.push(format!("Error rate elevated: {:.1}%", inputs.error_rate * 100.0));
        recommendations.push("Investigate failing endpoints before scaling out".to_string());
    }
    if !bottlenecks.is_empty() && binding_constraint == Constraint::Database {
        recommendations.push("Increase the database pool or add read replicas".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("System operating within capacity".to_string());
    }

    let current_capacity_estimate = current.max(0.0).floor() as u64;
    ScalabilityAssessment {
        current_capacity_estimate,
        max_users_estimate: (current.max(0.0) * config.max_multiplier).floor() as u64,
        binding_constraint,
        estimates: CapacityEstimates {
            memory: memory.floor() as u64,
            database: database.floor() as u64,
            throughput: throughput.floor() as u64,
        },
        bottlenecks,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> BottleneckLimits {
        BottleneckLimits {
            memory_warning_mb: 700.0,
            query_slow_ms: 500.0,
            max_error_rate: 0.05,
        }
    }

    fn idle() -> CapacityInputs {
        CapacityInputs {
            heap_used_mb: 24.0,
            avg_query_ms: None,
            db_pool_size: 20,
            requests_per_minute: 0.0,
            error_rate: 0.0,
        }
    }

    #[test]
    fn test_memory_binds_when_heap_is_large() {
        let config = ScalabilityConfig::default();
        let inputs = CapacityInputs {
            heap_used_mb: 824.0,
            ..idle()
        };

        let assessment = assess(&inputs, &config, &limits());
        // (1024 - 824) / 2.0
        assert_eq!(assessment.estimates.memory, 100);
        assert_eq!(assessment.binding_constraint, Constraint::Memory);
        assert_eq!(assessment.current_capacity_estimate, 100);
        assert_eq!(assessment.max_users_estimate, 150);
        assert!(assessment.bottlenecks.iter().any(|b| b.starts_with("Memory usage high")));
    }

    #[test]
    fn test_slow_database_binds() {
        let config = ScalabilityConfig::default();
        let inputs = CapacityInputs {
            avg_query_ms: Some(800.0),
            db_pool_size: 4,
            ..idle()
        };

        let assessment = assess(&inputs, &config, &limits());
        // 1000 / 800 * 4 = 5 users
        assert_eq!(assessment.estimates.database, 5);
        assert_eq!(assessment.binding_constraint, Constraint::Database);
        assert!(assessment.bottlenecks.iter().any(|b| b.contains("Database queries slow")));
    }

    #[test]
    fn test_idle_process_has_no_bottlenecks() {
        let assessment = assess(&idle(), &ScalabilityConfig::default(), &limits());
        assert!(assessment.bottlenecks.is_empty());
        assert_eq!(assessment.recommendations, vec!["System operating within capacity".to_string()]);
        assert!(assessment.max_users_estimate >= assessment.current_capacity_estimate);
    }

    #[test]
    fn test_heap_over_budget_gives_zero_capacity() {
        let inputs = CapacityInputs {
            heap_used_mb: 4096.0,
            ..idle()
        };
        let assessment = assess(&inputs, &ScalabilityConfig::default(), &limits());
        assert_eq!(assessment.current_capacity_estimate, 0);
        assert_eq!(assessment.max_users_estimate, 0);
    }
}
