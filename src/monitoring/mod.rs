//! Monitoring Module
//!
//! In-process governance metrics with Prometheus text export.

pub mod metrics;

pub use metrics::{
    Counter, GovernanceMetrics, InFlight, LatencyHistogram, MetricsSnapshot, OutcomeCounters, LATENCY_BUCKETS,
};
