//! Governance metrics.
//!
//! What the engine and coordinator count: proposals through the cost gate,
//! resolutions by outcome, voter failures by kind and solicitation latency.
//! Everything is lock-free and can be rendered in Prometheus text format.

use crate::governance::aggregator::Outcome;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds, in seconds, of the solicitation latency buckets.
pub const LATENCY_BUCKETS: [f64; 10] = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// A monotonically increasing count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Number of solicitation rounds currently running.
#[derive(Debug, Default)]
pub struct InFlight(AtomicI64);

impl InFlight {
    /// Count a round as running until the guard drops, panics included.
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.0.fetch_add(1, Ordering::Relaxed);
        InFlightGuard(self)
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decrements its `InFlight` on drop.
pub struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Solicitation round latency over `LATENCY_BUCKETS`.
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    /// Non-cumulative; the last slot holds rounds slower than every bound
    slots: [AtomicU64; LATENCY_BUCKETS.len() + 1],
    total_micros: AtomicU64,
    count: AtomicU64,
}

impl LatencyHistogram {
    pub fn observe(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let slot = LATENCY_BUCKETS
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(LATENCY_BUCKETS.len());
        self.slots[slot].fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Total observed time in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.total_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn mean_seconds(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_seconds() / n as f64,
        }
    }

    /// Cumulative `(upper bound, rounds at or below it)` pairs.
    pub fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        LATENCY_BUCKETS
            .iter()
            .zip(&self.slots)
            .map(|(bound, slot)| {
                running += slot.load(Ordering::Relaxed);
                (*bound, running)
            })
            .collect()
    }
}

/// Vote-based resolutions, one counter per outcome.
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    approved: Counter,
    approved_with_review: Counter,
    rejected: Counter,
    escalated: Counter,
}

impl OutcomeCounters {
    fn counter(&self, outcome: Outcome) -> &Counter {
        match outcome {
            Outcome::Approved => &self.approved,
            Outcome::ApprovedWithReview => &self.approved_with_review,
            Outcome::Rejected => &self.rejected,
            Outcome::Escalated => &self.escalated,
        }
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counter(outcome).get()
    }
}

const OUTCOMES: [(Outcome, &str); 4] = [
    (Outcome::Approved, "approved"),
    (Outcome::ApprovedWithReview, "approved_with_review"),
    (Outcome::Rejected, "rejected"),
    (Outcome::Escalated, "escalated"),
];

/// Metrics updated by the governance engine and coordinator.
#[derive(Debug, Default)]
pub struct GovernanceMetrics {
    pub proposals_submitted: Counter,
    /// Approved by the cost gate without a vote
    pub auto_approved: Counter,
    /// Escalated by the cost gate without a vote
    pub auto_escalated: Counter,
    pub resolved: OutcomeCounters,
    pub votes_solicited: Counter,
    /// Transport errors, malformed answers and voter-reported failures
    pub voter_failures: Counter,
    pub voter_timeouts: Counter,
    pub voter_panics: Counter,
    /// Vote rounds that died and were escalated
    pub failed_rounds: Counter,
    pub solicitations_in_flight: InFlight,
    pub solicitation_latency: LatencyHistogram,
}

impl GovernanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a vote-based resolution.
    pub fn record_outcome(&self, outcome: Outcome) {
        self.resolved.counter(outcome).inc();
    }

    /// Point-in-time copy of every value.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            proposals_submitted: self.proposals_submitted.get(),
            auto_approved: self.auto_approved.get(),
            auto_escalated: self.auto_escalated.get(),
            resolved_approved: self.resolved.get(Outcome::Approved),
            resolved_with_review: self.resolved.get(Outcome::ApprovedWithReview),
            resolved_rejected: self.resolved.get(Outcome::Rejected),
            resolved_escalated: self.resolved.get(Outcome::Escalated),
            votes_solicited: self.votes_solicited.get(),
            voter_failures: self.voter_failures.get(),
            voter_timeouts: self.voter_timeouts.get(),
            voter_panics: self.voter_panics.get(),
            failed_rounds: self.failed_rounds.get(),
            solicitations: self.solicitation_latency.count(),
            mean_solicitation_seconds: self.solicitation_latency.mean_seconds(),
        }
    }

    /// Render in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        counter(&mut out, "pentarchy_proposals_submitted_total", "Proposals submitted", self.proposals_submitted.get());
        let _ = writeln!(out, "# HELP pentarchy_gate_decisions_total Proposals decided by the cost gate");
        let _ = writeln!(out, "# TYPE pentarchy_gate_decisions_total counter");
        let _ = writeln!(out, "pentarchy_gate_decisions_total{{gate=\"auto_approve\"}} {}", self.auto_approved.get());
        let _ = writeln!(out, "pentarchy_gate_decisions_total{{gate=\"human_review\"}} {}", self.auto_escalated.get());

        let _ = writeln!(out, "# HELP pentarchy_resolutions_total Vote-based resolutions by outcome");
        let _ = writeln!(out, "# TYPE pentarchy_resolutions_total counter");
        for (outcome, label) in OUTCOMES {
            let _ = writeln!(out, "pentarchy_resolutions_total{{outcome=\"{}\"}} {}", label, self.resolved.get(outcome));
        }

        counter(&mut out, "pentarchy_votes_solicited_total", "Evaluation requests sent to voters", self.votes_solicited.get());
        let _ = writeln!(out, "# HELP pentarchy_voter_errors_total Voters replaced by a synthesized abstention");
        let _ = writeln!(out, "# TYPE pentarchy_voter_errors_total counter");
        for (kind, value) in [
            ("failure", self.voter_failures.get()),
            ("timeout", self.voter_timeouts.get()),
            ("panic", self.voter_panics.get()),
        ] {
            let _ = writeln!(out, "pentarchy_voter_errors_total{{kind=\"{}\"}} {}", kind, value);
        }
        counter(&mut out, "pentarchy_failed_rounds_total", "Vote rounds escalated after dying", self.failed_rounds.get());

        let _ = writeln!(out, "# HELP pentarchy_solicitations_in_flight Solicitation rounds running");
        let _ = writeln!(out, "# TYPE pentarchy_solicitations_in_flight gauge");
        let _ = writeln!(out, "pentarchy_solicitations_in_flight {}", self.solicitations_in_flight.get());

        let name = "pentarchy_solicitation_seconds";
        let _ = writeln!(out, "# HELP {} Solicitation round latency", name);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for (bound, rounds) in self.solicitation_latency.cumulative() {
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, bound, rounds);
        }
        let rounds = self.solicitation_latency.count();
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, rounds);
        let _ = writeln!(out, "{}_sum {}", name, self.solicitation_latency.total_seconds());
        let _ = writeln!(out, "{}_count {}", name, rounds);

        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
}

/// Serializable copy of `GovernanceMetrics`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub proposals_submitted: u64,
    pub auto_approved: u64,
    pub auto_escalated: u64,
    pub resolved_approved: u64,
    pub resolved_with_review: u64,
    pub resolved_rejected: u64,
    pub resolved_escalated: u64,
    pub votes_solicited: u64,
    pub voter_failures: u64,
    pub voter_timeouts: u64,
    pub voter_panics: u64,
    pub failed_rounds: u64,
    pub solicitations: u64,
    pub mean_solicitation_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard() {
        let in_flight = InFlight::default();
        {
            let _a = in_flight.enter();
            let _b = in_flight.enter();
            assert_eq!(in_flight.get(), 2);
        }
        assert_eq!(in_flight.get(), 0);
    }

    #[test]
    fn test_in_flight_survives_panic() {
        let in_flight = InFlight::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = in_flight.enter();
            panic!("voter blew up");
        }));
        assert!(result.is_err());
        assert_eq!(in_flight.get(), 0);
    }

    #[test]
    fn test_latency_histogram() {
        let histogram = LatencyHistogram::default();
        histogram.observe(Duration::from_millis(100));
        histogram.observe(Duration::from_millis(400));
        histogram.observe(Duration::from_secs(120));

        assert_eq!(histogram.count(), 3);
        assert!((histogram.total_seconds() - 120.5).abs() < 1e-9);
        let cumulative = histogram.cumulative();
        assert_eq!(cumulative[1], (0.1, 1));
        assert_eq!(cumulative[3], (0.5, 2));
        // the 120s round is only counted in +Inf
        assert_eq!(cumulative.last().map(|(_, n)| *n), Some(2));
    }

    #[test]
    fn test_outcomes_and_snapshot() {
        let metrics = GovernanceMetrics::new();
        metrics.record_outcome(Outcome::Approved);
        metrics.record_outcome(Outcome::ApprovedWithReview);
        metrics.voter_timeouts.inc();
        metrics.voter_panics.inc();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.resolved_approved, 1);
        assert_eq!(snapshot.resolved_with_review, 1);
        assert_eq!(snapshot.resolved_rejected, 0);
        assert_eq!(snapshot.voter_timeouts, 1);
        assert_eq!(snapshot.voter_panics, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = GovernanceMetrics::new();
        metrics.proposals_submitted.inc();
        metrics.auto_escalated.inc();
        metrics.record_outcome(Outcome::Rejected);
        metrics.solicitation_latency.observe(Duration::from_millis(200));

        let output = metrics.export_prometheus();
        assert!(output.contains("pentarchy_proposals_submitted_total 1"));
        assert!(output.contains("pentarchy_gate_decisions_total{gate=\"human_review\"} 1"));
        assert!(output.contains("pentarchy_resolutions_total{outcome=\"rejected\"} 1"));
        assert!(output.contains("# TYPE pentarchy_solicitation_seconds histogram"));
        assert!(output.contains("pentarchy_solicitation_seconds_bucket{le=\"0.25\"} 1"));
        assert!(output.contains("pentarchy_solicitation_seconds_count 1"));
    }
}
