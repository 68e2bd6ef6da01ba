//! Server health state machine.
//!
//! # States
//! - Degraded: registered, not yet settled by probes (initial only)
//! - Healthy: server receives traffic
//! - Unhealthy: server excluded from selection
//!
//! # State Transitions
//! ```text
//! Degraded  → Healthy:   consecutive successes >= healthy_threshold
//! Degraded  → Unhealthy: consecutive failures  >= unhealthy_threshold
//! Healthy   → Unhealthy: consecutive failures  >= unhealthy_threshold
//! Unhealthy → Healthy:   consecutive successes >= healthy_threshold
//! ```
//! Degraded is never re-entered. A single probe result never flips a settled
//! server unless its threshold is 1.

use std::time::SystemTime;

use crate::config::HealthCheckConfig;
use crate::health::probe::ProbeOutcome;
use crate::load_balancer::{Health, HealthStatus};

/// Weight of the newest probe in the rolling error rate.
const ERROR_RATE_ALPHA: f64 = 0.2;

/// Hysteresis thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub unhealthy: u32,
    pub healthy: u32,
}

impl From<&HealthCheckConfig> for Thresholds {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            unhealthy: config.unhealthy_threshold.max(1),
            healthy: config.healthy_threshold.max(1),
        }
    }
}

/// A status change produced by a probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

/// Fold one probe outcome into a health snapshot.
pub fn apply_outcome(
    health: &Health,
    outcome: &ProbeOutcome,
    thresholds: &Thresholds,
    now: SystemTime,
) -> (Health, Option<Transition>) {
    let mut next = health.clone();
    next.last_check = Some(now);

    if outcome.success {
        // Failed probes say nothing about load; keep the last good latency.
        next.last_response_time_ms = outcome.response_time.as_millis().min(u64::MAX as u128) as u64;
        next.consecutive_successes = next.consecutive_successes.saturating_add(1);
        next.consecutive_failures = 0;
    } else {
        next.consecutive_failures = next.consecutive_failures.saturating_add(1);
        next.consecutive_successes = 0;
    }

    let sample = if outcome.success { 0.0 } else { 1.0 };
    next.error_rate = ERROR_RATE_ALPHA * sample + (1.0 - ERROR_RATE_ALPHA) * health.error_rate;

    if let Some(gauges) = &outcome.gauges {
        if let Some(rate) = gauges.error_rate {
            next.error_rate = rate.clamp(0.0, 1.0);
        }
        next.cpu = gauges.cpu.or(next.cpu);
        next.memory = gauges.memory.or(next.memory);
    }

    let target = match health.status {
        HealthStatus::Degraded | HealthStatus::Unhealthy
            if next.consecutive_successes >= thresholds.healthy =>
        {
            Some(HealthStatus::Healthy)
        }
        HealthStatus::Degraded | HealthStatus::Healthy
            if next.consecutive_failures >= thresholds.unhealthy =>
        {
            Some(HealthStatus::Unhealthy)
        }
        _ => None,
    };

    let transition = target.map(|to| {
        next.status = to;
        Transition {
            from: health.status,
            to,
        }
    });

    (next, transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::ProbeGauges;
    use std::time::Duration;

    const T: Thresholds = Thresholds {
        unhealthy: 3,
        healthy: 2,
    };

    fn run(health: &Health, outcomes: &[bool]) -> (Health, Vec<Transition>) {
        let mut current = health.clone();
        let mut transitions = Vec::new();
        for &ok in outcomes {
            let outcome = if ok {
                ProbeOutcome::success(Duration::from_millis(5))
            } else {
                ProbeOutcome::failure(Duration::from_millis(5))
            };
            let (next, t) = apply_outcome(&current, &outcome, &T, SystemTime::now());
            transitions.extend(t);
            current = next;
        }
        (current, transitions)
    }

    #[test]
    fn degraded_becomes_healthy_after_threshold() {
        let (health, transitions) = run(&Health::initial(), &[true]);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(transitions.is_empty());

        let (health, transitions) = run(&health, &[true]);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(
            transitions,
            vec![Transition {
                from: HealthStatus::Degraded,
                to: HealthStatus::Healthy
            }]
        );
    }

    #[test]
    fn hysteresis_down_and_back_up() {
        let (healthy, _) = run(&Health::initial(), &[true, true]);

        let (h, t) = run(&healthy, &[false, false]);
        assert_eq!(h.status, HealthStatus::Healthy);
        assert!(t.is_empty());

        let (h, t) = run(&h, &[false]);
        assert_eq!(h.status, HealthStatus::Unhealthy);
        assert_eq!(h.consecutive_failures, 3);
        assert_eq!(t.len(), 1);

        let (h, t) = run(&h, &[true]);
        assert_eq!(h.status, HealthStatus::Unhealthy);
        assert!(t.is_empty());

        let (h, t) = run(&h, &[true]);
        assert_eq!(h.status, HealthStatus::Healthy);
        assert_eq!(
            t,
            vec![Transition {
                from: HealthStatus::Unhealthy,
                to: HealthStatus::Healthy
            }]
        );
    }

    #[test]
    fn interleaved_outcomes_never_flip() {
        let (healthy, _) = run(&Health::initial(), &[true, true]);
        let (h, t) = run(&healthy, &[false, false, true, false, false, true]);
        assert_eq!(h.status, HealthStatus::Healthy);
        assert!(t.is_empty());
    }

    #[test]
    fn degraded_server_that_never_answers_goes_unhealthy() {
        let (h, t) = run(&Health::initial(), &[false, false, false]);
        assert_eq!(h.status, HealthStatus::Unhealthy);
        assert_eq!(t[0].from, HealthStatus::Degraded);
    }

    #[test]
    fn degraded_is_never_reentered() {
        let (h, _) = run(&Health::initial(), &[true, true, false, false, false, true, true]);
        assert_eq!(h.status, HealthStatus::Healthy);
        let (_, t) = run(&h, &[false; 10]);
        assert!(t.iter().all(|t| t.to != HealthStatus::Degraded));
    }

    #[test]
    fn gauges_only_come_from_the_probe() {
        let (h, _) = run(&Health::initial(), &[true]);
        assert!(h.cpu.is_none());
        assert!(h.memory.is_none());

        let outcome = ProbeOutcome::success(Duration::from_millis(12)).with_gauges(ProbeGauges {
            cpu: Some(0.5),
            memory: None,
            error_rate: Some(0.1),
        });
        let (h, _) = apply_outcome(&h, &outcome, &T, SystemTime::now());
        assert_eq!(h.cpu, Some(0.5));
        assert!(h.memory.is_none());
        assert_eq!(h.error_rate, 0.1);
        assert_eq!(h.last_response_time_ms, 12);
    }

    #[test]
    fn failed_probe_keeps_last_good_latency() {
        let (h, _) = run(&Health::initial(), &[true, true]);
        assert_eq!(h.last_response_time_ms, 5);

        let (h, _) = apply_outcome(&h, &ProbeOutcome::failure(Duration::ZERO), &T, SystemTime::now());
        assert_eq!(h.status, HealthStatus::Healthy);
        assert_eq!(h.consecutive_failures, 1);
        assert_eq!(h.last_response_time_ms, 5);
    }

    #[test]
    fn error_rate_tracks_failures_without_gauges() {
        let (h, _) = run(&Health::initial(), &[false, false]);
        assert!(h.error_rate > 0.3 && h.error_rate < 0.4);
        let (h, _) = run(&h, &[true; 20]);
        assert!(h.error_rate < 0.01);
    }
}
