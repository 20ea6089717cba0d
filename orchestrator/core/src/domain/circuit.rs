// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Circuit state machine for one (agent, capability) pair.
//!
//! ```text
//!            N consecutive failures
//!   Closed ─────────────────────────▶ Open{until}
//!     ▲                                  │ cooldown elapsed
//!     │ probe succeeded                  ▼
//!     └──────────────────────────── HalfOpen ──probe failed──▶ Open (cooldown x2, capped)
//! ```
//!
//! The machine is pure: callers pass `now` and act on the returned
//! [`Admission`]. Concurrency (waiting for a probe to settle) lives in
//! `application::circuit_breaker`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::agent::AgentId;
use crate::domain::capability::CapabilityName;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitKey {
    pub agent_id: AgentId,
    pub capability: CapabilityName,
}

impl CircuitKey {
    pub fn new(agent_id: AgentId, capability: CapabilityName) -> Self {
        Self { agent_id, capability }
    }
}

impl std::fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.agent_id, self.capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitPolicy {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    #[serde(with = "humantime_serde")]
    pub max_cooldown: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

impl CircuitState {
    pub fn phase(&self) -> CircuitPhase {
        match self {
            CircuitState::Closed => CircuitPhase::Closed,
            CircuitState::Open { .. } => CircuitPhase::Open,
            CircuitState::HalfOpen { .. } => CircuitPhase::HalfOpen,
        }
    }
}

/// State without its timing payload, for reporting and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CircuitPhase::Closed => "closed",
            CircuitPhase::Open => "open",
            CircuitPhase::HalfOpen => "half_open",
        })
    }
}

/// Decision for one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; call proceeds normally.
    Pass,
    /// Caller holds the single half-open probe slot.
    Probe,
    /// Circuit open; fail fast.
    Reject { retry_after: Duration },
    /// Another caller's probe is in flight; wait for it to settle.
    AwaitProbe,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitCounters {
    pub successes: u64,
    pub failures: u64,
    /// Fast-fail rejections. Kept apart from `failures` so rejections do not
    /// inflate the failure statistics of the agent.
    pub rejections: u64,
    pub probes: u64,
}

#[derive(Debug, Clone)]
pub struct Circuit {
    policy: CircuitPolicy,
    state: CircuitState,
    consecutive_failures: u32,
    current_cooldown: Duration,
    last_transition: DateTime<Utc>,
    counters: CircuitCounters,
}

impl Circuit {
    pub fn new(policy: CircuitPolicy) -> Self {
        let cooldown = policy.cooldown;
        Self {
            policy,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            current_cooldown: cooldown,
            last_transition: Utc::now(),
            counters: CircuitCounters::default(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn phase(&self) -> CircuitPhase {
        self.state.phase()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_cooldown(&self) -> Duration {
        self.current_cooldown
    }

    pub fn counters(&self) -> CircuitCounters {
        self.counters
    }

    pub fn last_transition(&self) -> DateTime<Utc> {
        self.last_transition
    }

    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Pass,
            CircuitState::Open { until } if now >= until => {
                self.transition(CircuitState::HalfOpen { probe_in_flight: true });
                self.counters.probes += 1;
                Admission::Probe
            }
            CircuitState::Open { until } => {
                self.counters.rejections += 1;
                Admission::Reject {
                    retry_after: until - now,
                }
            }
            CircuitState::HalfOpen { probe_in_flight: false } => {
                self.state = CircuitState::HalfOpen { probe_in_flight: true };
                self.counters.probes += 1;
                Admission::Probe
            }
            CircuitState::HalfOpen { probe_in_flight: true } => Admission::AwaitProbe,
        }
    }

    /// The agent answered (successfully or with a domain error).
    ///
    /// Only the probe decides recovery. A success from a call admitted before
    /// the circuit opened is counted but leaves an open or half-open circuit
    /// as it is.
    pub fn on_success(&mut self, probe: bool) {
        self.counters.successes += 1;
        match self.state {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::HalfOpen { .. } if probe => {
                self.consecutive_failures = 0;
                self.current_cooldown = self.policy.cooldown;
                self.transition(CircuitState::Closed);
            }
            _ => {}
        }
    }

    pub fn on_failure(&mut self, probe: bool, now: Instant) {
        self.counters.failures += 1;
        match self.state {
            CircuitState::HalfOpen { .. } if probe => {
                self.current_cooldown = (self.current_cooldown * 2).min(self.policy.max_cooldown);
                self.transition(CircuitState::Open {
                    until: now + self.current_cooldown,
                });
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.policy.failure_threshold {
                    self.transition(CircuitState::Open {
                        until: now + self.current_cooldown,
                    });
                }
            }
            // A call admitted while closed finished after the circuit had
            // already opened or moved to half-open; it only adds to the tally.
            _ => self.consecutive_failures += 1,
        }
    }

    /// Frees the probe slot when a probe ends without a recorded outcome.
    pub fn release_probe(&mut self) {
        if let CircuitState::HalfOpen { probe_in_flight: true } = self.state {
            self.state = CircuitState::HalfOpen { probe_in_flight: false };
        }
    }

    fn transition(&mut self, next: CircuitState) {
        self.state = next;
        self.last_transition = Utc::now();
    }
}

/// Serializable view of one circuit for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub agent_id: AgentId,
    pub capability: CapabilityName,
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub cooldown_ms: u64,
    pub last_transition: DateTime<Utc>,
    pub counters: CircuitCounters,
}

impl CircuitSnapshot {
    pub fn of(key: &CircuitKey, circuit: &Circuit) -> Self {
        Self {
            agent_id: key.agent_id.clone(),
            capability: key.capability.clone(),
            phase: circuit.phase(),
            consecutive_failures: circuit.consecutive_failures(),
            cooldown_ms: circuit.current_cooldown().as_millis() as u64,
            last_transition: circuit.last_transition(),
            counters: circuit.counters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CircuitPolicy {
        CircuitPolicy {
            failure_threshold: 3,
            cooldown: Duration::from_secs(10),
            max_cooldown: Duration::from_secs(25),
        }
    }

    fn trip(circuit: &mut Circuit, now: Instant) {
        for _ in 0..3 {
            assert_eq!(circuit.admit(now), Admission::Pass);
            circuit.on_failure(false, now);
        }
    }

    #[test]
    fn test_opens_after_threshold_consecutive_failures() {
        let now = Instant::now();
        let mut circuit = Circuit::new(policy());

        circuit.on_failure(false, now);
        circuit.on_failure(false, now);
        assert_eq!(circuit.phase(), CircuitPhase::Closed);

        circuit.on_failure(false, now);
        assert_eq!(circuit.phase(), CircuitPhase::Open);
        assert!(matches!(circuit.admit(now), Admission::Reject { .. }));
        assert_eq!(circuit.counters().rejections, 1);
        assert_eq!(circuit.counters().failures, 3);
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let now = Instant::now();
        let mut circuit = Circuit::new(policy());

        circuit.on_failure(false, now);
        circuit.on_failure(false, now);
        circuit.on_success(false);
        circuit.on_failure(false, now);
        circuit.on_failure(false, now);

        assert_eq!(circuit.phase(), CircuitPhase::Closed);
        assert_eq!(circuit.consecutive_failures(), 2);
    }

    #[test]
    fn test_single_probe_after_cooldown() {
        let start = Instant::now();
        let mut circuit = Circuit::new(policy());
        trip(&mut circuit, start);

        let later = start + Duration::from_secs(10);
        assert_eq!(circuit.admit(later), Admission::Probe);
        assert_eq!(circuit.admit(later), Admission::AwaitProbe);
        assert_eq!(circuit.admit(later), Admission::AwaitProbe);

        circuit.on_success(true);
        assert_eq!(circuit.phase(), CircuitPhase::Closed);
        assert_eq!(circuit.admit(later), Admission::Pass);
    }

    #[test]
    fn test_straggler_success_does_not_close_half_open_circuit() {
        let start = Instant::now();
        let mut circuit = Circuit::new(policy());
        trip(&mut circuit, start);

        let later = start + Duration::from_secs(10);
        assert_eq!(circuit.admit(later), Admission::Probe);

        // Admitted while closed, answered after the trip.
        circuit.on_success(false);
        assert_eq!(circuit.phase(), CircuitPhase::HalfOpen);
        assert_eq!(circuit.admit(later), Admission::AwaitProbe);

        circuit.on_failure(true, later);
        assert_eq!(circuit.phase(), CircuitPhase::Open);
        assert_eq!(circuit.counters().successes, 1);
    }

    #[test]
    fn test_failed_probe_doubles_cooldown_up_to_cap() {
        let start = Instant::now();
        let mut circuit = Circuit::new(policy());
        trip(&mut circuit, start);

        let t1 = start + Duration::from_secs(10);
        assert_eq!(circuit.admit(t1), Admission::Probe);
        circuit.on_failure(true, t1);
        assert_eq!(circuit.current_cooldown(), Duration::from_secs(20));
        assert_eq!(
            circuit.admit(t1 + Duration::from_secs(19)),
            Admission::Reject {
                retry_after: Duration::from_secs(1)
            }
        );

        let t2 = t1 + Duration::from_secs(20);
        assert_eq!(circuit.admit(t2), Admission::Probe);
        circuit.on_failure(true, t2);
        assert_eq!(circuit.current_cooldown(), Duration::from_secs(25));

        let t3 = t2 + Duration::from_secs(25);
        assert_eq!(circuit.admit(t3), Admission::Probe);
        circuit.on_success(true);
        assert_eq!(circuit.current_cooldown(), Duration::from_secs(10));
    }

    #[test]
    fn test_released_probe_slot_can_be_reclaimed() {
        let start = Instant::now();
        let mut circuit = Circuit::new(policy());
        trip(&mut circuit, start);

        let later = start + Duration::from_secs(10);
        assert_eq!(circuit.admit(later), Admission::Probe);
        circuit.release_probe();
        assert_eq!(circuit.admit(later), Admission::Probe);
        assert_eq!(circuit.counters().probes, 2);
    }
}
