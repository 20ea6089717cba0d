// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Circuit Breaker
//!
//! Tracks call outcomes per `(agent, capability)` and decides, before every
//! outbound call, whether the call may proceed.
//!
//! Each key owns a [`Circuit`] behind its own `parking_lot::Mutex`; the lock
//! is only held for the admission decision and the outcome bookkeeping, never
//! across an await. Callers that arrive while a half-open probe is in flight
//! park on the key's [`Notify`] until the probe settles or their own deadline
//! passes.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::circuit::{
    Admission, Circuit, CircuitKey, CircuitPhase, CircuitPolicy, CircuitSnapshot,
};
use crate::domain::events::CircuitEvent;
use crate::domain::routing::RoutingError;
use crate::infrastructure::event_bus::EventBus;

/// How a permitted call ended, from the circuit's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

struct CircuitSlot {
    circuit: Mutex<Circuit>,
    probe_settled: Notify,
}

pub struct CircuitBreaker {
    policy: CircuitPolicy,
    circuits: DashMap<CircuitKey, Arc<CircuitSlot>>,
    event_bus: EventBus,
}

impl CircuitBreaker {
    pub fn new(policy: CircuitPolicy, event_bus: EventBus) -> Self {
        Self {
            policy,
            circuits: DashMap::new(),
            event_bus,
        }
    }

    pub fn policy(&self) -> &CircuitPolicy {
        &self.policy
    }

    /// Asks permission for one call to `key`.
    ///
    /// Returns `CircuitOpen` without waiting while the circuit is open. While
    /// another caller's probe is in flight, waits for it to settle and then
    /// re-evaluates; gives up with `Timeout` at `wait_until`.
    pub async fn acquire(
        &self,
        key: &CircuitKey,
        wait_until: Instant,
    ) -> Result<CallPermit, RoutingError> {
        let slot = self.slot(key);
        let started = Instant::now();

        loop {
            // Registered before the state check so a probe settling in
            // between still wakes this caller.
            let notified = slot.probe_settled.notified();

            let (admission, before, after) = {
                let mut circuit = slot.circuit.lock();
                let before = circuit.phase();
                let admission = circuit.admit(Instant::now());
                (admission, before, circuit.phase())
            };
            if before != after {
                publish_transition(&self.event_bus, key, before, after);
            }

            match admission {
                Admission::Pass => return Ok(self.permit(key, Arc::clone(&slot), false)),
                Admission::Probe => {
                    info!(agent_id = %key.agent_id, capability = %key.capability, "Circuit half-open, sending probe");
                    return Ok(self.permit(key, Arc::clone(&slot), true));
                }
                Admission::Reject { retry_after } => {
                    metrics::counter!(
                        "a2a_circuit_rejections_total",
                        "capability" => key.capability.to_string()
                    )
                    .increment(1);
                    return Err(RoutingError::CircuitOpen {
                        capability: key.capability.clone(),
                        agent_id: key.agent_id.clone(),
                        retry_after,
                    });
                }
                Admission::AwaitProbe => {
                    debug!(agent_id = %key.agent_id, capability = %key.capability, "Waiting for in-flight probe");
                    tokio::select! {
                        _ = notified => continue,
                        _ = tokio::time::sleep_until(wait_until) => {
                            return Err(RoutingError::Timeout {
                                capability: key.capability.clone(),
                                agent_id: Some(key.agent_id.clone()),
                                elapsed: started.elapsed(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Current phase of `key`, `None` if it was never called.
    pub fn phase(&self, key: &CircuitKey) -> Option<CircuitPhase> {
        self.circuits.get(key).map(|slot| slot.circuit.lock().phase())
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|entry| CircuitSnapshot::of(entry.key(), &entry.value().circuit.lock()))
            .collect();
        snapshots.sort_by(|a, b| {
            (a.agent_id.as_str(), a.capability.as_str())
                .cmp(&(b.agent_id.as_str(), b.capability.as_str()))
        });
        snapshots
    }

    fn slot(&self, key: &CircuitKey) -> Arc<CircuitSlot> {
        if let Some(slot) = self.circuits.get(key) {
            return Arc::clone(&slot);
        }
        let policy = self.policy.clone();
        Arc::clone(&self.circuits.entry(key.clone()).or_insert_with(|| {
            Arc::new(CircuitSlot {
                circuit: Mutex::new(Circuit::new(policy)),
                probe_settled: Notify::new(),
            })
        }))
    }

    fn permit(&self, key: &CircuitKey, slot: Arc<CircuitSlot>, probe: bool) -> CallPermit {
        CallPermit {
            key: key.clone(),
            slot,
            probe,
            recorded: false,
            event_bus: self.event_bus.clone(),
        }
    }
}

/// Admission ticket for one call.
///
/// Record the outcome with [`CallPermit::record`]. A probe permit dropped
/// without a recorded outcome (the call was cancelled) frees the probe slot so
/// the next caller can probe.
pub struct CallPermit {
    key: CircuitKey,
    slot: Arc<CircuitSlot>,
    probe: bool,
    recorded: bool,
    event_bus: EventBus,
}

impl CallPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: CallOutcome) {
        self.recorded = true;
        let (before, after) = {
            let mut circuit = self.slot.circuit.lock();
            let before = circuit.phase();
            match outcome {
                CallOutcome::Success => circuit.on_success(self.probe),
                CallOutcome::Failure => circuit.on_failure(self.probe, Instant::now()),
            }
            (before, circuit.phase())
        };

        if outcome == CallOutcome::Failure {
            metrics::counter!(
                "a2a_circuit_failures_total",
                "capability" => self.key.capability.to_string()
            )
            .increment(1);
        }
        if before != after {
            publish_transition(&self.event_bus, &self.key, before, after);
        }
        if self.probe {
            self.slot.probe_settled.notify_waiters();
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.recorded || !self.probe {
            return;
        }
        self.slot.circuit.lock().release_probe();
        self.slot.probe_settled.notify_waiters();
    }
}

fn publish_transition(event_bus: &EventBus, key: &CircuitKey, from: CircuitPhase, to: CircuitPhase) {
    match to {
        CircuitPhase::Open => {
            warn!(agent_id = %key.agent_id, capability = %key.capability, from = %from, "Circuit opened")
        }
        _ => info!(agent_id = %key.agent_id, capability = %key.capability, from = %from, to = %to, "Circuit transition"),
    }
    metrics::counter!("a2a_circuit_transitions_total", "to" => to.to_string()).increment(1);
    event_bus.publish_circuit_event(CircuitEvent::StateChanged {
        agent_id: key.agent_id.clone(),
        capability: key.capability.clone(),
        from,
        to,
        changed_at: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::capability::CapabilityName;
    use std::time::Duration;

    fn breaker(cooldown: Duration) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            CircuitPolicy {
                failure_threshold: 2,
                cooldown,
                max_cooldown: cooldown * 4,
            },
            EventBus::new(64),
        ))
    }

    fn key() -> CircuitKey {
        CircuitKey::new(
            AgentId::new("pricing-1").unwrap(),
            CapabilityName::new("pricing.quote@v1").unwrap(),
        )
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    async fn fail(breaker: &CircuitBreaker) {
        breaker
            .acquire(&key(), soon())
            .await
            .unwrap()
            .record(CallOutcome::Failure);
    }

    #[tokio::test]
    async fn test_rejects_once_open() {
        let breaker = breaker(Duration::from_secs(30));
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.phase(&key()), Some(CircuitPhase::Open));
        let err = breaker.acquire(&key(), soon()).await.err().unwrap();
        assert!(matches!(err, RoutingError::CircuitOpen { .. }));
        assert_eq!(breaker.snapshot()[0].counters.rejections, 1);
    }

    #[tokio::test]
    async fn test_waiters_resume_after_probe_succeeds() {
        let breaker = breaker(Duration::from_millis(20));
        fail(&breaker).await;
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let probe = breaker.acquire(&key(), soon()).await.unwrap();
        assert!(probe.is_probe());

        let waiter = {
            let breaker = Arc::clone(&breaker);
            tokio::spawn(async move { breaker.acquire(&key(), soon()).await.map(|p| p.is_probe()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        probe.record(CallOutcome::Success);
        assert_eq!(waiter.await.unwrap(), Ok(false));
        assert_eq!(breaker.phase(&key()), Some(CircuitPhase::Closed));
    }

    #[tokio::test]
    async fn test_waiter_times_out_behind_slow_probe() {
        let breaker = breaker(Duration::from_millis(20));
        fail(&breaker).await;
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let _probe = breaker.acquire(&key(), soon()).await.unwrap();
        let err = breaker
            .acquire(&key(), Instant::now() + Duration::from_millis(30))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RoutingError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_dropped_probe_frees_the_slot() {
        let breaker = breaker(Duration::from_millis(20));
        fail(&breaker).await;
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let probe = breaker.acquire(&key(), soon()).await.unwrap();
        drop(probe);

        let next = breaker.acquire(&key(), soon()).await.unwrap();
        assert!(next.is_probe());
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let breaker = CircuitBreaker::new(
            CircuitPolicy {
                failure_threshold: 1,
                cooldown: Duration::from_secs(30),
                max_cooldown: Duration::from_secs(60),
            },
            bus,
        );
        breaker
            .acquire(&key(), soon())
            .await
            .unwrap()
            .record(CallOutcome::Failure);

        match events.recv().await.unwrap() {
            crate::infrastructure::event_bus::DomainEvent::Circuit(CircuitEvent::StateChanged {
                from,
                to,
                ..
            }) => {
                assert_eq!(from, CircuitPhase::Closed);
                assert_eq!(to, CircuitPhase::Open);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
