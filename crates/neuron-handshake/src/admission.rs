//! Connection admission gate (C7): bounded concurrency with strict FIFO
//! fairness, built on `tokio::sync::Semaphore` plus an explicit `VecDeque`
//! of oneshot waiters, because `Semaphore::acquire` does not document FIFO
//! wake order and enqueue order must be preserved.
//!
//! "No connection is ever rejected synchronously when a slot *might*
//! become available within the timeout window" (spec §4.7) is why `admit`
//! always enqueues rather than failing fast on a full gate: rejection only
//! happens once the per-entry deadline actually elapses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use neuron_core::NeuronError;
use tokio::sync::oneshot;
use tokio::time::timeout;

struct Waiter {
    notify: oneshot::Sender<()>,
}

struct State {
    available: usize,
    queue: VecDeque<Waiter>,
}

/// An admitted slot. Dropping it releases the slot back to the gate and
/// wakes the longest-waiting queued entry, if any.
pub struct Admission<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Like [`Admission`] but holding an owned `Arc` instead of a borrow — for
/// callers (e.g. a spawned per-connection task) that can't tie the guard's
/// lifetime to a stack frame.
pub struct OwnedAdmission(Arc<AdmissionGate>);

impl Drop for OwnedAdmission {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub struct AdmissionGate {
    limit: usize,
    queue_timeout: Duration,
    state: Mutex<State>,
}

impl AdmissionGate {
    pub fn new(limit: usize, queue_timeout: Duration) -> Self {
        Self {
            limit,
            queue_timeout,
            state: Mutex::new(State {
                available: limit,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Active session count (admitted, not yet released) — the gate's
    /// `limit - available` — used for observability (spec §6 `active_sessions`).
    pub fn active_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        self.limit - state.available
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// Request a slot. Admits immediately if one is free; otherwise
    /// enqueues FIFO and waits up to `queue_timeout` before giving up with
    /// `QueueTimeout`.
    pub async fn admit(&self) -> Result<Admission<'_>, NeuronError> {
        self.acquire().await?;
        Ok(Admission { gate: self })
    }

    /// Like `admit`, but returns a guard holding an owned `Arc` instead of
    /// a borrow — for a caller (e.g. `neuron-server`'s per-connection
    /// WebSocket handler task) whose guard must outlive the stack frame
    /// that requested it.
    pub async fn admit_owned(self: &Arc<Self>) -> Result<OwnedAdmission, NeuronError> {
        self.acquire().await?;
        Ok(OwnedAdmission(Arc::clone(self)))
    }

    async fn acquire(&self) -> Result<(), NeuronError> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            if state.available > 0 {
                state.available -= 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(Waiter { notify: tx });
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            match timeout(self.queue_timeout, rx).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(NeuronError::QueueTimeout),
                Err(_) => {
                    // We timed out; the slot (if granted concurrently) must be
                    // returned since we never got to use it.
                    return Err(NeuronError::QueueTimeout);
                }
            }
        }

        Ok(())
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        while let Some(waiter) = state.queue.pop_front() {
            if waiter.notify.send(()).is_ok() {
                // The slot transfers directly to the woken waiter: `available`
                // does not change, it was already reserved for this handoff.
                return;
            }
            // Receiver was dropped (deadline elapsed first) — try the next one.
        }
        state.available += 1;
    }
}
