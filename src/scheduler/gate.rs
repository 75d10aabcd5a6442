//! Admission gate
//!
//! A counter of in-flight jobs plus a FIFO queue of parked waiters. A slot
//! released while someone is waiting is handed straight to the oldest
//! waiter, so the count never exceeds the limit and nobody starves.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dns_bench::scheduler::AdmissionGate;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gate = Arc::new(AdmissionGate::new(2));
//! let a = gate.acquire().await.unwrap();
//! let b = gate.acquire().await.unwrap();
//! assert_eq!(gate.in_flight(), 2);
//!
//! drop(a);
//! drop(b);
//! assert_eq!(gate.in_flight(), 0);
//! assert_eq!(gate.peak(), 2);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    peak: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
    closed: bool,
}

/// Bounded admission with direct hand-off to FIFO waiters
#[derive(Debug)]
pub struct AdmissionGate {
    limit: usize,
    state: Mutex<GateState>,
}

impl AdmissionGate {
    /// Create a gate admitting at most `limit` holders (minimum 1)
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            state: Mutex::new(GateState::default()),
        }
    }

    /// Configured limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Highest number of permits held at once
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    /// Callers parked waiting for a slot
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Wait for a slot
    ///
    /// Returns `None` once the gate is closed. Dropping the returned future
    /// while parked gives up the place in the queue without leaking a slot.
    pub async fn acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let rx = {
            let mut state = self.state.lock();
            if state.closed {
                return None;
            }
            if state.in_flight < self.limit && state.waiters.is_empty() {
                state.in_flight += 1;
                state.peak = state.peak.max(state.in_flight);
                return Some(AdmissionPermit {
                    gate: Arc::clone(self),
                });
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut waiter = Waiter {
            gate: self.as_ref(),
            rx,
            granted: false,
        };
        match (&mut waiter.rx).await {
            Ok(()) => {
                waiter.granted = true;
                Some(AdmissionPermit {
                    gate: Arc::clone(self),
                })
            }
            // Sender dropped by close()
            Err(_) => None,
        }
    }

    /// Stop admitting; parked waiters get `None`, held permits stay valid
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.waiters.clear();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(tx) = state.waiters.pop_front() {
            // Slot moves to the waiter; the count is unchanged
            if tx.send(()).is_ok() {
                return;
            }
        }
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Parked waiter that returns an unclaimed hand-off on drop
struct Waiter<'a> {
    gate: &'a AdmissionGate,
    rx: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.gate.release();
        }
    }
}

/// A held slot, released on drop
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
