//! Bounded-concurrency job runner

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashSet;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use super::gate::AdmissionGate;
use super::job::Job;
use crate::error::FailureKind;
use crate::transport::{Outcome, TransportRegistry};

/// An outcome paired with the job that produced it
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Originating job
    pub job: Job,
    /// What happened
    pub outcome: Outcome,
}

/// Runs jobs through the transport registry under a concurrency cap
#[derive(Debug, Clone)]
pub struct Scheduler {
    registry: Arc<TransportRegistry>,
    timeout: Duration,
}

impl Scheduler {
    /// Create a scheduler applying `timeout` to every probe
    pub fn new(registry: Arc<TransportRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Per-probe timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start running `jobs` with at most `limit` in flight
    ///
    /// Must be called within a tokio runtime. Every job admitted before
    /// cancellation yields exactly one [`JobOutcome`]; jobs not yet admitted
    /// when `cancel` fires are dropped. The stream ends once the last
    /// admitted job has reported. Dropping the stream cancels the run.
    pub fn run(&self, jobs: Vec<Job>, limit: usize, cancel: CancellationToken) -> OutcomeStream {
        let gate = Arc::new(AdmissionGate::new(limit));
        let (tx, rx) = mpsc::unbounded_channel();
        let run_token = cancel.child_token();

        let driver = Driver {
            registry: Arc::clone(&self.registry),
            timeout: self.timeout,
            gate: Arc::clone(&gate),
            degraded: Arc::new(DashSet::new()),
            cancel: run_token.clone(),
            tx,
        };
        tokio::spawn(driver.drive(jobs));

        OutcomeStream {
            inner: UnboundedReceiverStream::new(rx),
            gate,
            _guard: run_token.drop_guard(),
        }
    }
}

/// Admission loop state
struct Driver {
    registry: Arc<TransportRegistry>,
    timeout: Duration,
    gate: Arc<AdmissionGate>,
    /// Servers that hit local resource exhaustion
    degraded: Arc<DashSet<String>>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<JobOutcome>,
}

impl Driver {
    async fn drive(self, jobs: Vec<Job>) {
        let total = jobs.len();
        let mut admitted = 0usize;

        for job in jobs {
            let permit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                permit = self.gate.acquire() => match permit {
                    Some(permit) => permit,
                    None => break,
                },
            };
            // Cancellation may have raced the hand-off
            if self.cancel.is_cancelled() {
                break;
            }
            admitted += 1;

            if self.degraded.contains(&job.server.name) {
                let outcome = Outcome::failed(
                    FailureKind::ConnectionRefused,
                    format!(
                        "server '{}' skipped after local resource exhaustion",
                        job.server.name
                    ),
                );
                let _ = self.tx.send(JobOutcome { job, outcome });
                continue;
            }

            let registry = Arc::clone(&self.registry);
            let degraded = Arc::clone(&self.degraded);
            let tx = self.tx.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                // Released after the outcome is delivered
                let _permit = permit;

                let outcome = registry
                    .probe(&job.server, job.protocol, &job.request(), timeout)
                    .await;

                if outcome.local_exhaustion && degraded.insert(job.server.name.clone()) {
                    warn!(
                        server = %job.server.name,
                        protocol = %job.protocol,
                        error = outcome.error.as_deref().unwrap_or_default(),
                        "local resource exhaustion, degrading remaining jobs for server"
                    );
                }

                let _ = tx.send(JobOutcome { job, outcome });
            });
        }

        if admitted < total {
            debug!(admitted, total, "admission stopped before all jobs started");
        }
        self.gate.close();
    }
}

/// Stream of outcomes from a running [`Scheduler::run`]
///
/// No ordering is guaranteed between outcomes.
pub struct OutcomeStream {
    inner: UnboundedReceiverStream<JobOutcome>,
    gate: Arc<AdmissionGate>,
    _guard: DropGuard,
}

impl OutcomeStream {
    /// Admission gate of this run, for instrumentation
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }
}

impl std::fmt::Debug for OutcomeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeStream")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Stream for OutcomeStream {
    type Item = JobOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobOutcome>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
