//! Benchmark entry point
//!
//! [`Benchmark::run`] drives one bounded run:
//!
//! ```text
//!   BenchConfig ──► JobPlan ──► Scheduler ──► OutcomeStream ──► Aggregator ─┐
//!                                                                           ├─► Report
//!   BenchConfig ──► SecurityAnalyzer ───────────────────────────────────────┘
//! ```
//!
//! The latency benchmark and the security pass run concurrently over the
//! same transport registry.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::config::BenchConfig;
use crate::error::ConfigError;
use crate::report::{Report, RunStatus};
use crate::scheduler::{JobPlan, OutcomeStream, Scheduler};
use crate::security::{SecurityAnalyzer, SecurityFinding};
use crate::transport::TransportRegistry;

/// Progress is logged every this many percent of completed jobs
const PROGRESS_STEP_PCT: usize = 10;

/// A validated benchmark ready to run
#[derive(Debug, Clone)]
pub struct Benchmark {
    config: BenchConfig,
    registry: Arc<TransportRegistry>,
}

impl Benchmark {
    /// Validate `config` and build the default transports
    ///
    /// TCP and `DoT` pools hold up to `concurrency_limit` connections per
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if validation or transport setup fails.
    pub fn new(config: BenchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = TransportRegistry::with_defaults(config.concurrency_limit)?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Validate `config` and use the given transports
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if validation fails.
    pub fn with_registry(
        config: BenchConfig,
        registry: Arc<TransportRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    /// Configuration of this benchmark
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run the benchmark to completion or cancellation
    ///
    /// Cancelling `cancel` stops admitting jobs; in-flight jobs finish
    /// within their timeout and the report, built from the observed
    /// outcomes only, is marked incomplete.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a planned protocol has no
    /// registered transport. No job is started in that case.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Report, ConfigError> {
        let started = Instant::now();
        let plan = JobPlan::expand(&self.config);

        for key in &plan.keys {
            if self.registry.get(key.protocol).is_none() {
                return Err(ConfigError::invalid(format!(
                    "protocol {} requested but no transport is available",
                    key.protocol
                )));
            }
        }

        let planned = plan.len();
        info!(
            jobs = planned,
            servers = self.config.servers.len(),
            concurrency = self.config.concurrency_limit,
            timeout_secs = self.config.timeout_secs,
            "benchmark starting"
        );

        let scheduler = Scheduler::new(Arc::clone(&self.registry), self.config.timeout());
        let aggregator = Aggregator::with_keys(plan.keys);
        let stream = scheduler.run(plan.jobs, self.config.concurrency_limit, cancel.clone());
        let gate = Arc::clone(stream.gate());

        let (aggregator, security) = tokio::join!(
            collect(stream, aggregator, planned),
            self.security_pass(&cancel),
        );

        let observed = aggregator.observed();
        let status = if usize::try_from(observed).map_or(false, |n| n == planned) {
            RunStatus::Complete
        } else if cancel.is_cancelled() {
            RunStatus::Incomplete {
                reason: format!("cancelled after {observed} of {planned} jobs"),
            }
        } else {
            RunStatus::Incomplete {
                reason: format!("only {observed} of {planned} jobs reported"),
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            observed,
            planned,
            duration_ms,
            peak_in_flight = gate.peak(),
            complete = status.is_complete(),
            "benchmark finished"
        );

        Ok(Report {
            status,
            duration_ms,
            jobs_planned: planned,
            outcomes_observed: observed,
            peak_in_flight: gate.peak(),
            stats: aggregator.stats(),
            security,
        })
    }

    async fn security_pass(&self, cancel: &CancellationToken) -> Vec<SecurityFinding> {
        if !self.config.security.enabled {
            debug!("security pass disabled");
            return Vec::new();
        }
        SecurityAnalyzer::new(
            Arc::clone(&self.registry),
            self.config.security.clone(),
            self.config.timeout(),
        )
        .analyze(&self.config.servers, cancel)
        .await
    }
}

/// Feed every outcome into the aggregator, logging progress
async fn collect(
    mut stream: OutcomeStream,
    mut aggregator: Aggregator,
    planned: usize,
) -> Aggregator {
    let step = (planned * PROGRESS_STEP_PCT / 100).max(1);
    let mut completed = 0usize;

    while let Some(result) = stream.next().await {
        aggregator.observe(&result);
        completed += 1;

        if completed % step == 0 || completed == planned {
            info!(
                completed,
                total = planned,
                percent = completed * 100 / planned.max(1),
                in_flight = stream.gate().in_flight(),
                "benchmark progress"
            );
        }
    }
    aggregator
}

/// Validate `config`, build the default transports and run to completion
///
/// # Errors
///
/// Returns a `ConfigError` if validation or transport setup fails.
pub async fn run_benchmark(config: BenchConfig) -> Result<Report, ConfigError> {
    Benchmark::new(config)?.run(CancellationToken::new()).await
}
