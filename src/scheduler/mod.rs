//! Query scheduler
//!
//! Expands a configuration into jobs ([`JobPlan::expand`]) and runs them
//! under a concurrency cap ([`Scheduler::run`]).
//!
//! ```text
//!   JobPlan ──► driver ──acquire──► AdmissionGate
//!                 │
//!                 ├─ spawn ─► TransportRegistry::probe ─┐
//!                 ├─ spawn ─► TransportRegistry::probe ─┤  mpsc
//!                 └─ ...                                └──────► OutcomeStream
//! ```
//!
//! A server whose probes hit local resource exhaustion is degraded: its
//! remaining jobs report `connection-refused` without touching the network.

mod gate;
mod job;
mod runner;

pub use gate::{AdmissionGate, AdmissionPermit};
pub use job::{random_name, Job, JobPlan, QueryKind, StatsKey, UNCACHED_LABEL_LEN};
pub use runner::{JobOutcome, OutcomeStream, Scheduler};
