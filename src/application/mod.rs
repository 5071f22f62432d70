//! Application layer containing the orchestration logic.
//!
//! `PaymentOrchestrator` drives the submission pipeline and failover,
//! `WebhookCorrelator` reconciles asynchronous provider events, and
//! `SlaMonitor` sweeps in-flight payments against their deadlines. All
//! state transitions for a single payment are serialized through a
//! per-payment lock owned by the orchestrator.

pub mod correlator;
pub mod orchestrator;
pub mod sla;
