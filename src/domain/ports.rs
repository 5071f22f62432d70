use crate::domain::payment::{Amount, Payment};
use crate::domain::rail::{InstantEligibility, RailId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Result of an atomic insert-if-absent keyed by correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    Existing(Payment),
}

/// Durable source of truth for payment records.
///
/// Implementations must make `insert_if_absent` race-free (a unique
/// constraint or equivalent atomic check-and-set) and `update` a
/// compare-and-set on `Payment::version`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_if_absent(&self, payment: Payment) -> Result<InsertOutcome>;
    async fn get(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn get_by_correlation(&self, correlation_id: &str) -> Result<Option<Payment>>;
    async fn get_by_transfer(&self, transfer_id: &str) -> Result<Option<Payment>>;
    /// Persists `payment` if its `version` matches the stored record, and
    /// returns the record with the version bumped. A mismatch is
    /// `OrchestratorError::ConcurrentUpdate`.
    async fn update(&self, payment: Payment) -> Result<Payment>;
    /// Non-terminal payments carrying an SLA deadline, for the monitor sweep.
    async fn non_terminal_with_deadline(&self) -> Result<Vec<Payment>>;
}

/// Dedup log for provider webhook event ids; providers redeliver.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns `true` only the first time a (provider, event id) pair is seen.
    async fn mark_processed(&self, provider: &str, event_id: &str) -> Result<bool>;
}

/// Classified submission failure.
///
/// `Retryable` and `Rejected` may only be returned when the provider
/// provably did not move money (connection refused before a response, or an
/// idempotency-keyed request the provider itself dedupes). Adapters that
/// cannot prove this must classify ambiguous errors as `FatalInvalid` so the
/// payment stops for manual reconciliation instead of failing over.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitFailure {
    Retryable(String),
    Rejected(String),
    FatalInvalid(String),
}

/// Request handed to a rail provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub payment_id: Uuid,
    /// Unique per attempt; the provider dedupes on it, which is what makes
    /// a timed-out submission safe to classify as retryable.
    pub idempotency_key: String,
    pub rail: RailId,
    pub amount: Amount,
    pub source_funding_source: String,
    pub destination_funding_source: String,
    pub metadata: BTreeMap<String, String>,
}

/// Adapter submitting a transfer to one external payment network.
#[async_trait]
pub trait RailProvider: Send + Sync {
    /// Name used to attribute webhook events to this provider.
    fn provider_name(&self) -> &str;
    async fn submit(
        &self,
        request: &TransferRequest,
    ) -> std::result::Result<String, SubmitFailure>;
}

/// Queries whether a funding source may use instant rails.
#[async_trait]
pub trait EligibilityChecker: Send + Sync {
    async fn instant_eligibility(&self, funding_source_id: &str) -> Result<InstantEligibility>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationKind {
    /// Less than the configured fraction of the SLA window remains.
    AtRisk,
    /// The deadline passed while the payment was still in flight.
    Breached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub payment_id: Uuid,
    pub correlation_id: String,
    pub kind: EscalationKind,
    pub deadline: DateTime<Utc>,
}

/// Fire-and-forget escalation channel to the alerting collaborator.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, escalation: Escalation);
}

/// Verifies the authenticity of an inbound webhook before it is trusted.
pub trait WebhookVerifier: Send + Sync {
    fn verify(&self, provider: &str, payload: &str, signature: &str) -> bool;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type ProcessedEventStoreRef = Arc<dyn ProcessedEventStore>;
pub type RailProviderRef = Arc<dyn RailProvider>;
pub type EligibilityCheckerRef = Arc<dyn EligibilityChecker>;
pub type AlertSinkRef = Arc<dyn AlertSink>;
pub type WebhookVerifierRef = Arc<dyn WebhookVerifier>;
