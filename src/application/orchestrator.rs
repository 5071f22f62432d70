use crate::domain::payment::{
    Amount, AttemptOutcome, Payment, PaymentStatus, PaymentView, Priority, RailAttempt,
};
use crate::domain::ports::{
    EligibilityCheckerRef, EscalationKind, InsertOutcome, PaymentStoreRef, RailProviderRef,
    SubmitFailure, TransferRequest,
};
use crate::domain::rail::{InstantEligibility, Rail, RailCatalog, RailId};
use crate::domain::selector::select_rails;
use crate::domain::webhook::ProviderEventKind;
use crate::error::{OrchestratorError, Result};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tunables for the orchestration pipeline.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum rail attempts per payment before it fails terminally.
    pub max_attempts: u32,
    /// Bound on a single provider submission call.
    pub submit_timeout: Duration,
    /// Hard completion window for emergency payments.
    pub emergency_sla: chrono::Duration,
    /// Completion window for urgent payments; `None` disables the deadline.
    pub urgent_sla: Option<chrono::Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            submit_timeout: Duration::from_secs(30),
            emergency_sla: chrono::Duration::hours(4),
            urgent_sla: Some(chrono::Duration::hours(24)),
        }
    }
}

/// Caller-supplied submission request.
#[derive(Debug, Clone)]
pub struct SubmitPaymentRequest {
    pub correlation_id: String,
    /// Minor currency units; must be positive.
    pub amount: u64,
    pub priority: Priority,
    pub source_funding_source: String,
    pub destination_funding_source: String,
    pub metadata: BTreeMap<String, String>,
}

/// Lookup key for status queries.
#[derive(Debug, Clone)]
pub enum PaymentRef {
    Id(Uuid),
    Correlation(String),
}

/// Registry of per-payment locks enforcing single-writer transitions.
///
/// Webhook application, failover and cancellation for the same payment id
/// serialize here; cross-payment operations never contend. Entries whose
/// lock is no longer held are evicted on the next acquire, keeping the map
/// bounded by the number of concurrently active payments.
#[derive(Default)]
struct PaymentLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PaymentLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // A strong count of 1 means no guard or pending waiter holds
            // the entry; only the map itself does.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The main entry point for payment routing.
///
/// Owns the boxed store and provider ports and ensures sequential
/// consistency per payment by awaiting every store operation under the
/// payment's lock.
pub struct PaymentOrchestrator {
    store: PaymentStoreRef,
    catalog: RailCatalog,
    providers: HashMap<RailId, RailProviderRef>,
    eligibility: EligibilityCheckerRef,
    config: OrchestratorConfig,
    locks: PaymentLocks,
}

impl PaymentOrchestrator {
    pub fn new(
        store: PaymentStoreRef,
        catalog: RailCatalog,
        providers: HashMap<RailId, RailProviderRef>,
        eligibility: EligibilityCheckerRef,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            providers,
            eligibility,
            config,
            locks: PaymentLocks::default(),
        }
    }

    /// Submits a payment for routing. Idempotent on `correlation_id`: a
    /// duplicate submission returns the existing record's view without a
    /// second provider call.
    pub async fn submit_payment(&self, request: SubmitPaymentRequest) -> Result<PaymentView> {
        let amount = Amount::new(request.amount)?;
        if request.correlation_id.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "correlation_id must not be empty".to_string(),
            ));
        }
        if request.source_funding_source.is_empty() || request.destination_funding_source.is_empty()
        {
            return Err(OrchestratorError::Validation(
                "source and destination funding sources are required".to_string(),
            ));
        }

        let eligibility = self
            .eligibility
            .instant_eligibility(&request.source_funding_source)
            .await?;

        // Surface NoEligibleRail synchronously, before any state exists.
        select_rails(
            &self.catalog,
            amount,
            request.priority,
            eligibility,
            &HashSet::new(),
        )?;

        let sla_deadline = match request.priority {
            Priority::Emergency => Some(Utc::now() + self.config.emergency_sla),
            Priority::Urgent => self.config.urgent_sla.map(|window| Utc::now() + window),
            Priority::Standard | Priority::Batch => None,
        };

        let payment = Payment::new(
            request.correlation_id,
            amount,
            request.priority,
            request.source_funding_source,
            request.destination_funding_source,
            request.metadata,
            sla_deadline,
        );

        match self.store.insert_if_absent(payment.clone()).await? {
            InsertOutcome::Existing(existing) => {
                debug!(
                    correlation_id = %existing.correlation_id,
                    payment_id = %existing.id,
                    "duplicate submission, returning existing record"
                );
                return Ok(existing.view());
            }
            InsertOutcome::Inserted => {}
        }

        info!(
            payment_id = %payment.id,
            correlation_id = %payment.correlation_id,
            amount = payment.amount.minor_units(),
            priority = ?payment.priority,
            "payment accepted"
        );

        let _guard = self.locks.acquire(payment.id).await;
        let payment = self.drive(payment, eligibility).await?;
        Ok(payment.view())
    }

    /// Latest known state of a payment, by internal id or correlation id.
    pub async fn payment_status(&self, payment_ref: &PaymentRef) -> Result<PaymentView> {
        let payment = match payment_ref {
            PaymentRef::Id(id) => self.store.get(*id).await?,
            PaymentRef::Correlation(correlation_id) => {
                self.store.get_by_correlation(correlation_id).await?
            }
        };
        payment
            .map(|p| p.view())
            .ok_or(OrchestratorError::NotFound)
    }

    /// Cancels a payment that has not yet reached a provider. Once
    /// submitted, cancellation is a provider capability, not a transition.
    pub async fn cancel_payment(&self, payment_id: Uuid, reason: &str) -> Result<PaymentView> {
        let _guard = self.locks.acquire(payment_id).await;
        let mut payment = self
            .store
            .get(payment_id)
            .await?
            .ok_or(OrchestratorError::NotFound)?;

        match payment.status {
            PaymentStatus::Initiated | PaymentStatus::Routed => {
                payment.failure_reason = Some(format!("CancelledByCaller: {reason}"));
                payment.transition_to(PaymentStatus::Failed);
                let payment = self.store.update(payment).await?;
                info!(payment_id = %payment.id, reason, "payment cancelled by caller");
                Ok(payment.view())
            }
            _ => Err(OrchestratorError::AlreadySubmitted),
        }
    }

    /// Applies a correlated provider event under the payment's lock.
    /// A settlement failure triggers failover while budget remains.
    pub async fn apply_provider_event(
        &self,
        payment_id: Uuid,
        kind: &ProviderEventKind,
    ) -> Result<Payment> {
        let _guard = self.locks.acquire(payment_id).await;
        let mut payment = self
            .store
            .get(payment_id)
            .await?
            .ok_or(OrchestratorError::NotFound)?;

        if payment.status.is_terminal() {
            debug!(payment_id = %payment.id, "provider event for terminal payment ignored");
            return Ok(payment);
        }

        match kind {
            ProviderEventKind::Acknowledged => {
                if payment.transition_to(PaymentStatus::Pending) {
                    payment = self.store.update(payment).await?;
                    debug!(payment_id = %payment.id, "provider acknowledged, awaiting settlement");
                }
                Ok(payment)
            }
            ProviderEventKind::Settled => self.complete(payment).await,
            ProviderEventKind::Failed { reason } => {
                warn!(payment_id = %payment.id, reason, "provider reported settlement failure");
                if let Some(last) = payment.rail_history.last_mut() {
                    last.outcome = AttemptOutcome::SettlementFailed(reason.clone());
                }
                let eligibility = self
                    .eligibility
                    .instant_eligibility(&payment.source_funding_source)
                    .await?;
                self.drive(payment, eligibility).await
            }
        }
    }

    /// Persists an SLA flag on a non-terminal payment. Returns the updated
    /// record, or `None` when the flag was already set or the payment is
    /// terminal.
    pub async fn flag_sla(
        &self,
        payment_id: Uuid,
        kind: EscalationKind,
    ) -> Result<Option<Payment>> {
        let _guard = self.locks.acquire(payment_id).await;
        let Some(mut payment) = self.store.get(payment_id).await? else {
            return Ok(None);
        };
        if payment.status.is_terminal() {
            return Ok(None);
        }
        match kind {
            EscalationKind::AtRisk => {
                if payment.escalated {
                    return Ok(None);
                }
                payment.escalated = true;
            }
            EscalationKind::Breached => {
                if payment.sla_breached {
                    return Ok(None);
                }
                payment.sla_breached = true;
            }
        }
        payment.updated_at = Utc::now();
        let payment = self.store.update(payment).await?;
        Ok(Some(payment))
    }

    /// Attempts candidate rails in order until one accepts the transfer or
    /// the retry budget runs out. Caller must hold the payment's lock.
    async fn drive(&self, mut payment: Payment, eligibility: InstantEligibility) -> Result<Payment> {
        loop {
            if payment.rail_history.len() as u32 >= self.config.max_attempts {
                return self.fail(payment, "retry budget exhausted").await;
            }

            let excluded: HashSet<RailId> = payment.attempted_rails().into_iter().collect();
            let candidates = match select_rails(
                &self.catalog,
                payment.amount,
                payment.priority,
                eligibility,
                &excluded,
            ) {
                Ok(candidates) => candidates,
                Err(OrchestratorError::NoEligibleRail) => {
                    return self.fail(payment, "no eligible rail remaining").await;
                }
                Err(e) => return Err(e),
            };

            let rail = self.pick_candidate(&payment, candidates);

            payment.current_rail = Some(rail.id);
            if !payment.transition_to(PaymentStatus::Routed) {
                return Err(OrchestratorError::Store(format!(
                    "illegal transition {} -> ROUTED for payment {}",
                    payment.status, payment.id
                )));
            }
            payment = self.store.update(payment).await?;
            debug!(payment_id = %payment.id, rail = %rail.id, "payment routed");

            let attempt_index = payment.rail_history.len();
            let request = TransferRequest {
                payment_id: payment.id,
                idempotency_key: format!("{}-{}", payment.id, attempt_index),
                rail: rail.id,
                amount: payment.amount,
                source_funding_source: payment.source_funding_source.clone(),
                destination_funding_source: payment.destination_funding_source.clone(),
                metadata: payment.metadata.clone(),
            };
            let provider = self.providers.get(&rail.id).ok_or_else(|| {
                OrchestratorError::Store(format!("no provider configured for rail {}", rail.id))
            })?;

            let submitted_at = Utc::now();
            let outcome =
                match tokio::time::timeout(self.config.submit_timeout, provider.submit(&request))
                    .await
                {
                    Ok(result) => result,
                    // Safe to retry: the request carried an idempotency key
                    // the provider dedupes on.
                    Err(_) => Err(SubmitFailure::Retryable("submission timed out".to_string())),
                };

            match outcome {
                Ok(transfer_id) => {
                    payment.rail_history.push(RailAttempt {
                        rail: rail.id,
                        submitted_at,
                        outcome: AttemptOutcome::Submitted,
                    });
                    payment.provider_transfer_id = Some(transfer_id.clone());
                    payment.transition_to(PaymentStatus::Submitted);
                    payment = self.store.update(payment).await?;
                    info!(
                        payment_id = %payment.id,
                        rail = %rail.id,
                        transfer_id,
                        attempt = attempt_index + 1,
                        "transfer submitted"
                    );
                    return Ok(payment);
                }
                Err(SubmitFailure::Retryable(reason)) => {
                    warn!(payment_id = %payment.id, rail = %rail.id, reason, "retryable submission failure");
                    payment.rail_history.push(RailAttempt {
                        rail: rail.id,
                        submitted_at,
                        outcome: AttemptOutcome::Retryable(reason),
                    });
                    payment = self.store.update(payment).await?;
                }
                Err(SubmitFailure::Rejected(reason)) => {
                    warn!(payment_id = %payment.id, rail = %rail.id, reason, "rail rejected transfer, failing over");
                    payment.rail_history.push(RailAttempt {
                        rail: rail.id,
                        submitted_at,
                        outcome: AttemptOutcome::Rejected(reason),
                    });
                    payment = self.store.update(payment).await?;
                }
                Err(SubmitFailure::FatalInvalid(reason)) => {
                    payment.rail_history.push(RailAttempt {
                        rail: rail.id,
                        submitted_at,
                        outcome: AttemptOutcome::FatalInvalid(reason.clone()),
                    });
                    return self
                        .fail(payment, &format!("provider classified request invalid: {reason}"))
                        .await;
                }
            }
        }
    }

    /// Candidate choice within an ordered list: escalated payments go by
    /// speed, and a deadline rules out rails that cannot settle in time.
    fn pick_candidate(&self, payment: &Payment, mut candidates: Vec<Rail>) -> Rail {
        if payment.escalated {
            candidates.sort_by_key(|rail| rail.settlement_class.speed_rank());
        }
        if let Some(deadline) = payment.sla_deadline {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
            if let Some(fit) = candidates.iter().find(|rail| rail.avg_latency() <= remaining) {
                return fit.clone();
            }
            // Nothing settles in time; a late success beats an abandonment.
            if let Some(fastest) = candidates.iter().min_by_key(|rail| rail.avg_latency_secs) {
                return fastest.clone();
            }
        }
        candidates[0].clone()
    }

    async fn complete(&self, mut payment: Payment) -> Result<Payment> {
        if let Some(deadline) = payment.sla_deadline
            && Utc::now() > deadline
            && !payment.sla_breached
        {
            payment.sla_breached = true;
            warn!(
                payment_id = %payment.id,
                %deadline,
                "payment settled after its SLA deadline"
            );
        }
        if payment.transition_to(PaymentStatus::Completed) {
            payment = self.store.update(payment).await?;
            info!(payment_id = %payment.id, "payment completed");
        } else {
            warn!(
                payment_id = %payment.id,
                status = %payment.status,
                "settlement event arrived in a state that cannot complete"
            );
        }
        Ok(payment)
    }

    async fn fail(&self, mut payment: Payment, reason: &str) -> Result<Payment> {
        payment.failure_reason = Some(reason.to_string());
        payment.transition_to(PaymentStatus::Failed);
        let payment = self.store.update(payment).await?;
        warn!(payment_id = %payment.id, reason, "payment failed terminally");
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryPaymentStore;
    use crate::infrastructure::simulated::{ScriptedOutcome, SimulatedRailProvider, StaticEligibility};
    use tokio::sync::mpsc;

    fn request(correlation_id: &str, amount: u64, priority: Priority) -> SubmitPaymentRequest {
        SubmitPaymentRequest {
            correlation_id: correlation_id.to_string(),
            amount,
            priority,
            source_funding_source: "fs-src".to_string(),
            destination_funding_source: "fs-dst".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn orchestrator_with_defaults() -> (PaymentOrchestrator, mpsc::UnboundedReceiver<crate::domain::webhook::WebhookEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let catalog = RailCatalog::default();
        let mut providers: HashMap<RailId, RailProviderRef> = HashMap::new();
        for rail in catalog.iter() {
            providers.insert(
                rail.id,
                Arc::new(SimulatedRailProvider::new(rail.id, rail.settlement_class, tx.clone())),
            );
        }
        let orchestrator = PaymentOrchestrator::new(
            Arc::new(InMemoryPaymentStore::new()),
            catalog,
            providers,
            Arc::new(StaticEligibility::instant_capable()),
            OrchestratorConfig::default(),
        );
        (orchestrator, rx)
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected_before_any_state() {
        let (orchestrator, _rx) = orchestrator_with_defaults();
        let result = orchestrator
            .submit_payment(request("corr-zero", 0, Priority::Standard))
            .await;
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
        assert!(matches!(
            orchestrator
                .payment_status(&PaymentRef::Correlation("corr-zero".to_string()))
                .await,
            Err(OrchestratorError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_submit_routes_instant_rail_for_emergency() {
        let (orchestrator, _rx) = orchestrator_with_defaults();
        let view = orchestrator
            .submit_payment(request("corr-1", 19_400, Priority::Emergency))
            .await
            .unwrap();
        assert_eq!(view.status, PaymentStatus::Submitted);
        assert_eq!(view.current_rail, Some(RailId::Fednow));
        assert!(view.sla_deadline.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_correlation_returns_existing() {
        let (orchestrator, _rx) = orchestrator_with_defaults();
        let first = orchestrator
            .submit_payment(request("corr-dup", 500, Priority::Urgent))
            .await
            .unwrap();
        let second = orchestrator
            .submit_payment(request("corr-dup", 500, Priority::Urgent))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_cancel_after_submission_is_refused() {
        let (orchestrator, _rx) = orchestrator_with_defaults();
        let view = orchestrator
            .submit_payment(request("corr-cancel", 500, Priority::Standard))
            .await
            .unwrap();
        let result = orchestrator.cancel_payment(view.id, "caller changed mind").await;
        assert!(matches!(result, Err(OrchestratorError::AlreadySubmitted)));
    }

    #[tokio::test]
    async fn test_payment_locks_evict_released_entries() {
        let locks = PaymentLocks::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let first_guard = locks.acquire(first).await;
        let second_guard = locks.acquire(second).await;
        assert_eq!(locks.inner.lock().await.len(), 2);

        drop(first_guard);
        drop(second_guard);

        // The next acquire prunes the released entries.
        let _guard = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.inner.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_locks_keep_held_entries() {
        let locks = PaymentLocks::default();
        let held = Uuid::new_v4();
        let _held_guard = locks.acquire(held).await;

        // Acquiring another id must not evict the held lock.
        let _other_guard = locks.acquire(Uuid::new_v4()).await;
        let map = locks.inner.lock().await;
        assert!(map.contains_key(&held));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_invalid_stops_failover() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let catalog = RailCatalog::default();
        let mut providers: HashMap<RailId, RailProviderRef> = HashMap::new();
        for rail in catalog.iter() {
            let provider =
                SimulatedRailProvider::new(rail.id, rail.settlement_class, tx.clone());
            if rail.id == RailId::Fednow {
                provider
                    .script(ScriptedOutcome::FatalInvalid("compliance block".to_string()))
                    .await;
            }
            providers.insert(rail.id, Arc::new(provider));
        }
        let orchestrator = PaymentOrchestrator::new(
            Arc::new(InMemoryPaymentStore::new()),
            catalog,
            providers,
            Arc::new(StaticEligibility::instant_capable()),
            OrchestratorConfig::default(),
        );

        let view = orchestrator
            .submit_payment(request("corr-fatal", 500, Priority::Emergency))
            .await
            .unwrap();
        assert_eq!(view.status, PaymentStatus::Failed);
        // One attempt only; no fallback after a compliance block.
        let payment = orchestrator
            .payment_status(&PaymentRef::Id(view.id))
            .await
            .unwrap();
        assert_eq!(payment.current_rail, Some(RailId::Fednow));
    }
}
