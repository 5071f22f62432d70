use crate::domain::payment::Payment;
use crate::domain::ports::{InsertOutcome, PaymentStore, ProcessedEventStore};
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    payments: HashMap<Uuid, Payment>,
    by_correlation: HashMap<String, Uuid>,
    // Keeps historical transfer ids so a late webhook for a failed-over
    // attempt still finds its payment.
    by_transfer: HashMap<String, Uuid>,
}

/// A thread-safe in-memory payment store.
///
/// All three maps live behind a single `RwLock` so insert-if-absent and the
/// versioned update are atomic with their index maintenance. Ideal for
/// tests and single-process deployments.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_if_absent(&self, payment: Payment) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if let Some(existing_id) = state.by_correlation.get(&payment.correlation_id)
            && let Some(existing) = state.payments.get(existing_id)
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        state
            .by_correlation
            .insert(payment.correlation_id.clone(), payment.id);
        state.payments.insert(payment.id, payment);
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn get_by_correlation(&self, correlation_id: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        let id = state.by_correlation.get(correlation_id);
        Ok(id.and_then(|id| state.payments.get(id)).cloned())
    }

    async fn get_by_transfer(&self, transfer_id: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        let id = state.by_transfer.get(transfer_id);
        Ok(id.and_then(|id| state.payments.get(id)).cloned())
    }

    async fn update(&self, mut payment: Payment) -> Result<Payment> {
        let mut state = self.state.write().await;
        let stored = state
            .payments
            .get(&payment.id)
            .ok_or(OrchestratorError::NotFound)?;
        if stored.version != payment.version {
            return Err(OrchestratorError::ConcurrentUpdate(payment.id));
        }
        payment.version += 1;
        if let Some(transfer_id) = &payment.provider_transfer_id {
            state.by_transfer.insert(transfer_id.clone(), payment.id);
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn non_terminal_with_deadline(&self) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .filter(|p| !p.status.is_terminal() && p.sla_deadline.is_some())
            .cloned()
            .collect())
    }
}

/// In-memory dedup log for processed webhook event ids.
#[derive(Default, Clone)]
pub struct InMemoryProcessedEvents {
    seen: Arc<RwLock<HashSet<(String, String)>>>,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEvents {
    async fn mark_processed(&self, provider: &str, event_id: &str) -> Result<bool> {
        let mut seen = self.seen.write().await;
        Ok(seen.insert((provider.to_string(), event_id.to_string())))
    }
}
