use crate::application::orchestrator::PaymentOrchestrator;
use crate::domain::ports::{PaymentStoreRef, ProcessedEventStoreRef, WebhookVerifierRef};
use crate::domain::webhook::{ProviderEvent, WebhookEvent};
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// What became of one inbound webhook.
///
/// Everything except `InvalidSignature` maps to a 200 at the HTTP edge so
/// providers never see redelivery-triggering errors; `InvalidSignature`
/// maps to 401 so a misconfigured provider can alert on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// State transition applied.
    Applied,
    /// Event id already processed; redelivery ignored.
    Duplicate,
    /// Signature did not verify; event not trusted.
    InvalidSignature,
    /// Payload did not parse as a provider event.
    Malformed,
    /// No in-flight payment matched the transfer id; queued for retry.
    Queued,
}

#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Reprocessing attempts for unmatched or failed events.
    pub max_requeue_attempts: u32,
    /// Pause between requeue passes.
    pub requeue_delay: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_requeue_attempts: 5,
            requeue_delay: Duration::from_millis(200),
        }
    }
}

struct QueuedEvent {
    event: ProviderEvent,
    provider: String,
    attempts: u32,
}

/// Maps asynchronous provider events onto orchestration records.
///
/// Verifies authenticity before trusting an event, dedups on the provider's
/// event id (providers redeliver), looks the payment up by provider transfer
/// id, and hands the transition to the orchestrator's per-payment
/// single-writer path. Unmatched events usually mean the submission write
/// has not landed yet; they are requeued a bounded number of times rather
/// than dropped. Apply failures (a store outage, for instance) requeue the
/// same way: once an event is marked processed, a redelivery is a
/// `Duplicate`, so the queue is its only remaining path to application.
pub struct WebhookCorrelator {
    orchestrator: Arc<PaymentOrchestrator>,
    store: PaymentStoreRef,
    processed: ProcessedEventStoreRef,
    verifier: WebhookVerifierRef,
    pending: Mutex<VecDeque<QueuedEvent>>,
    config: CorrelatorConfig,
}

impl WebhookCorrelator {
    pub fn new(
        orchestrator: Arc<PaymentOrchestrator>,
        store: PaymentStoreRef,
        processed: ProcessedEventStoreRef,
        verifier: WebhookVerifierRef,
        config: CorrelatorConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            processed,
            verifier,
            pending: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Handles one inbound webhook end to end.
    pub async fn handle(&self, webhook: &WebhookEvent) -> Result<CorrelationOutcome> {
        if !self
            .verifier
            .verify(&webhook.provider, &webhook.payload, &webhook.signature)
        {
            warn!(provider = %webhook.provider, "webhook signature verification failed");
            return Ok(CorrelationOutcome::InvalidSignature);
        }

        let event: ProviderEvent = match serde_json::from_str(&webhook.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(provider = %webhook.provider, error = %e, "malformed webhook payload");
                return Ok(CorrelationOutcome::Malformed);
            }
        };

        if !self
            .processed
            .mark_processed(&webhook.provider, &event.event_id)
            .await?
        {
            debug!(
                provider = %webhook.provider,
                event_id = %event.event_id,
                "redelivered webhook event ignored"
            );
            return Ok(CorrelationOutcome::Duplicate);
        }

        Ok(self.apply_or_queue(event, webhook.provider.clone(), 0).await)
    }

    async fn apply_or_queue(
        &self,
        event: ProviderEvent,
        provider: String,
        attempts: u32,
    ) -> CorrelationOutcome {
        match self.store.get_by_transfer(&event.transfer_id).await {
            Ok(Some(payment)) => match self
                .orchestrator
                .apply_provider_event(payment.id, &event.kind)
                .await
            {
                Ok(_) => CorrelationOutcome::Applied,
                Err(e) => {
                    warn!(
                        provider = %provider,
                        transfer_id = %event.transfer_id,
                        event_id = %event.event_id,
                        attempts,
                        error = %e,
                        "provider event could not be applied, queueing"
                    );
                    self.requeue(event, provider, attempts).await;
                    CorrelationOutcome::Queued
                }
            },
            Ok(None) => {
                // Either the submission row has not committed yet, or the
                // provider sent an anomaly. Retry before giving up.
                warn!(
                    provider = %provider,
                    transfer_id = %event.transfer_id,
                    event_id = %event.event_id,
                    attempts,
                    "webhook matched no in-flight payment, queueing"
                );
                self.requeue(event, provider, attempts).await;
                CorrelationOutcome::Queued
            }
            Err(e) => {
                warn!(
                    provider = %provider,
                    transfer_id = %event.transfer_id,
                    event_id = %event.event_id,
                    attempts,
                    error = %e,
                    "payment lookup failed, queueing event"
                );
                self.requeue(event, provider, attempts).await;
                CorrelationOutcome::Queued
            }
        }
    }

    async fn requeue(&self, event: ProviderEvent, provider: String, attempts: u32) {
        self.pending.lock().await.push_back(QueuedEvent {
            event,
            provider,
            attempts,
        });
    }

    /// One reprocessing pass over the queued events. Returns how many were
    /// applied. A failed event goes back on the queue without disturbing the
    /// rest of the batch; events that exhaust their attempts are logged and
    /// dropped.
    pub async fn drain_pending(&self) -> usize {
        let batch: Vec<QueuedEvent> = {
            let mut pending = self.pending.lock().await;
            pending.drain(..).collect()
        };

        let mut applied = 0;
        for queued in batch {
            let attempts = queued.attempts + 1;
            if attempts > self.config.max_requeue_attempts {
                error!(
                    provider = %queued.provider,
                    transfer_id = %queued.event.transfer_id,
                    event_id = %queued.event.event_id,
                    "webhook event exhausted reprocessing attempts"
                );
                continue;
            }
            if self.apply_or_queue(queued.event, queued.provider, attempts).await
                == CorrelationOutcome::Applied
            {
                applied += 1;
            }
        }
        applied
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Background pump reprocessing queued events until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.requeue_delay).await;
            self.drain_pending().await;
        }
    }
}
