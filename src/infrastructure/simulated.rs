use crate::domain::ports::{
    AlertSink, EligibilityChecker, Escalation, RailProvider, RailProviderRef, SubmitFailure,
    TransferRequest, WebhookVerifier,
};
use crate::domain::rail::{InstantEligibility, RailCatalog, RailId, SettlementClass};
use crate::domain::webhook::{ProviderEvent, ProviderEventKind, WebhookEvent};
use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Provider name shared by the simulated rail adapters.
pub const SIMULATED_PROVIDER: &str = "simulated";
/// Webhook signing secret the simulated adapters use.
pub const SIMULATED_SECRET: &str = "sim-webhook-secret";

/// Keyed SHA-256 signature over a webhook payload.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(payload.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Behavior a simulated provider plays back for one submission.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Reject(String),
    Retryable(String),
    FatalInvalid(String),
    /// Never answers within any sane timeout.
    Hang,
}

/// In-process stand-in for an external rail provider.
///
/// Accepts transfers (or plays back a scripted failure), assigns transfer
/// ids, and emits signed webhook events over a channel: instant rails settle
/// immediately, slower rails acknowledge and settle only when the test or
/// caller delivers a later settlement event. Dedupes on the idempotency key
/// the way the real networks' APIs do.
pub struct SimulatedRailProvider {
    rail: RailId,
    settlement_class: SettlementClass,
    events: UnboundedSender<WebhookEvent>,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    accepted: Mutex<HashMap<String, String>>,
    submissions: AtomicU64,
    counter: AtomicU64,
}

impl SimulatedRailProvider {
    pub fn new(
        rail: RailId,
        settlement_class: SettlementClass,
        events: UnboundedSender<WebhookEvent>,
    ) -> Self {
        Self {
            rail,
            settlement_class,
            events,
            script: Mutex::new(VecDeque::new()),
            accepted: Mutex::new(HashMap::new()),
            submissions: AtomicU64::new(0),
            counter: AtomicU64::new(0),
        }
    }

    /// Queues a scripted outcome for the next submission. Unscripted
    /// submissions succeed.
    pub async fn script(&self, outcome: ScriptedOutcome) {
        self.script.lock().await.push_back(outcome);
    }

    /// Total submission calls observed, including failed ones.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &ProviderEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "simulated provider could not serialize event");
                return;
            }
        };
        let signature = sign_payload(SIMULATED_SECRET, &payload);
        let _ = self
            .events
            .send(WebhookEvent::new(SIMULATED_PROVIDER, payload, signature));
    }

    /// Emits a settlement confirmation for an already-accepted transfer,
    /// the way an ACH or wire network reports final settlement out of band.
    pub fn settle(&self, transfer_id: &str) {
        self.emit(&ProviderEvent {
            event_id: format!("evt-{transfer_id}-settled"),
            transfer_id: transfer_id.to_string(),
            kind: ProviderEventKind::Settled,
        });
    }

    /// Emits a settlement failure for an already-accepted transfer.
    pub fn fail_settlement(&self, transfer_id: &str, reason: &str) {
        self.emit(&ProviderEvent {
            event_id: format!("evt-{transfer_id}-failed"),
            transfer_id: transfer_id.to_string(),
            kind: ProviderEventKind::Failed {
                reason: reason.to_string(),
            },
        });
    }
}

#[async_trait]
impl RailProvider for SimulatedRailProvider {
    fn provider_name(&self) -> &str {
        SIMULATED_PROVIDER
    }

    async fn submit(&self, request: &TransferRequest) -> std::result::Result<String, SubmitFailure> {
        self.submissions.fetch_add(1, Ordering::SeqCst);

        // Idempotency-keyed dedup, as the real networks guarantee.
        if let Some(existing) = self.accepted.lock().await.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedOutcome::Succeed);

        match outcome {
            ScriptedOutcome::Succeed => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                let transfer_id = format!("{}-tr-{}", self.rail, n);
                self.accepted
                    .lock()
                    .await
                    .insert(request.idempotency_key.clone(), transfer_id.clone());

                if self.settlement_class == SettlementClass::Instant {
                    self.emit(&ProviderEvent {
                        event_id: format!("evt-{transfer_id}-settled"),
                        transfer_id: transfer_id.clone(),
                        kind: ProviderEventKind::Settled,
                    });
                } else {
                    self.emit(&ProviderEvent {
                        event_id: format!("evt-{transfer_id}-ack"),
                        transfer_id: transfer_id.clone(),
                        kind: ProviderEventKind::Acknowledged,
                    });
                }
                Ok(transfer_id)
            }
            ScriptedOutcome::Reject(reason) => Err(SubmitFailure::Rejected(reason)),
            ScriptedOutcome::Retryable(reason) => Err(SubmitFailure::Retryable(reason)),
            ScriptedOutcome::FatalInvalid(reason) => Err(SubmitFailure::FatalInvalid(reason)),
            ScriptedOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SubmitFailure::Retryable("provider unresponsive".to_string()))
            }
        }
    }
}

/// One simulated provider per catalog rail, all emitting into `events`.
pub fn simulated_provider_map(
    catalog: &RailCatalog,
    events: &UnboundedSender<WebhookEvent>,
) -> HashMap<RailId, Arc<SimulatedRailProvider>> {
    catalog
        .iter()
        .map(|rail| {
            (
                rail.id,
                Arc::new(SimulatedRailProvider::new(
                    rail.id,
                    rail.settlement_class,
                    events.clone(),
                )),
            )
        })
        .collect()
}

/// Upcasts the concrete simulated providers to the port type.
pub fn as_provider_refs(
    providers: &HashMap<RailId, Arc<SimulatedRailProvider>>,
) -> HashMap<RailId, RailProviderRef> {
    providers
        .iter()
        .map(|(id, provider)| (*id, provider.clone() as RailProviderRef))
        .collect()
}

/// Verifies webhook signatures against a per-provider secret table.
pub struct KeyedSha256Verifier {
    secrets: HashMap<String, String>,
}

impl KeyedSha256Verifier {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn simulated() -> Self {
        Self::new(HashMap::from([(
            SIMULATED_PROVIDER.to_string(),
            SIMULATED_SECRET.to_string(),
        )]))
    }
}

impl WebhookVerifier for KeyedSha256Verifier {
    fn verify(&self, provider: &str, payload: &str, signature: &str) -> bool {
        match self.secrets.get(provider) {
            Some(secret) => sign_payload(secret, payload) == signature,
            None => false,
        }
    }
}

/// Fixed-answer eligibility checker with per-funding-source overrides.
#[derive(Default, Clone)]
pub struct StaticEligibility {
    default: bool,
    overrides: HashMap<String, bool>,
}

impl StaticEligibility {
    pub fn instant_capable() -> Self {
        Self {
            default: true,
            overrides: HashMap::new(),
        }
    }

    pub fn ach_only() -> Self {
        Self {
            default: false,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, funding_source_id: &str, instant_capable: bool) -> Self {
        self.overrides
            .insert(funding_source_id.to_string(), instant_capable);
        self
    }
}

#[async_trait]
impl EligibilityChecker for StaticEligibility {
    async fn instant_eligibility(&self, funding_source_id: &str) -> Result<InstantEligibility> {
        let instant_capable = self
            .overrides
            .get(funding_source_id)
            .copied()
            .unwrap_or(self.default);
        Ok(InstantEligibility { instant_capable })
    }
}

/// Alert sink that reports escalations through the log.
#[derive(Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, escalation: Escalation) {
        warn!(
            payment_id = %escalation.payment_id,
            correlation_id = %escalation.correlation_id,
            kind = ?escalation.kind,
            deadline = %escalation.deadline,
            "SLA escalation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Amount;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn request(key: &str) -> TransferRequest {
        TransferRequest {
            payment_id: Uuid::new_v4(),
            idempotency_key: key.to_string(),
            rail: RailId::Fednow,
            amount: Amount::new(100).unwrap(),
            source_funding_source: "src".to_string(),
            destination_funding_source: "dst".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_instant_provider_emits_settled_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = SimulatedRailProvider::new(RailId::Fednow, SettlementClass::Instant, tx);

        let transfer_id = provider.submit(&request("key-1")).await.unwrap();
        let webhook = rx.try_recv().unwrap();
        let event: ProviderEvent = serde_json::from_str(&webhook.payload).unwrap();
        assert_eq!(event.transfer_id, transfer_id);
        assert_eq!(event.kind, ProviderEventKind::Settled);
    }

    #[tokio::test]
    async fn test_slow_provider_acknowledges_first() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = SimulatedRailProvider::new(RailId::SameDayAch, SettlementClass::SameDay, tx);

        provider.submit(&request("key-1")).await.unwrap();
        let webhook = rx.try_recv().unwrap();
        let event: ProviderEvent = serde_json::from_str(&webhook.payload).unwrap();
        assert_eq!(event.kind, ProviderEventKind::Acknowledged);
    }

    #[tokio::test]
    async fn test_idempotency_key_dedup() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let provider = SimulatedRailProvider::new(RailId::Fednow, SettlementClass::Instant, tx);

        let first = provider.submit(&request("key-dup")).await.unwrap();
        let second = provider.submit(&request("key-dup")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.submissions(), 2);
    }

    #[tokio::test]
    async fn test_signature_round_trip() {
        let verifier = KeyedSha256Verifier::simulated();
        let payload = r#"{"event_id":"e","transfer_id":"t","type":"settled"}"#;
        let signature = sign_payload(SIMULATED_SECRET, payload);

        assert!(verifier.verify(SIMULATED_PROVIDER, payload, &signature));
        assert!(!verifier.verify(SIMULATED_PROVIDER, payload, "bogus"));
        assert!(!verifier.verify("unknown-provider", payload, &signature));
    }

    #[tokio::test]
    async fn test_static_eligibility_override() {
        let checker = StaticEligibility::instant_capable().with_override("fs-ach", false);
        assert!(checker.instant_eligibility("fs-any").await.unwrap().instant_capable);
        assert!(!checker.instant_eligibility("fs-ach").await.unwrap().instant_capable);
    }
}
