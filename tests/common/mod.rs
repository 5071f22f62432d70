#![allow(dead_code)]

use async_trait::async_trait;
use raildispatch::application::correlator::{CorrelatorConfig, WebhookCorrelator};
use raildispatch::application::orchestrator::{
    OrchestratorConfig, PaymentOrchestrator, SubmitPaymentRequest,
};
use raildispatch::application::sla::{SlaMonitor, SlaMonitorConfig};
use raildispatch::domain::payment::Priority;
use raildispatch::domain::ports::{AlertSink, Escalation};
use raildispatch::domain::rail::{RailCatalog, RailId};
use raildispatch::domain::webhook::WebhookEvent;
use raildispatch::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryProcessedEvents};
use raildispatch::infrastructure::simulated::{
    KeyedSha256Verifier, SimulatedRailProvider, StaticEligibility, as_provider_refs,
    simulated_provider_map,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

/// Alert sink recording escalations for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    escalations: Mutex<Vec<Escalation>>,
}

impl RecordingAlertSink {
    pub async fn recorded(&self) -> Vec<Escalation> {
        self.escalations.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, escalation: Escalation) {
        self.escalations.lock().await.push(escalation);
    }
}

/// Fully wired orchestration stack over in-memory stores and simulated
/// providers, with the provider webhook channel captured for the tests.
pub struct Harness {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub correlator: Arc<WebhookCorrelator>,
    pub monitor: SlaMonitor,
    pub store: InMemoryPaymentStore,
    pub providers: HashMap<RailId, Arc<SimulatedRailProvider>>,
    pub alerts: Arc<RecordingAlertSink>,
    events: Mutex<UnboundedReceiver<WebhookEvent>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            RailCatalog::default(),
            OrchestratorConfig::default(),
            StaticEligibility::instant_capable(),
        )
    }

    pub fn with(
        catalog: RailCatalog,
        config: OrchestratorConfig,
        eligibility: StaticEligibility,
    ) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let store = InMemoryPaymentStore::new();
        let providers = simulated_provider_map(&catalog, &tx);
        let alerts = Arc::new(RecordingAlertSink::default());

        let orchestrator = Arc::new(PaymentOrchestrator::new(
            Arc::new(store.clone()),
            catalog,
            as_provider_refs(&providers),
            Arc::new(eligibility),
            config,
        ));
        let correlator = Arc::new(WebhookCorrelator::new(
            orchestrator.clone(),
            Arc::new(store.clone()),
            Arc::new(InMemoryProcessedEvents::new()),
            Arc::new(KeyedSha256Verifier::simulated()),
            CorrelatorConfig::default(),
        ));
        let monitor = SlaMonitor::new(
            orchestrator.clone(),
            Arc::new(store.clone()),
            alerts.clone(),
            SlaMonitorConfig::default(),
        );

        Self {
            orchestrator,
            correlator,
            monitor,
            store,
            providers,
            alerts,
            events: Mutex::new(rx),
        }
    }

    pub fn provider(&self, rail: RailId) -> &Arc<SimulatedRailProvider> {
        &self.providers[&rail]
    }

    /// Pushes every webhook the simulated providers have emitted so far
    /// through the correlator. Returns how many were delivered.
    pub async fn deliver_webhooks(&self) -> usize {
        let mut delivered = 0;
        let mut events = self.events.lock().await;
        while let Ok(webhook) = events.try_recv() {
            self.correlator.handle(&webhook).await.unwrap();
            delivered += 1;
        }
        delivered
    }

    /// Drops any webhooks emitted so far without delivering them.
    pub async fn discard_webhooks(&self) {
        let mut events = self.events.lock().await;
        while events.try_recv().is_ok() {}
    }
}

/// Writes a submission CSV with `rows` randomized requests, for streaming
/// and throughput checks against the binary.
pub fn generate_large_csv(path: &std::path::Path, rows: usize) -> std::io::Result<()> {
    use rand::Rng;
    use std::io::Write;

    let mut rng = rand::thread_rng();
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writeln!(writer, "correlation_id, amount, priority, source, destination")?;
    for i in 0..rows {
        let amount: u64 = rng.gen_range(1..100_000);
        let priority = ["emergency", "urgent", "standard", "batch"][rng.gen_range(0..4)];
        writeln!(writer, "corr-{i}, {amount}, {priority}, fs-{i}, fs-dst")?;
    }
    writer.flush()
}

pub fn request(correlation_id: &str, amount: u64, priority: Priority) -> SubmitPaymentRequest {
    SubmitPaymentRequest {
        correlation_id: correlation_id.to_string(),
        amount,
        priority,
        source_funding_source: "fs-src".to_string(),
        destination_funding_source: "fs-dst".to_string(),
        metadata: BTreeMap::new(),
    }
}
