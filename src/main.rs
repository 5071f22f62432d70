use clap::Parser;
use miette::{IntoDiagnostic, Result};
use raildispatch::application::correlator::{CorrelatorConfig, WebhookCorrelator};
use raildispatch::application::orchestrator::{
    OrchestratorConfig, PaymentOrchestrator, PaymentRef,
};
use raildispatch::application::sla::{SlaMonitor, SlaMonitorConfig};
use raildispatch::domain::ports::{PaymentStoreRef, ProcessedEventStoreRef};
use raildispatch::domain::rail::RailCatalog;
use raildispatch::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryProcessedEvents};
use raildispatch::infrastructure::simulated::{
    KeyedSha256Verifier, StaticEligibility, TracingAlertSink, as_provider_refs,
    simulated_provider_map,
};
use raildispatch::interfaces::config::load_catalog;
use raildispatch::interfaces::csv::request_reader::RequestReader;
use raildispatch::interfaces::csv::view_writer::ViewWriter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Routes a CSV of payment requests across simulated payment rails and
/// prints the final state of every payment.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payment requests CSV file
    /// (columns: correlation_id, amount, priority, source, destination).
    input: PathBuf,

    /// Rail catalog JSON file. Defaults to the built-in catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter, e.g. "info" or "raildispatch=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn stores(db_path: Option<PathBuf>) -> Result<(PaymentStoreRef, ProcessedEventStoreRef)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(path) = db_path {
        let store = raildispatch::infrastructure::rocksdb::RocksDbStore::open(path)
            .into_diagnostic()?;
        return Ok((Arc::new(store.clone()), Arc::new(store)));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok((
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(InMemoryProcessedEvents::new()),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the result CSV.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();

    let catalog = match &cli.catalog {
        Some(path) => load_catalog(path).into_diagnostic()?,
        None => RailCatalog::default(),
    };

    let (store, processed) = stores(cli.db_path.clone())?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let providers = simulated_provider_map(&catalog, &events_tx);

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        store.clone(),
        catalog,
        as_provider_refs(&providers),
        Arc::new(StaticEligibility::instant_capable()),
        OrchestratorConfig::default(),
    ));
    let correlator = Arc::new(WebhookCorrelator::new(
        orchestrator.clone(),
        store.clone(),
        processed,
        Arc::new(KeyedSha256Verifier::simulated()),
        CorrelatorConfig::default(),
    ));
    let monitor = SlaMonitor::new(
        orchestrator.clone(),
        store,
        Arc::new(TracingAlertSink),
        SlaMonitorConfig::default(),
    );

    // Submit every request; duplicates resolve to their original record.
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let mut submitted = Vec::new();
    for row in reader.requests() {
        match row {
            Ok(row) => match orchestrator.submit_payment(row.into()).await {
                Ok(view) => {
                    if !submitted.contains(&view.id) {
                        submitted.push(view.id);
                    }
                }
                Err(e) => eprintln!("Error processing request: {}", e),
            },
            Err(e) => eprintln!("Error reading request: {}", e),
        }
    }

    // Deliver the webhooks the simulated providers emitted.
    while let Ok(webhook) = events_rx.try_recv() {
        if let Err(e) = correlator.handle(&webhook).await {
            eprintln!("Error handling webhook: {}", e);
        }
    }
    while correlator.pending_len().await > 0 {
        correlator.drain_pending().await;
    }

    monitor.sweep().await;

    let mut views = Vec::with_capacity(submitted.len());
    for id in submitted {
        views.push(
            orchestrator
                .payment_status(&PaymentRef::Id(id))
                .await
                .into_diagnostic()?,
        );
    }

    let stdout = io::stdout();
    let mut writer = ViewWriter::new(stdout.lock());
    writer.write_views(&views).into_diagnostic()?;

    Ok(())
}
