use crate::domain::payment::Payment;
use crate::domain::ports::{InsertOutcome, PaymentStore, ProcessedEventStore};
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column family mapping correlation id -> payment id.
pub const CF_CORRELATION: &str = "correlation_index";
/// Column family mapping provider transfer id -> payment id.
pub const CF_TRANSFER: &str = "transfer_index";
/// Column family recording processed webhook event ids.
pub const CF_EVENTS: &str = "processed_events";

/// A persistent payment store backed by RocksDB.
///
/// Records are JSON values in separate column families per index. RocksDB
/// has no native compare-and-set, so the read-modify-write sections are
/// serialized through a store-level async mutex; this matches the
/// single-process scope of the embedded database. `Clone` shares the
/// underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at `path`, ensuring all column
    /// families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_PAYMENTS, CF_CORRELATION, CF_TRANSFER, CF_EVENTS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| OrchestratorError::Store(format!("column family {name} not found")))
    }

    fn read_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_payment(&self, payment: &Payment) -> Result<()> {
        let cf = self.cf(CF_PAYMENTS)?;
        let value = serde_json::to_vec(payment)?;
        self.db.put_cf(cf, payment.id.as_bytes(), value)?;
        Ok(())
    }

    fn resolve_index(&self, cf_name: &str, key: &str) -> Result<Option<Uuid>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => {
                let id = Uuid::from_slice(&bytes).map_err(|e| {
                    OrchestratorError::Store(format!("corrupt index entry in {cf_name}: {e}"))
                })?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentStore for RocksDbStore {
    async fn insert_if_absent(&self, payment: Payment) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing_id) = self.resolve_index(CF_CORRELATION, &payment.correlation_id)?
            && let Some(existing) = self.read_payment(existing_id)?
        {
            return Ok(InsertOutcome::Existing(existing));
        }

        let correlation_cf = self.cf(CF_CORRELATION)?;
        self.db.put_cf(
            correlation_cf,
            payment.correlation_id.as_bytes(),
            payment.id.as_bytes(),
        )?;
        self.write_payment(&payment)?;
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        self.read_payment(id)
    }

    async fn get_by_correlation(&self, correlation_id: &str) -> Result<Option<Payment>> {
        match self.resolve_index(CF_CORRELATION, correlation_id)? {
            Some(id) => self.read_payment(id),
            None => Ok(None),
        }
    }

    async fn get_by_transfer(&self, transfer_id: &str) -> Result<Option<Payment>> {
        match self.resolve_index(CF_TRANSFER, transfer_id)? {
            Some(id) => self.read_payment(id),
            None => Ok(None),
        }
    }

    async fn update(&self, mut payment: Payment) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;

        let stored = self
            .read_payment(payment.id)?
            .ok_or(OrchestratorError::NotFound)?;
        if stored.version != payment.version {
            return Err(OrchestratorError::ConcurrentUpdate(payment.id));
        }

        payment.version += 1;
        if let Some(transfer_id) = &payment.provider_transfer_id {
            let transfer_cf = self.cf(CF_TRANSFER)?;
            self.db
                .put_cf(transfer_cf, transfer_id.as_bytes(), payment.id.as_bytes())?;
        }
        self.write_payment(&payment)?;
        Ok(payment)
    }

    async fn non_terminal_with_deadline(&self) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let payment: Payment = serde_json::from_slice(&value)?;
            if !payment.status.is_terminal() && payment.sla_deadline.is_some() {
                payments.push(payment);
            }
        }
        Ok(payments)
    }
}

#[async_trait]
impl ProcessedEventStore for RocksDbStore {
    async fn mark_processed(&self, provider: &str, event_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_EVENTS)?;
        let key = format!("{provider}\u{1f}{event_id}");
        if self.db.get_pinned_cf(cf, key.as_bytes())?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, key.as_bytes(), [])?;
        Ok(true)
    }
}
