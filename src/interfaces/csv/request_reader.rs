use crate::application::orchestrator::SubmitPaymentRequest;
use crate::domain::payment::Priority;
use crate::error::{OrchestratorError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;

/// One row of the submission CSV.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SubmitRow {
    pub correlation_id: String,
    /// Minor currency units.
    pub amount: u64,
    pub priority: Priority,
    pub source: String,
    pub destination: String,
}

impl From<SubmitRow> for SubmitPaymentRequest {
    fn from(row: SubmitRow) -> Self {
        Self {
            correlation_id: row.correlation_id,
            amount: row.amount,
            priority: row.priority,
            source_funding_source: row.source,
            destination_funding_source: row.destination,
            metadata: BTreeMap::new(),
        }
    }
}

/// Reads payment submission requests from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// yielding an iterator of `Result<SubmitRow>` so large files stream without
/// loading into memory.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<SubmitRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(OrchestratorError::from))
    }
}
