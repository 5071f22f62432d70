use crate::domain::payment::{PaymentStatus, PaymentView, Priority};
use crate::domain::rail::RailId;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Flattened CSV projection of a payment view. Enum columns serialize
/// through the domain serde derives, so the wire names cannot drift from
/// the request-side parsing.
#[derive(Debug, Serialize)]
struct ViewRow<'a> {
    id: String,
    correlation_id: &'a str,
    status: PaymentStatus,
    current_rail: Option<RailId>,
    amount: u64,
    priority: Priority,
    sla_deadline: String,
    sla_breached: bool,
}

impl<'a> From<&'a PaymentView> for ViewRow<'a> {
    fn from(view: &'a PaymentView) -> Self {
        Self {
            id: view.id.to_string(),
            correlation_id: &view.correlation_id,
            status: view.status,
            current_rail: view.current_rail,
            amount: view.amount.minor_units(),
            priority: view.priority,
            sla_deadline: view
                .sla_deadline
                .map(|deadline| deadline.to_rfc3339())
                .unwrap_or_default(),
            sla_breached: view.sla_breached,
        }
    }
}

/// Writes final payment views as CSV.
pub struct ViewWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ViewWriter<W> {
    pub fn new(destination: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(destination),
        }
    }

    pub fn write_views(&mut self, views: &[PaymentView]) -> Result<()> {
        for view in views {
            self.writer.serialize(ViewRow::from(view))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
