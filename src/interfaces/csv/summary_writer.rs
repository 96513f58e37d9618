use crate::domain::booking::BookingStatus;
use crate::domain::payment::PaymentStatus;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// One row of the final-state report.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct BookingSummary {
    pub activity: String,
    pub resource: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub amount: Decimal,
    pub refunded: bool,
}

/// Writes the booking summary table as CSV.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Serializes the rows sorted by activity name so output is stable.
    pub fn write_summaries(mut self, mut rows: Vec<BookingSummary>) -> Result<()> {
        rows.sort_by(|a, b| a.activity.cmp(&b.activity));
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
