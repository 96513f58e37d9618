use crate::error::{BookingError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest window a single booking may span, in inclusive days.
pub const MAX_RENTAL_DAYS: i64 = 30;

/// Lifecycle status of a booking.
///
/// Transitions are checked centrally by [`BookingStatus::can_transition_to`];
/// no call site mutates status without going through the store's
/// compare-and-swap transition.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Processing,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// The booking state graph:
    /// `Processing -> Approved -> Completed`, `Processing -> Rejected`,
    /// `{Processing, Approved} -> Cancelled`. Everything else is illegal.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Processing, Approved)
                | (Processing, Rejected)
                | (Processing, Cancelled)
                | (Approved, Completed)
                | (Approved, Cancelled)
        )
    }

    /// Statuses that occupy the slot: a booking in one of these states
    /// conflicts with overlapping candidates.
    pub fn blocks_availability(self) -> bool {
        matches!(self, BookingStatus::Processing | BookingStatus::Approved)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Processing => "PROCESSING",
            BookingStatus::Approved => "APPROVED",
            BookingStatus::Rejected => "REJECTED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Inclusive date window.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(BookingError::Validation(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Inclusive day count; a single-day booking counts as 1.
    pub fn rental_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Date windows overlap inclusively: sharing a day is an overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

/// Time-of-day window, half-open in spirit: the end instant is not occupied.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if end <= start {
            return Err(BookingError::Validation(format!(
                "end time {end} must be after start time {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Open-interval conflict rule: touching boundaries do not conflict.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// A reservation of one resource for a date/time window.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub requester_id: Uuid,
    pub activity_name: String,
    pub dates: DateRange,
    pub times: TimeRange,
    pub status: BookingStatus,
    /// Set iff status is Rejected or Cancelled.
    pub rejection_reason: Option<String>,
    pub proposal_document_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// True when this booking occupies any part of the candidate window.
    /// Dates overlap inclusively; times follow the open-interval rule, so a
    /// booking ending exactly when the candidate starts does not conflict.
    pub fn conflicts_with(&self, dates: &DateRange, times: &TimeRange) -> bool {
        self.status.blocks_availability()
            && self.dates.overlaps(dates)
            && self.times.overlaps(times)
    }

    pub fn new(
        resource_id: Uuid,
        requester_id: Uuid,
        activity_name: String,
        dates: DateRange,
        times: TimeRange,
        proposal_document_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            requester_id,
            activity_name,
            dates,
            times,
            status: BookingStatus::Processing,
            rejection_reason: None,
            proposal_document_ref,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Incoming reservation request, prior to validation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingRequest {
    pub resource_id: Uuid,
    pub activity_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub payer_name: String,
    pub payer_email: String,
    #[serde(default)]
    pub proposal_document_ref: Option<String>,
}

impl BookingRequest {
    /// Field-level validation. Returns the validated window pair.
    ///
    /// `today` comes from the injected clock so tests can pin it.
    pub fn validate(&self, today: NaiveDate) -> Result<(DateRange, TimeRange)> {
        if self.activity_name.trim().is_empty() {
            return Err(BookingError::Validation(
                "activity name is required".to_string(),
            ));
        }
        if self.payer_name.trim().is_empty() || self.payer_email.trim().is_empty() {
            return Err(BookingError::Validation(
                "payer name and email are required".to_string(),
            ));
        }
        let dates = DateRange::new(self.start_date, self.end_date)?;
        let times = TimeRange::new(self.start_time, self.end_time)?;
        if dates.start < today {
            return Err(BookingError::Validation(format!(
                "start date {} is in the past",
                dates.start
            )));
        }
        let days = dates.rental_days();
        if days > MAX_RENTAL_DAYS {
            return Err(BookingError::Validation(format!(
                "window of {days} days exceeds the {MAX_RENTAL_DAYS}-day maximum"
            )));
        }
        Ok((dates, times))
    }
}
