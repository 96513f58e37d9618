use crate::application::availability::window_is_free;
use crate::domain::booking::{Booking, BookingStatus, DateRange, TimeRange};
use crate::domain::payment::{Payment, PaymentStatus, Refund, RefundOrigin};
use crate::domain::ports::{ReservationStore, ResourceStore};
use crate::domain::resource::Resource;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for bookings, keyed by booking id.
pub const CF_BOOKINGS: &str = "bookings";
/// Column Family for payments, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for refunds, keyed by payment id: a second refund for the
/// same payment cannot be inserted without overwriting, and `insert_refund`
/// checks the key first under the write mutex.
pub const CF_REFUNDS: &str = "refunds";
/// Secondary indexes resolving webhook references to payment ids.
pub const CF_IDX_INVOICE: &str = "idx_invoice";
pub const CF_IDX_GATEWAY: &str = "idx_gateway";
pub const CF_IDX_BOOKING_PAYMENT: &str = "idx_booking_payment";
/// Column Family for resources, keyed by resource id.
pub const CF_RESOURCES: &str = "resources";

fn internal<E: std::error::Error + Send + Sync + 'static>(err: E) -> BookingError {
    BookingError::Internal(Box::new(err))
}

/// Persistent store implementation using RocksDB.
///
/// Values are serialized with serde_json into per-entity column families.
/// RocksDB has no transactions in the configuration we use, so the
/// read-check-write sequences (`reserve`, the CAS transitions,
/// `insert_refund`) are serialised through a store-level async mutex and
/// committed with a `WriteBatch`.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// all column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [
            CF_BOOKINGS,
            CF_PAYMENTS,
            CF_REFUNDS,
            CF_IDX_INVOICE,
            CF_IDX_GATEWAY,
            CF_IDX_BOOKING_PAYMENT,
            CF_RESOURCES,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors).map_err(internal)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BookingError::Internal(Box::new(std::io::Error::other(format!(
                "column family {name} not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(internal)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(cf, key, serde_json::to_vec(value)?)
            .map_err(internal)
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(internal)?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn payment_by_index(&self, index_cf: &str, key: &str) -> Result<Option<Payment>> {
        let cf = self.cf(index_cf)?;
        match self.db.get_cf(cf, key.as_bytes()).map_err(internal)? {
            Some(id_bytes) => {
                let id = Uuid::from_slice(&id_bytes).map_err(internal)?;
                self.get_json(CF_PAYMENTS, id.as_bytes())
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ReservationStore for RocksDbStore {
    async fn reserve(&self, booking: Booking, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let existing: Vec<Booking> = self
            .scan::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .filter(|b| b.resource_id == booking.resource_id)
            .collect();
        if !window_is_free(&existing, &booking.dates, &booking.times) {
            return Err(BookingError::Conflict(format!(
                "window {} .. {} already taken",
                booking.dates.start, booking.dates.end
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_BOOKINGS)?,
            booking.id.as_bytes(),
            serde_json::to_vec(&booking)?,
        );
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            payment.id.as_bytes(),
            serde_json::to_vec(&payment)?,
        );
        batch.put_cf(
            self.cf(CF_IDX_INVOICE)?,
            payment.invoice_number.as_bytes(),
            payment.id.as_bytes(),
        );
        batch.put_cf(
            self.cf(CF_IDX_GATEWAY)?,
            payment.gateway_transaction_id.as_bytes(),
            payment.id.as_bytes(),
        );
        batch.put_cf(
            self.cf(CF_IDX_BOOKING_PAYMENT)?,
            payment.booking_id.as_bytes(),
            payment.id.as_bytes(),
        );
        self.db.write(batch).map_err(internal)
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>> {
        self.get_json(CF_BOOKINGS, id.as_bytes())
    }

    async fn payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        let cf = self.cf(CF_IDX_BOOKING_PAYMENT)?;
        match self
            .db
            .get_cf(cf, booking_id.as_bytes())
            .map_err(internal)?
        {
            Some(id_bytes) => {
                let id = Uuid::from_slice(&id_bytes).map_err(internal)?;
                self.get_json(CF_PAYMENTS, id.as_bytes())
            }
            None => Ok(None),
        }
    }

    async fn payment_by_invoice(&self, invoice_number: &str) -> Result<Option<Payment>> {
        self.payment_by_index(CF_IDX_INVOICE, invoice_number)
    }

    async fn payment_by_gateway_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>> {
        self.payment_by_index(CF_IDX_GATEWAY, gateway_transaction_id)
    }

    async fn conflicting_bookings(
        &self,
        resource_id: Uuid,
        dates: &DateRange,
        times: &TimeRange,
    ) -> Result<Vec<Booking>> {
        Ok(self
            .scan::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .filter(|b| b.resource_id == resource_id && b.conflicts_with(dates, times))
            .collect())
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Booking> {
        let _guard = self.write_lock.lock().await;

        let mut booking: Booking = self
            .get_json(CF_BOOKINGS, id.as_bytes())?
            .ok_or_else(|| BookingError::NotFound(format!("booking {id}")))?;

        if booking.status != expected {
            return Err(BookingError::invalid_state(
                "booking",
                expected,
                booking.status,
            ));
        }
        if !expected.can_transition_to(next) {
            return Err(BookingError::invalid_state(
                "booking",
                format!("a state reachable from {expected}"),
                next,
            ));
        }

        booking.status = next;
        booking.updated_at = at;
        if matches!(next, BookingStatus::Rejected | BookingStatus::Cancelled) {
            booking.rejection_reason = reason;
        }
        self.put_json(CF_BOOKINGS, id.as_bytes(), &booking)?;
        Ok(booking)
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        payment_method: Option<String>,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;

        let mut payment: Payment = self
            .get_json(CF_PAYMENTS, id.as_bytes())?
            .ok_or_else(|| BookingError::NotFound(format!("payment {id}")))?;

        if payment.status != expected {
            return Err(BookingError::invalid_state(
                "payment",
                expected,
                payment.status,
            ));
        }
        if !expected.can_transition_to(next) {
            return Err(BookingError::invalid_state(
                "payment",
                format!("a state reachable from {expected}"),
                next,
            ));
        }

        payment.status = next;
        if payment_method.is_some() {
            payment.payment_method = payment_method;
        }
        if paid_at.is_some() {
            payment.paid_at = paid_at;
        }
        self.put_json(CF_PAYMENTS, id.as_bytes(), &payment)?;
        Ok(payment)
    }

    async fn insert_refund(&self, refund: Refund) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let cf = self.cf(CF_REFUNDS)?;
        if self
            .db
            .get_pinned_cf(cf, refund.payment_id.as_bytes())
            .map_err(internal)?
            .is_some()
        {
            return Err(BookingError::invalid_state(
                "refund",
                "no existing refund",
                "already refunded",
            ));
        }
        self.put_json(CF_REFUNDS, refund.payment_id.as_bytes(), &refund)
    }

    async fn refund_for_payment(&self, payment_id: Uuid) -> Result<Option<Refund>> {
        self.get_json(CF_REFUNDS, payment_id.as_bytes())
    }

    async fn expiring_bookings(&self, today: NaiveDate) -> Result<Vec<Booking>> {
        Ok(self
            .scan::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .filter(|b| b.status.blocks_availability() && b.dates.end < today)
            .collect())
    }

    async fn unreconciled_refunds(&self) -> Result<Vec<Refund>> {
        Ok(self
            .scan::<Refund>(CF_REFUNDS)?
            .into_iter()
            .filter(|r| r.origin == RefundOrigin::LocalFallback)
            .collect())
    }

    async fn all_bookings(&self) -> Result<Vec<Booking>> {
        self.scan(CF_BOOKINGS)
    }
}

#[async_trait]
impl ResourceStore for RocksDbStore {
    async fn store(&self, resource: Resource) -> Result<()> {
        self.put_json(CF_RESOURCES, resource.id.as_bytes(), &resource)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>> {
        self.get_json(CF_RESOURCES, id.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::Amount;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn fixture(resource_id: Uuid) -> (Booking, Payment) {
        let booking = Booking::new(
            resource_id,
            Uuid::new_v4(),
            "Seminar".to_string(),
            DateRange::new("2030-06-01".parse().unwrap(), "2030-06-02".parse().unwrap()).unwrap(),
            TimeRange::new("09:00:00".parse().unwrap(), "17:00:00".parse().unwrap()).unwrap(),
            None,
            Utc::now(),
        );
        let payment = Payment::new(
            booking.id,
            format!("gw-{}", booking.id.simple()),
            format!("INV-{}", booking.id.simple()),
            Amount::new(dec!(100000)).unwrap(),
            "Dana".to_string(),
            "dana@example.com".to_string(),
        );
        (booking, payment)
    }

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("failed to open RocksDB");
        assert!(store.db.cf_handle(CF_BOOKINGS).is_some());
        assert!(store.db.cf_handle(CF_REFUNDS).is_some());
        assert!(store.db.cf_handle(CF_RESOURCES).is_some());
    }

    #[tokio::test]
    async fn test_reserve_persists_and_indexes() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let (booking, payment) = fixture(Uuid::new_v4());

        store.reserve(booking.clone(), payment.clone()).await.unwrap();

        assert_eq!(store.booking(booking.id).await.unwrap().unwrap(), booking);
        assert_eq!(
            store
                .payment_by_invoice(&payment.invoice_number)
                .await
                .unwrap()
                .unwrap(),
            payment
        );
        assert_eq!(
            store
                .payment_by_gateway_id(&payment.gateway_transaction_id)
                .await
                .unwrap()
                .unwrap(),
            payment
        );
    }

    #[tokio::test]
    async fn test_reserve_conflict_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let resource_id = Uuid::new_v4();
        let (first, first_payment) = fixture(resource_id);
        let (second, second_payment) = fixture(resource_id);

        store.reserve(first, first_payment).await.unwrap();
        assert!(matches!(
            store.reserve(second.clone(), second_payment).await,
            Err(BookingError::Conflict(_))
        ));
        assert!(store.booking(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refund_key_is_unique_per_payment() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let (booking, payment) = fixture(Uuid::new_v4());
        let payment_id = payment.id;
        let amount = payment.amount;
        store.reserve(booking, payment).await.unwrap();

        let refund = Refund {
            id: Uuid::new_v4(),
            payment_id,
            amount,
            status: crate::domain::payment::RefundStatus::Succeeded,
            reason: "test".to_string(),
            initiated_by: crate::domain::payment::RefundInitiator::Admin,
            origin: RefundOrigin::GatewayConfirmed,
            gateway_refund_id: "rf-1".to_string(),
            created_at: Utc::now(),
        };
        store.insert_refund(refund.clone()).await.unwrap();
        assert!(matches!(
            store.insert_refund(refund).await,
            Err(BookingError::InvalidState { .. })
        ));
    }
}
