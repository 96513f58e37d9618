use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use venuebook::application::engine::BookingEngine;
use venuebook::application::notifications::Notifier;
use venuebook::config::{Environment, GatewayConfig, WebhookCredentials};
use venuebook::domain::booking::BookingRequest;
use venuebook::domain::payment::Amount;
use venuebook::domain::ports::{
    ClockRef, PaymentGatewayRef, ReservationStoreRef, ResourceStoreRef, SystemClock,
};
use venuebook::domain::resource::Resource;
use venuebook::error::BookingError;
use venuebook::infrastructure::gateway::{StaticGateway, sign_payload};
use venuebook::infrastructure::in_memory::{InMemoryReservationStore, InMemoryResourceStore};
use venuebook::interfaces::csv::summary_writer::{BookingSummary, SummaryWriter};
use venuebook::interfaces::jsonl::command_reader::{Command, CommandReader};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands JSONL file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Deployment environment; production refuses to start without a secret.
    #[arg(long, default_value = "development")]
    environment: Environment,

    /// Shared secret for webhook signature verification.
    #[arg(long)]
    webhook_secret: Option<String>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_persistent(path: PathBuf) -> Result<(ReservationStoreRef, ResourceStoreRef)> {
    let store =
        venuebook::infrastructure::rocksdb::RocksDbStore::open(path).into_diagnostic()?;
    Ok((Arc::new(store.clone()), Arc::new(store)))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_persistent(_path: PathBuf) -> Result<(ReservationStoreRef, ResourceStoreRef)> {
    Err(miette::miette!(
        "--db-path requires building with --features storage-rocksdb"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let credentials = WebhookCredentials::new(cli.environment, cli.webhook_secret.clone())
        .into_diagnostic()?;
    let config = GatewayConfig::new(credentials.clone());
    let gateway: PaymentGatewayRef = Arc::new(StaticGateway::new(credentials));
    let clock: ClockRef = Arc::new(SystemClock);

    let (notifier, mut events) = Notifier::channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(kind = ?event.kind, booking = %event.booking_id, "notification");
        }
    });

    let (store, resources): (ReservationStoreRef, ResourceStoreRef) = match cli.db_path {
        Some(path) => open_persistent(path)?,
        None => (
            Arc::new(InMemoryReservationStore::new()),
            Arc::new(InMemoryResourceStore::new()),
        ),
    };

    let engine = BookingEngine::new(
        store,
        Arc::clone(&resources),
        gateway,
        clock,
        config,
        notifier,
    );

    let file = File::open(cli.input).into_diagnostic()?;
    let mut runner = CommandRunner {
        engine: &engine,
        webhook_secret: cli.webhook_secret,
        resources: HashMap::new(),
        bookings: HashMap::new(),
    };
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                if let Err(e) = runner.run(command).await {
                    eprintln!("Error processing command: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {e}");
            }
        }
    }

    let unreconciled = engine.unreconciled_refunds().await.into_diagnostic()?;
    if !unreconciled.is_empty() {
        tracing::warn!(
            count = unreconciled.len(),
            "refunds awaiting out-of-band gateway confirmation"
        );
    }

    let rows = summarize(&engine, &resources).await.into_diagnostic()?;
    let stdout = io::stdout();
    SummaryWriter::new(stdout.lock())
        .write_summaries(rows)
        .into_diagnostic()?;

    Ok(())
}

async fn summarize(
    engine: &BookingEngine,
    resources: &ResourceStoreRef,
) -> venuebook::error::Result<Vec<BookingSummary>> {
    let mut rows = Vec::new();
    for booking in engine.all_bookings().await? {
        let Some(payment) = engine.payment_for_booking(booking.id).await? else {
            continue;
        };
        let refunded = engine.refund_for_booking(booking.id).await?.is_some();
        let resource = resources
            .get(booking.resource_id)
            .await?
            .map(|r| r.name)
            .unwrap_or_else(|| "unknown".to_string());
        rows.push(BookingSummary {
            activity: booking.activity_name,
            resource,
            status: booking.status,
            payment_status: payment.status,
            amount: payment.amount.value(),
            refunded,
        });
    }
    Ok(rows)
}

/// Executes commands against the engine, resolving `ref` labels to the ids
/// the engine assigned. The webhook commands play the gateway's role: they
/// build the payload, sign it with the configured secret and push it through
/// the real reconciliation path.
struct CommandRunner<'a> {
    engine: &'a BookingEngine,
    webhook_secret: Option<String>,
    resources: HashMap<String, Uuid>,
    bookings: HashMap<String, Uuid>,
}

impl CommandRunner<'_> {
    async fn run(&mut self, command: Command) -> venuebook::error::Result<()> {
        match command {
            Command::AddResource {
                r#ref,
                name,
                unit_price_per_day,
            } => {
                let resource = Resource::new(name, Amount::new(unit_price_per_day)?);
                self.resources.insert(r#ref, resource.id);
                self.engine.add_resource(resource).await
            }
            Command::Create {
                r#ref,
                resource,
                activity_name,
                start_date,
                end_date,
                start_time,
                end_time,
                payer_name,
                payer_email,
                proposal_document_ref,
            } => {
                let resource_id = self.resolve(&self.resources, &resource, "resource")?;
                let confirmation = self
                    .engine
                    .create(
                        Uuid::new_v4(),
                        BookingRequest {
                            resource_id,
                            activity_name,
                            start_date,
                            end_date,
                            start_time,
                            end_time,
                            payer_name,
                            payer_email,
                            proposal_document_ref,
                        },
                    )
                    .await?;
                tracing::info!(
                    booking = %confirmation.booking_id,
                    total = %confirmation.total_amount,
                    days = confirmation.rental_days,
                    url = %confirmation.payment_url,
                    "created"
                );
                self.bookings.insert(r#ref, confirmation.booking_id);
                Ok(())
            }
            Command::Decide {
                booking,
                decision,
                reason,
            } => {
                let id = self.resolve(&self.bookings, &booking, "booking")?;
                self.engine.decide(id, decision, reason).await?;
                Ok(())
            }
            Command::Refund { booking, reason } => {
                let id = self.resolve(&self.bookings, &booking, "booking")?;
                self.engine.process_refund(id, reason).await?;
                Ok(())
            }
            Command::PaymentEvent {
                booking,
                status,
                payment_method,
            } => {
                let id = self.resolve(&self.bookings, &booking, "booking")?;
                let payment = self
                    .engine
                    .payment_for_booking(id)
                    .await?
                    .ok_or_else(|| BookingError::NotFound(format!("payment for {booking}")))?;
                let raw = serde_json::to_vec(&serde_json::json!({
                    "external_id": payment.invoice_number,
                    "status": status,
                    "payment_method": payment_method,
                    "paid_amount": payment.amount.value(),
                }))?;
                let signature = self.sign(&raw);
                self.engine.handle_invoice_webhook(&raw, &signature).await
            }
            Command::RefundEvent { booking, status } => {
                let id = self.resolve(&self.bookings, &booking, "booking")?;
                let payment = self
                    .engine
                    .payment_for_booking(id)
                    .await?
                    .ok_or_else(|| BookingError::NotFound(format!("payment for {booking}")))?;
                let raw = serde_json::to_vec(&serde_json::json!({
                    "id": format!("rfevt-{}", Uuid::new_v4().simple()),
                    "status": status,
                    "reference_id": payment.invoice_number,
                    "amount": payment.amount.value(),
                    "payment_id": payment.gateway_transaction_id,
                }))?;
                let signature = self.sign(&raw);
                self.engine.handle_refund_webhook(&raw, &signature).await
            }
            Command::Sweep => {
                let report = self.engine.run_expiry_scan().await?;
                tracing::info!(
                    scanned = report.scanned,
                    rejected = report.rejected,
                    completed = report.completed,
                    failed = report.failed,
                    "sweep"
                );
                Ok(())
            }
        }
    }

    fn sign(&self, raw: &[u8]) -> String {
        self.webhook_secret
            .as_deref()
            .map(|secret| sign_payload(secret, raw))
            .unwrap_or_default()
    }

    fn resolve(
        &self,
        table: &HashMap<String, Uuid>,
        key: &str,
        kind: &str,
    ) -> venuebook::error::Result<Uuid> {
        table
            .get(key)
            .copied()
            .or_else(|| Uuid::parse_str(key).ok())
            .ok_or_else(|| BookingError::NotFound(format!("{kind} ref {key}")))
    }
}
