use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::ledger;
use crate::models::{BookingWithParties, REVIEW_REQUEST_KIND};
use crate::notifications;

type DbPool = Pool<AsyncPgConnection>;

/// Scope of the "already asked for a review" check. `User` sends one review
/// request per user, ever; `Booking` prompts once per completed booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DedupPolicy {
    User,
    Booking,
}

impl DedupPolicy {
    fn dedup_booking_id(&self, booking_id: i64) -> Option<i64> {
        match self {
            DedupPolicy::User => None,
            DedupPolicy::Booking => Some(booking_id),
        }
    }
}

/// Outbound review-request email contract. Delivery mechanics are out of
/// scope; failures are logged and never retried.
#[async_trait]
pub trait ReviewMailer: Send + Sync {
    async fn send_review_request(
        &self,
        email: &str,
        first_name: &str,
        venue_name: &str,
        booking_id: i64,
    ) -> anyhow::Result<()>;
}

pub struct LogMailer;

#[async_trait]
impl ReviewMailer for LogMailer {
    async fn send_review_request(
        &self,
        email: &str,
        _first_name: &str,
        venue_name: &str,
        booking_id: i64,
    ) -> anyhow::Result<()> {
        info!(
            "review request email to {} for venue {} (booking {})",
            email, venue_name, booking_id
        );
        Ok(())
    }
}

/// Storage side of the exactly-once guarantee: records a review request
/// unless its dedup key is already present, reporting whether a row was
/// created.
#[async_trait]
pub trait ReviewRequestSink: Send + Sync {
    async fn record_if_absent(
        &self,
        user_id: Uuid,
        booking_id: i64,
        dedup_booking: Option<i64>,
        message: String,
    ) -> Result<bool, ServiceError>;
}

pub struct PgReviewRequestSink {
    pool: DbPool,
}

impl PgReviewRequestSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewRequestSink for PgReviewRequestSink {
    /// Dedup check and insert run in one transaction so concurrent scheduler
    /// instances cannot both pass the check and double-notify.
    async fn record_if_absent(
        &self,
        user_id: Uuid,
        booking_id: i64,
        dedup_booking: Option<i64>,
        message: String,
    ) -> Result<bool, ServiceError> {
        let mut conn = self.pool.get().await?;
        conn.transaction::<_, ServiceError, _>(|conn| {
            Box::pin(async move {
                if notifications::exists_review_request(conn, user_id, dedup_booking).await? {
                    return Ok(false);
                }
                notifications::append(
                    conn,
                    user_id,
                    Some(booking_id),
                    message,
                    REVIEW_REQUEST_KIND.to_string(),
                )
                .await?;
                Ok(true)
            })
        })
        .await
    }
}

pub fn review_message(venue_name: &str) -> String {
    format!(
        "Please leave a review for your recently booked venue: {}",
        venue_name
    )
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub created: usize,
    pub failed: usize,
}

/// Finds bookings whose scheduled end has passed and makes sure each
/// implicated user is asked for a review exactly once. Holds no state between
/// ticks; every decision is re-derived from durable storage, so the scan is
/// safe to re-run at any time.
pub struct ReviewRequestScheduler {
    pool: DbPool,
    policy: DedupPolicy,
    mailer: Arc<dyn ReviewMailer>,
    sink: Arc<dyn ReviewRequestSink>,
    interval: Duration,
}

impl ReviewRequestScheduler {
    pub fn new(
        pool: DbPool,
        policy: DedupPolicy,
        mailer: Arc<dyn ReviewMailer>,
        interval: Duration,
    ) -> Self {
        let sink = Arc::new(PgReviewRequestSink::new(pool.clone()));
        Self {
            pool,
            policy,
            mailer,
            sink,
            interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.run_scan(Utc::now().naive_utc()).await {
                Ok(summary) => info!(
                    "review scan: {} elapsed, {} notified, {} failed",
                    summary.scanned, summary.created, summary.failed
                ),
                // Connectivity failures abort this tick; the next one retries.
                Err(e) => error!("review scan aborted: {}", e),
            }
        }
    }

    pub async fn run_scan(&self, as_of: NaiveDateTime) -> Result<ScanSummary, ServiceError> {
        let mut conn = self.pool.get().await?;
        let elapsed = ledger::elapsed_bookings(&mut conn, as_of).await?;
        drop(conn);

        debug_assert!(elapsed.iter().all(|row| row.booking.has_elapsed(as_of)));

        Ok(dispatch(self.policy, &self.sink, &self.mailer, &elapsed).await)
    }
}

/// Walks the elapsed rows; one bad row must not block the rest of the scan.
async fn dispatch(
    policy: DedupPolicy,
    sink: &Arc<dyn ReviewRequestSink>,
    mailer: &Arc<dyn ReviewMailer>,
    rows: &[BookingWithParties],
) -> ScanSummary {
    let mut summary = ScanSummary {
        scanned: rows.len(),
        created: 0,
        failed: 0,
    };

    for row in rows {
        let dedup_booking = policy.dedup_booking_id(row.booking.id);
        let message = review_message(&row.venue.name);

        match sink
            .record_if_absent(row.user.id, row.booking.id, dedup_booking, message)
            .await
        {
            Ok(true) => {
                summary.created += 1;

                // Fire-and-forget: the notification row is the source of
                // truth, email failures are logged and never block or retry.
                let mailer = mailer.clone();
                let email = row.user.email.clone();
                let first_name = row.user.first_name.clone();
                let venue_name = row.venue.name.clone();
                let booking_id = row.booking.id;
                tokio::spawn(async move {
                    if let Err(e) = mailer
                        .send_review_request(&email, &first_name, &venue_name, booking_id)
                        .await
                    {
                        warn!(
                            "review request email for booking {} failed: {}",
                            booking_id, e
                        );
                    }
                });
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    "review request for booking {} skipped: {}",
                    row.booking.id, e
                );
                summary.failed += 1;
            }
        }
    }

    summary
}
