//! Coach-trainee connection renewal
//!
//! A renewal extends the paid coaching window of one coach-trainee
//! connection. When the connection is still in its paid period the new time
//! stacks onto the current end date; a lapsed connection restarts from now.
//! An explicit start date in the request overrides the stacking logic
//! entirely. The date update and its payment-history record share one
//! transaction: both commit or both roll back.

use std::sync::Arc;

use coachdesk_shared::{Clock, PaymentRecord, RenewalDuration, TraineeConnection};
use serde::Serialize;
use sqlx::PgPool;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Validated renewal request
#[derive(Debug, Clone, Copy)]
pub struct RenewalRequest {
    pub duration: RenewalDuration,
    /// Amount paid, recorded verbatim in the payment history
    pub amount: f64,
    /// Optional explicit window start; overrides stacking
    pub start_date: Option<OffsetDateTime>,
}

impl RenewalRequest {
    /// Parse raw request fields, rejecting bad values before any mutation
    pub fn parse(duration: &str, amount: f64, start_date: Option<&str>) -> BillingResult<Self> {
        let duration = duration
            .parse::<RenewalDuration>()
            .map_err(BillingError::Validation)?;
        let start_date = start_date
            .map(|s| {
                OffsetDateTime::parse(s, &Rfc3339)
                    .map_err(|_| BillingError::Validation(format!("Invalid start date: {}", s)))
            })
            .transpose()?;
        Ok(Self {
            duration,
            amount,
            start_date,
        })
    }
}

/// New window computed for a renewal; `new_start` is None when the existing
/// start date is kept (stacking)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalWindow {
    pub new_start: Option<OffsetDateTime>,
    pub new_end: OffsetDateTime,
}

/// Compute the renewal window for a connection.
///
/// - an explicit start recomputes the whole window from that start;
/// - otherwise a still-valid connection stacks: the end date extends from
///   the current end, and the start date is left untouched;
/// - otherwise the window restarts from now.
pub fn compute_renewal_window(
    now: OffsetDateTime,
    current_end: Option<OffsetDateTime>,
    explicit_start: Option<OffsetDateTime>,
    duration: RenewalDuration,
) -> RenewalWindow {
    let length = Duration::days(duration.days());

    if let Some(start) = explicit_start {
        return RenewalWindow {
            new_start: Some(start),
            new_end: start + length,
        };
    }

    match current_end {
        Some(end) if end > now => RenewalWindow {
            new_start: None,
            new_end: end + length,
        },
        _ => RenewalWindow {
            new_start: Some(now),
            new_end: now + length,
        },
    }
}

/// Result of a committed renewal
#[derive(Debug, Clone, Serialize)]
pub struct RenewalOutcome {
    pub coach_id: Uuid,
    pub trainee_id: Uuid,
    pub amount: f64,
    pub duration: RenewalDuration,
    pub end_date: OffsetDateTime,
}

/// Service applying connection renewals
#[derive(Clone)]
pub struct RenewalService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl RenewalService {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Read one coach-trainee connection row
    pub async fn connection(
        &self,
        coach_id: Uuid,
        trainee_id: Uuid,
    ) -> BillingResult<TraineeConnection> {
        sqlx::query_as(
            r#"
            SELECT coach_id, trainee_id, start_date, end_date, created_at
            FROM coach_trainees
            WHERE coach_id = $1 AND trainee_id = $2
            "#,
        )
        .bind(coach_id)
        .bind(trainee_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            BillingError::NotFound(format!(
                "No connection between coach {} and trainee {}",
                coach_id, trainee_id
            ))
        })
    }

    /// Payment history for a coach, newest first
    pub async fn payment_history(&self, coach_id: Uuid) -> BillingResult<Vec<PaymentRecord>> {
        let records = sqlx::query_as(
            r#"
            SELECT id, coach_id, trainee_id, amount, duration, end_date, created_at
            FROM payment_history
            WHERE coach_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(coach_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Renew one coach-trainee connection and log the payment.
    ///
    /// Missing connection is a not-found rejection with nothing mutated.
    pub async fn renew_connection(
        &self,
        coach_id: Uuid,
        trainee_id: Uuid,
        request: RenewalRequest,
    ) -> BillingResult<RenewalOutcome> {
        let mut tx = self.pool.begin().await?;

        let current_end: Option<Option<OffsetDateTime>> = sqlx::query_scalar(
            "SELECT end_date FROM coach_trainees WHERE coach_id = $1 AND trainee_id = $2",
        )
        .bind(coach_id)
        .bind(trainee_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current_end = current_end.ok_or_else(|| {
            BillingError::NotFound(format!(
                "No connection between coach {} and trainee {}",
                coach_id, trainee_id
            ))
        })?;

        let window = compute_renewal_window(
            self.clock.now(),
            current_end,
            request.start_date,
            request.duration,
        );

        // COALESCE keeps the stored start date when the window stacks.
        sqlx::query(
            r#"
            UPDATE coach_trainees
            SET start_date = COALESCE($1, start_date),
                end_date = $2
            WHERE coach_id = $3 AND trainee_id = $4
            "#,
        )
        .bind(window.new_start)
        .bind(window.new_end)
        .bind(coach_id)
        .bind(trainee_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payment_history (coach_id, trainee_id, amount, duration, end_date)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(coach_id)
        .bind(trainee_id)
        .bind(request.amount)
        .bind(request.duration.to_string())
        .bind(window.new_end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            coach_id = %coach_id,
            trainee_id = %trainee_id,
            duration = %request.duration,
            amount = request.amount,
            end_date = %window.new_end,
            "Connection renewed"
        );

        Ok(RenewalOutcome {
            coach_id,
            trainee_id,
            amount: request.amount,
            duration: request.duration,
            end_date: window.new_end,
        })
    }
}
