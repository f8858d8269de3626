//! Daily expiry sweep
//!
//! Three sequential passes: downgrade every lapsed active subscription in
//! one bulk update, then send expiry reminders at the 3-day and 1-day
//! marks. Each pass is its own unit of work; the sweep as a whole is not
//! atomic and carries no cancellation path. Reminder matching is date-only
//! and keeps no dedup guard beyond the date match: the schedule guarantees
//! at most one run per calendar day.

use std::sync::Arc;

use coachdesk_shared::Clock;
use serde::Serialize;
use sqlx::PgPool;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::BillingResult;
use crate::notify::{NotificationSink, KIND_RENEWAL_REMINDER, KIND_SUBSCRIPTION_EXPIRED};

/// Counts from one sweep run, for the worker's summary log line
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepSummary {
    pub downgraded: usize,
    pub reminders_3d: usize,
    pub reminders_1d: usize,
}

/// Calendar date a subscription must end on to receive a reminder with the
/// given lead time (time-of-day ignored)
pub fn reminder_target_date(now: OffsetDateTime, lead_days: i64) -> Date {
    (now + Duration::days(lead_days)).date()
}

/// Daily sweep over coach subscriptions
#[derive(Clone)]
pub struct ExpirySweeper {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    notifier: NotificationSink,
}

impl ExpirySweeper {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, notifier: NotificationSink) -> Self {
        Self {
            pool,
            clock,
            notifier,
        }
    }

    /// Run all three passes once
    pub async fn run_daily(&self) -> BillingResult<SweepSummary> {
        let now = self.clock.now();

        let downgraded = self.downgrade_lapsed(now).await?;
        let reminders_3d = self.send_reminders(now, 3).await?;
        let reminders_1d = self.send_reminders(now, 1).await?;

        let summary = SweepSummary {
            downgraded,
            reminders_3d,
            reminders_1d,
        };
        tracing::info!(
            downgraded = summary.downgraded,
            reminders_3d = summary.reminders_3d,
            reminders_1d = summary.reminders_1d,
            "Expiry sweep complete"
        );
        Ok(summary)
    }

    /// Bulk-downgrade every active subscription whose end date has passed.
    ///
    /// The predicate stops matching once a row is downgraded, so re-running
    /// the pass produces zero additional downgrades.
    async fn downgrade_lapsed(&self, now: OffsetDateTime) -> BillingResult<usize> {
        let downgraded: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET subscription_status = 'free',
                subscription_tier = 'starter',
                updated_at = NOW()
            WHERE subscription_status = 'active' AND subscription_end < $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        for user_id in &downgraded {
            self.notifier
                .notify(
                    *user_id,
                    "Subscription expired",
                    "Your subscription has expired and your account was moved to the starter plan. Renew to restore your plan.",
                    KIND_SUBSCRIPTION_EXPIRED,
                    None,
                )
                .await;
        }

        Ok(downgraded.len())
    }

    /// Remind every active subscription ending exactly `lead_days` calendar
    /// days from now
    async fn send_reminders(&self, now: OffsetDateTime, lead_days: i64) -> BillingResult<usize> {
        let target = reminder_target_date(now, lead_days);

        let ending: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM users
            WHERE subscription_status = 'active' AND subscription_end::date = $1
            "#,
        )
        .bind(target)
        .fetch_all(&self.pool)
        .await?;

        let message = format!(
            "Your subscription ends in {} day{}. Renew now to keep your full trainee capacity.",
            lead_days,
            if lead_days == 1 { "" } else { "s" }
        );
        for user_id in &ending {
            self.notifier
                .notify(
                    *user_id,
                    "Subscription ending soon",
                    &message,
                    KIND_RENEWAL_REMINDER,
                    None,
                )
                .await;
        }

        Ok(ending.len())
    }
}
