//! Referral commission engine
//!
//! Runs only as a side effect of a subscription update that refreshed the
//! period dates on an account that is (or stays) active. Every qualifying
//! billing event produces its own pending earning row; rows are never
//! merged with earlier ones for the same referrer.

use coachdesk_shared::EarningStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Referrer's cut of the effective price paid
pub const COMMISSION_RATE: f64 = 0.10;

/// One-time discount on the referred coach's first paid cycle
pub const FIRST_CYCLE_DISCOUNT: f64 = 0.20;

/// Commission computed for one billing event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionOutcome {
    /// Amount owed to the referrer, in dollars
    pub amount: f64,
    /// Whether this event consumed the one-time first-cycle discount
    pub discount_applied: bool,
}

/// Compute the commission for a billing event, or None when no commission
/// is owed.
///
/// On the referred coach's first paid cycle the payer is assumed to have
/// paid 80% of the base price; the commission is 10% of the *effective*
/// (possibly discounted) price, never of list price. A base price of 0 (the
/// starter tier) yields no commission.
pub fn compute_commission(base_price: f64, discount_used: bool) -> Option<CommissionOutcome> {
    if base_price <= 0.0 {
        return None;
    }

    let discount_applied = !discount_used;
    let effective_price = if discount_applied {
        base_price * (1.0 - FIRST_CYCLE_DISCOUNT)
    } else {
        base_price
    };

    let amount = effective_price * COMMISSION_RATE;
    if amount <= 0.0 {
        return None;
    }

    Some(CommissionOutcome {
        amount,
        discount_applied,
    })
}

/// Service recording referral earnings
#[derive(Clone)]
pub struct ReferralService {
    pool: PgPool,
}

impl ReferralService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the commission for one qualifying billing event.
    ///
    /// No referrer or a zero-price tier is a no-op. The discount-flag flip
    /// and the earning insert share one transaction so the flag can only be
    /// consumed by an event that actually produced a row. Returns the
    /// recorded amount, if any; callers treat the whole call as
    /// best-effort.
    pub async fn record_commission(
        &self,
        coach_id: Uuid,
        referred_by: Option<Uuid>,
        base_price: f64,
        discount_used: bool,
    ) -> BillingResult<Option<f64>> {
        let Some(referrer_id) = referred_by else {
            return Ok(None);
        };
        let Some(outcome) = compute_commission(base_price, discount_used) else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;

        if outcome.discount_applied {
            // The discount can only ever fire once per account, permanently.
            sqlx::query("UPDATE users SET referral_discount_used = TRUE, updated_at = NOW() WHERE id = $1")
                .bind(coach_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO referral_earnings (referrer_id, referred_user_id, amount, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(referrer_id)
        .bind(coach_id)
        .bind(outcome.amount)
        .bind(EarningStatus::Pending)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            referrer_id = %referrer_id,
            referred_user_id = %coach_id,
            amount = outcome.amount,
            first_cycle_discount = outcome.discount_applied,
            "Referral commission recorded"
        );

        Ok(Some(outcome.amount))
    }

    /// Earnings owed to a referrer, newest first
    pub async fn earnings_for(
        &self,
        referrer_id: Uuid,
    ) -> BillingResult<Vec<coachdesk_shared::ReferralEarning>> {
        let earnings = sqlx::query_as(
            r#"
            SELECT id, referrer_id, referred_user_id, amount, status, created_at
            FROM referral_earnings
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(earnings)
    }
}
