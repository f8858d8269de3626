//! Coach subscription state machine
//!
//! Two states, `free` and `active`. There is no stored `expired` state:
//! expiry is detected by the daily sweep or lazily at login and materializes
//! as a transition back to `free` with the tier reset to starter.
//!
//! Admin updates arrive as a typed merge-patch: only fields present in the
//! request are applied. The transition itself is planned by a pure,
//! table-driven function so the date-refresh and commission rules are
//! unit-testable independent of persistence.

use std::sync::Arc;

use coachdesk_shared::{Clock, CoachAccount, SubscriptionStatus, Tier};
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::referral::ReferralService;

/// Length of one paid subscription period
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Merge-patch carried by an admin subscription update; absent fields are
/// left untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionPatch {
    pub status: Option<SubscriptionStatus>,
    pub tier: Option<Tier>,
}

impl SubscriptionPatch {
    /// Parse raw request fields, rejecting bad values before any mutation
    pub fn parse(status: Option<&str>, tier: Option<&str>) -> BillingResult<Self> {
        let status = status
            .map(|s| s.parse::<SubscriptionStatus>())
            .transpose()
            .map_err(BillingError::Validation)?;
        let tier = tier
            .map(|t| t.parse::<Tier>())
            .transpose()
            .map_err(BillingError::Validation)?;
        Ok(Self { status, tier })
    }
}

/// Current subscription fields of a coach account
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    pub tier: Tier,
    pub start_date: Option<OffsetDateTime>,
    pub end_date: Option<OffsetDateTime>,
}

/// Planned outcome of applying a patch to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub next_status: SubscriptionStatus,
    pub next_tier: Tier,
    /// Whether the period dates are refreshed to [now, now + 30 days]
    pub refresh_dates: bool,
    /// Whether this update qualifies as a billing event for the referral
    /// commission engine
    pub commission_eligible: bool,
}

/// Plan the transition for one update request.
///
/// The period dates are refreshed when any of the following holds, checked
/// in order (the conditions are not mutually exclusive; all share the same
/// refresh action):
/// 1. the patch explicitly sets `status = active`;
/// 2. no status change was requested and the row is `active` with a missing
///    end date (self-heal of inconsistent state);
/// 3. no status change was requested and the patch moves the account to a
///    different tier (treated as a renewal).
///
/// A commission is due when the dates were refreshed and the account either
/// leaves the update active or was already active going in. This also fires
/// on a tier-only change of an already-active, well-formed subscription;
/// that behavior is kept for compatibility with the billing history clients
/// already reconcile against.
pub fn plan_transition(current: &SubscriptionState, patch: &SubscriptionPatch) -> TransitionPlan {
    let next_status = patch.status.unwrap_or(current.status);
    let next_tier = patch.tier.unwrap_or(current.tier);

    let explicit_activation = patch.status == Some(SubscriptionStatus::Active);
    let heal_missing_dates = patch.status.is_none()
        && current.status == SubscriptionStatus::Active
        && current.end_date.is_none();
    let tier_renewal =
        patch.status.is_none() && patch.tier.is_some_and(|t| t != current.tier);

    let refresh_dates = explicit_activation || heal_missing_dates || tier_renewal;
    let commission_eligible =
        refresh_dates && (explicit_activation || current.status == SubscriptionStatus::Active);

    TransitionPlan {
        next_status,
        next_tier,
        refresh_dates,
        commission_eligible,
    }
}

/// Outcome of the lazy expiry check at login
#[derive(Debug, Clone, Serialize)]
pub struct LoginReconciliation {
    pub downgraded: bool,
    pub status: SubscriptionStatus,
    pub tier: String,
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    subscription_status: SubscriptionStatus,
    subscription_tier: String,
    subscription_start: Option<OffsetDateTime>,
    subscription_end: Option<OffsetDateTime>,
    referred_by: Option<Uuid>,
    referral_discount_used: bool,
}

/// Service applying subscription updates and the login-time expiry net
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    referrals: ReferralService,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, referrals: ReferralService) -> Self {
        Self {
            pool,
            clock,
            referrals,
        }
    }

    /// Read a coach account with its subscription fields
    pub async fn coach_account(&self, coach_id: Uuid) -> BillingResult<CoachAccount> {
        sqlx::query_as(
            r#"
            SELECT id, name, email, role, subscription_status, subscription_tier,
                   subscription_start, subscription_end, referred_by,
                   referral_discount_used, created_at, updated_at
            FROM users
            WHERE id = $1 AND role = 'coach'
            "#,
        )
        .bind(coach_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Coach {} not found", coach_id)))
    }

    /// Apply an admin merge-patch to a coach's subscription.
    ///
    /// The row update is its own unit of work. Commission recording runs
    /// afterwards as a best-effort side effect: a failure there is logged
    /// and swallowed, never rolled into the already-committed update.
    pub async fn update_subscription(
        &self,
        coach_id: Uuid,
        patch: SubscriptionPatch,
    ) -> BillingResult<SubscriptionState> {
        let row: SubscriptionRow = sqlx::query_as(
            r#"
            SELECT subscription_status, subscription_tier, subscription_start,
                   subscription_end, referred_by, referral_discount_used
            FROM users
            WHERE id = $1 AND role = 'coach'
            "#,
        )
        .bind(coach_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Coach {} not found", coach_id)))?;

        let current = SubscriptionState {
            status: row.subscription_status,
            // A stored tier that no longer parses falls back to starter;
            // the capacity gate fails closed on the raw string separately.
            tier: row.subscription_tier.parse().unwrap_or_default(),
            start_date: row.subscription_start,
            end_date: row.subscription_end,
        };

        let plan = plan_transition(&current, &patch);
        let now = self.clock.now();
        let (start_date, end_date) = if plan.refresh_dates {
            (
                Some(now),
                Some(now + Duration::days(SUBSCRIPTION_PERIOD_DAYS)),
            )
        } else {
            (current.start_date, current.end_date)
        };

        sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = $1,
                subscription_tier = $2,
                subscription_start = $3,
                subscription_end = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(plan.next_status)
        .bind(plan.next_tier.to_string())
        .bind(start_date)
        .bind(end_date)
        .bind(coach_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            coach_id = %coach_id,
            status = %plan.next_status,
            tier = %plan.next_tier,
            refreshed = plan.refresh_dates,
            "Subscription updated"
        );

        if plan.commission_eligible {
            if let Err(e) = self
                .referrals
                .record_commission(
                    coach_id,
                    row.referred_by,
                    plan.next_tier.price(),
                    row.referral_discount_used,
                )
                .await
            {
                tracing::warn!(
                    coach_id = %coach_id,
                    error = %e,
                    "Failed to record referral commission (subscription update kept)"
                );
            }
        }

        Ok(SubscriptionState {
            status: plan.next_status,
            tier: plan.next_tier,
            start_date,
            end_date,
        })
    }

    /// Lazy expiry safety net, run whenever a user authenticates.
    ///
    /// If the stored subscription is `active` with an end date already in
    /// the past, the same downgrade the daily sweep applies happens inline
    /// so the login response never shows a stale active status.
    pub async fn reconcile_at_login(&self, user_id: Uuid) -> BillingResult<LoginReconciliation> {
        let row: Option<(SubscriptionStatus, String, Option<OffsetDateTime>)> = sqlx::query_as(
            "SELECT subscription_status, subscription_tier, subscription_end FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (status, tier, end_date) =
            row.ok_or_else(|| BillingError::NotFound(format!("User {} not found", user_id)))?;

        let lapsed = status == SubscriptionStatus::Active
            && end_date.is_some_and(|end| end < self.clock.now());
        if !lapsed {
            return Ok(LoginReconciliation {
                downgraded: false,
                status,
                tier,
            });
        }

        sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = 'free',
                subscription_tier = 'starter',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, "Lapsed subscription downgraded at login");

        Ok(LoginReconciliation {
            downgraded: true,
            status: SubscriptionStatus::Free,
            tier: Tier::Starter.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn active_state() -> SubscriptionState {
        SubscriptionState {
            status: SubscriptionStatus::Active,
            tier: Tier::Silver,
            start_date: Some(datetime!(2025-05-01 00:00:00 UTC)),
            end_date: Some(datetime!(2025-05-31 00:00:00 UTC)),
        }
    }

    #[test]
    fn test_explicit_activation_refreshes_dates() {
        let current = SubscriptionState {
            status: SubscriptionStatus::Free,
            tier: Tier::Starter,
            start_date: None,
            end_date: None,
        };
        let patch = SubscriptionPatch {
            status: Some(SubscriptionStatus::Active),
            tier: None,
        };
        let plan = plan_transition(&current, &patch);
        assert!(plan.refresh_dates);
        assert!(plan.commission_eligible);
        assert_eq!(plan.next_status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_missing_dates_self_heal() {
        let current = SubscriptionState {
            status: SubscriptionStatus::Active,
            tier: Tier::Gold,
            start_date: None,
            end_date: None,
        };
        let plan = plan_transition(&current, &SubscriptionPatch::default());
        assert!(plan.refresh_dates, "no-op update must repair missing dates");
        assert!(plan.commission_eligible);
        assert_eq!(plan.next_status, SubscriptionStatus::Active);
        assert_eq!(plan.next_tier, Tier::Gold);
    }

    #[test]
    fn test_tier_change_counts_as_renewal() {
        let patch = SubscriptionPatch {
            status: None,
            tier: Some(Tier::Gold),
        };
        let plan = plan_transition(&active_state(), &patch);
        assert!(plan.refresh_dates);
        assert!(plan.commission_eligible);
        assert_eq!(plan.next_tier, Tier::Gold);
    }

    #[test]
    fn test_same_tier_patch_is_not_a_renewal() {
        let patch = SubscriptionPatch {
            status: None,
            tier: Some(Tier::Silver),
        };
        let plan = plan_transition(&active_state(), &patch);
        assert!(!plan.refresh_dates);
        assert!(!plan.commission_eligible);
    }

    #[test]
    fn test_empty_patch_on_well_formed_active_changes_nothing() {
        let plan = plan_transition(&active_state(), &SubscriptionPatch::default());
        assert!(!plan.refresh_dates);
        assert!(!plan.commission_eligible);
        assert_eq!(plan.next_status, SubscriptionStatus::Active);
        assert_eq!(plan.next_tier, Tier::Silver);
    }

    #[test]
    fn test_deactivation_never_refreshes_or_commissions() {
        let patch = SubscriptionPatch {
            status: Some(SubscriptionStatus::Free),
            tier: None,
        };
        let plan = plan_transition(&active_state(), &patch);
        assert!(!plan.refresh_dates);
        assert!(!plan.commission_eligible);
        assert_eq!(plan.next_status, SubscriptionStatus::Free);
    }

    #[test]
    fn test_activation_of_free_account_is_commission_eligible() {
        let current = SubscriptionState {
            status: SubscriptionStatus::Free,
            tier: Tier::Bronze,
            start_date: None,
            end_date: None,
        };
        let patch = SubscriptionPatch {
            status: Some(SubscriptionStatus::Active),
            tier: Some(Tier::Gold),
        };
        let plan = plan_transition(&current, &patch);
        assert!(plan.refresh_dates);
        assert!(plan.commission_eligible);
        assert_eq!(plan.next_tier, Tier::Gold);
    }

    #[test]
    fn test_patch_parse_rejects_bad_values() {
        assert!(SubscriptionPatch::parse(Some("expired"), None).is_err());
        assert!(SubscriptionPatch::parse(None, Some("platinum")).is_err());
        let patch = SubscriptionPatch::parse(Some("ACTIVE"), Some("Gold")).unwrap();
        assert_eq!(patch.status, Some(SubscriptionStatus::Active));
        assert_eq!(patch.tier, Some(Tier::Gold));
    }
}
