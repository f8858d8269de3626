// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! CoachDesk Billing Module
//!
//! The subscription and referral rules engine behind the coaching platform.
//!
//! ## Features
//!
//! - **Tier Catalog**: Fixed plan table with capacities and prices
//! - **Subscription State Machine**: Merge-patch updates with table-driven
//!   date-refresh rules and self-healing of inconsistent state
//! - **Capacity Enforcement**: Advisory gate on new trainee assignments
//! - **Renewals**: Coach-trainee connection extensions with stacking
//! - **Referral Commissions**: Per-event earnings with a one-time
//!   first-cycle discount
//! - **Expiry Sweep**: Daily downgrade of lapsed subscriptions plus 3-day
//!   and 1-day reminders
//! - **Invariants**: Runnable read-only consistency checks

pub mod capacity;
pub mod error;
pub mod invariants;
pub mod notify;
pub mod referral;
pub mod renewal;
pub mod subscription;
pub mod sweeper;
pub mod tiers;


// Capacity
pub use capacity::{check_capacity, CapacityCheck, CapacityService, CoachCapacity};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Notifications
pub use notify::NotificationSink;

// Referral
pub use referral::{
    compute_commission, CommissionOutcome, ReferralService, COMMISSION_RATE, FIRST_CYCLE_DISCOUNT,
};

// Renewal
pub use renewal::{
    compute_renewal_window, RenewalOutcome, RenewalRequest, RenewalService, RenewalWindow,
};

// Subscription
pub use subscription::{
    plan_transition, LoginReconciliation, SubscriptionPatch, SubscriptionService,
    SubscriptionState, TransitionPlan, SUBSCRIPTION_PERIOD_DAYS,
};

// Sweeper
pub use sweeper::{ExpirySweeper, SweepSummary};

// Tiers
pub use tiers::{all_tiers, capacity_of, info_of, is_valid_tier, suggest_upgrade, TierInfo};

use std::sync::Arc;

use coachdesk_shared::{Clock, SystemClock};
use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub capacity: CapacityService,
    pub referrals: ReferralService,
    pub renewals: RenewalService,
    pub subscriptions: SubscriptionService,
    pub sweeper: ExpirySweeper,
    pub notifications: NotificationSink,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a billing service on the system clock
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Create a billing service with an explicit clock (tests pin time here)
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        let notifications = NotificationSink::new(pool.clone());
        let referrals = ReferralService::new(pool.clone());

        Self {
            capacity: CapacityService::new(pool.clone()),
            referrals: referrals.clone(),
            renewals: RenewalService::new(pool.clone(), clock.clone()),
            subscriptions: SubscriptionService::new(pool.clone(), clock.clone(), referrals),
            sweeper: ExpirySweeper::new(pool.clone(), clock, notifications.clone()),
            notifications,
            invariants: InvariantChecker::new(pool),
        }
    }
}
