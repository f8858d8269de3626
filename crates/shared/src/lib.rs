// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! CoachDesk Shared Library
//!
//! Common types and infrastructure used by the billing core and the
//! background worker: subscription tier and status enums, database row
//! models, pool construction, and the injectable clock.

pub mod clock;
pub mod db;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use db::{create_pool, run_migrations};
pub use types::{
    CoachAccount, EarningStatus, PaymentRecord, ReferralEarning, RenewalDuration,
    SubscriptionStatus, Tier, TraineeConnection,
};
