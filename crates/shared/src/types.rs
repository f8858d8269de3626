//! Common types used across CoachDesk

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier for a coach account
///
/// The catalog is fixed and part of the external contract: clients display
/// these ids, capacities, and prices directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Starter,
    Bronze,
    Silver,
    Gold,
    Olympian,
}

impl Default for Tier {
    fn default() -> Self {
        Self::Starter
    }
}

impl Tier {
    /// Maximum trainees a coach on this tier may have assigned.
    /// Olympian's 999 is the "unlimited" sentinel.
    pub fn max_trainees(&self) -> u32 {
        match self {
            Self::Starter => 1,
            Self::Bronze => 4,
            Self::Silver => 10,
            Self::Gold => 25,
            Self::Olympian => 999,
        }
    }

    /// Monthly price in dollars
    pub fn price(&self) -> f64 {
        match self {
            Self::Starter => 0.0,
            Self::Bronze => 9.99,
            Self::Silver => 19.99,
            Self::Gold => 39.99,
            Self::Olympian => 99.99,
        }
    }

    /// Human-facing plan name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Olympian => "Olympian",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starter => write!(f, "starter"),
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
            Self::Olympian => write!(f, "olympian"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "olympian" => Ok(Self::Olympian),
            _ => Err(format!("Invalid subscription tier: {}", s)),
        }
    }
}

/// Subscription status for a coach account
///
/// There is no explicit `expired` state: expiry is detected by the daily
/// sweep or lazily at login and materializes as a transition back to `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Free,
    Active,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Active => write!(f, "active"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "active" => Ok(Self::Active),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// Payout status of a referral earning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EarningStatus {
    Pending,
    Paid,
}

impl Default for EarningStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for EarningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

/// Duration code for a coach-trainee connection renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewalDuration {
    SevenDays,
    FifteenDays,
    OneMonth,
}

impl RenewalDuration {
    /// Length of the purchased window in days (1month is a fixed 30 days)
    pub fn days(&self) -> i64 {
        match self {
            Self::SevenDays => 7,
            Self::FifteenDays => 15,
            Self::OneMonth => 30,
        }
    }
}

impl std::fmt::Display for RenewalDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SevenDays => write!(f, "7days"),
            Self::FifteenDays => write!(f, "15days"),
            Self::OneMonth => write!(f, "1month"),
        }
    }
}

impl std::str::FromStr for RenewalDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "7days" => Ok(Self::SevenDays),
            "15days" => Ok(Self::FifteenDays),
            "1month" => Ok(Self::OneMonth),
            _ => Err(format!("Invalid renewal duration: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Coach account with its subscription fields
///
/// The subscription lives on the account row itself; `subscription_tier` is
/// kept as raw text so an unrecognized value fails closed at the capacity
/// gate instead of failing to decode.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CoachAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_tier: String,
    pub subscription_start: Option<OffsetDateTime>,
    pub subscription_end: Option<OffsetDateTime>,
    /// Referrer account id, set once at registration, immutable thereafter
    pub referred_by: Option<Uuid>,
    pub referral_discount_used: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Coach-trainee connection row
///
/// A trainee belongs to at most one coach at a time (unique index on
/// trainee_id). The start/end dates bound the paid coaching window and are
/// extended by renewals.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TraineeConnection {
    pub coach_id: Uuid,
    pub trainee_id: Uuid,
    pub start_date: Option<OffsetDateTime>,
    pub end_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Immutable payment-history record written alongside each renewal
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub trainee_id: Uuid,
    pub amount: f64,
    pub duration: String,
    pub end_date: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Commission owed to a referrer for one qualifying billing event
///
/// One row per event; rows transition pending -> paid by an external payout
/// workflow and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralEarning {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    pub amount: f64,
    pub status: EarningStatus,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_default() {
        assert_eq!(Tier::default(), Tier::Starter);
    }

    #[test]
    fn test_tier_capacities_increase() {
        let tiers = [
            Tier::Starter,
            Tier::Bronze,
            Tier::Silver,
            Tier::Gold,
            Tier::Olympian,
        ];
        for pair in tiers.windows(2) {
            assert!(
                pair[0].max_trainees() < pair[1].max_trainees(),
                "{} must hold fewer trainees than {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_tier_display_roundtrip() {
        for tier in [
            Tier::Starter,
            Tier::Bronze,
            Tier::Silver,
            Tier::Gold,
            Tier::Olympian,
        ] {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_tier_from_str_case_insensitive() {
        assert_eq!("GOLD".parse::<Tier>().unwrap(), Tier::Gold);
        assert_eq!("gold".parse::<Tier>().unwrap(), Tier::Gold);
        assert_eq!("Olympian".parse::<Tier>().unwrap(), Tier::Olympian);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_subscription_status_parse() {
        assert_eq!(
            "active".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Active
        );
        assert_eq!(
            "FREE".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::Free
        );
        assert!("expired".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn test_renewal_duration_days() {
        assert_eq!(RenewalDuration::SevenDays.days(), 7);
        assert_eq!(RenewalDuration::FifteenDays.days(), 15);
        assert_eq!(RenewalDuration::OneMonth.days(), 30);
    }

    #[test]
    fn test_renewal_duration_parse() {
        assert_eq!(
            "7days".parse::<RenewalDuration>().unwrap(),
            RenewalDuration::SevenDays
        );
        assert_eq!(
            "1MONTH".parse::<RenewalDuration>().unwrap(),
            RenewalDuration::OneMonth
        );
        assert!("3weeks".parse::<RenewalDuration>().is_err());
    }
}
