//! Trainee capacity enforcement
//!
//! The gate applies to the *create* operation for a coach-trainee relation
//! only: a coach who downgrades tiers keeps existing trainees, and only new
//! assignments are blocked. The check is advisory-strength, so two
//! concurrent assignments near the boundary can both pass (the unique index
//! on trainee_id is the uniqueness backstop; the count gate itself carries
//! no serialization).

use coachdesk_shared::Tier;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::tiers;

/// Result of the capacity gate
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapacityCheck {
    pub allowed: bool,
    pub limit: u32,
}

/// Capacity snapshot for a coach, enough to render an upgrade prompt
#[derive(Debug, Clone, Serialize)]
pub struct CoachCapacity {
    pub tier: String,
    pub current_count: i64,
    pub max_allowed: u32,
    pub allowed: bool,
    /// Cheapest tier that would cover one more trainee
    pub suggested_tier: Tier,
}

/// Pure capacity gate: compare the current assignment count against the
/// tier's limit. A coach with no explicit tier is treated as the lowest
/// tier, never as unlimited; an unknown tier id fails closed to 0.
pub fn check_capacity(tier_id: Option<&str>, current_count: i64) -> CapacityCheck {
    let limit = match tier_id {
        Some(id) => tiers::capacity_of(id),
        None => Tier::Starter.max_trainees(),
    };
    CapacityCheck {
        allowed: current_count < i64::from(limit),
        limit,
    }
}

/// Service gating new coach-trainee assignments
#[derive(Clone)]
pub struct CapacityService {
    pool: PgPool,
}

impl CapacityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Capacity snapshot for a coach without mutating anything
    pub async fn coach_capacity(&self, coach_id: Uuid) -> BillingResult<CoachCapacity> {
        let tier = self.coach_tier(coach_id).await?;
        let current_count = self.assignment_count(coach_id).await?;
        let check = check_capacity(Some(&tier), current_count);

        Ok(CoachCapacity {
            tier,
            current_count,
            max_allowed: check.limit,
            allowed: check.allowed,
            suggested_tier: tiers::suggest_upgrade(u32::try_from(current_count + 1).unwrap_or(0)),
        })
    }

    /// Assign a trainee to a coach, enforcing uniqueness and the tier gate
    ///
    /// Rejections are user-facing: a full coach gets a capacity error with
    /// the current count and limit, a trainee already attached to a coach is
    /// a conflict. Neither mutates anything.
    pub async fn assign_trainee(&self, coach_id: Uuid, trainee_id: Uuid) -> BillingResult<()> {
        let tier = self.coach_tier(coach_id).await?;

        let trainee_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND role = 'trainee')")
                .bind(trainee_id)
                .fetch_one(&self.pool)
                .await?;
        if !trainee_exists {
            return Err(BillingError::NotFound(format!(
                "Trainee {} not found",
                trainee_id
            )));
        }

        let existing_coach: Option<Uuid> =
            sqlx::query_scalar("SELECT coach_id FROM coach_trainees WHERE trainee_id = $1")
                .bind(trainee_id)
                .fetch_optional(&self.pool)
                .await?;
        if existing_coach.is_some() {
            return Err(BillingError::Conflict(
                "Trainee is already assigned to a coach".to_string(),
            ));
        }

        let current_count = self.assignment_count(coach_id).await?;
        let check = check_capacity(Some(&tier), current_count);
        if !check.allowed {
            return Err(BillingError::CapacityExceeded {
                current_count,
                max_allowed: check.limit,
                tier,
            });
        }

        let insert = sqlx::query("INSERT INTO coach_trainees (coach_id, trainee_id) VALUES ($1, $2)")
            .bind(coach_id)
            .bind(trainee_id)
            .execute(&self.pool)
            .await;

        match insert {
            Ok(_) => {
                tracing::info!(
                    coach_id = %coach_id,
                    trainee_id = %trainee_id,
                    count = current_count + 1,
                    limit = check.limit,
                    "Trainee assigned"
                );
                Ok(())
            }
            // Concurrent assignment of the same trainee lost the race to the
            // unique index; report it as the same conflict as the pre-check.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                BillingError::Conflict("Trainee is already assigned to a coach".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn coach_tier(&self, coach_id: Uuid) -> BillingResult<String> {
        sqlx::query_scalar("SELECT subscription_tier FROM users WHERE id = $1 AND role = 'coach'")
            .bind(coach_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Coach {} not found", coach_id)))
    }

    async fn assignment_count(&self, coach_id: Uuid) -> BillingResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coach_trainees WHERE coach_id = $1")
            .bind(coach_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_blocks_at_limit() {
        let check = check_capacity(Some("bronze"), 4);
        assert!(!check.allowed);
        assert_eq!(check.limit, 4);
    }

    #[test]
    fn test_gate_allows_below_limit() {
        let check = check_capacity(Some("bronze"), 3);
        assert!(check.allowed);
        assert_eq!(check.limit, 4);
    }

    #[test]
    fn test_missing_tier_defaults_to_lowest() {
        let check = check_capacity(None, 0);
        assert!(check.allowed);
        assert_eq!(check.limit, 1);

        let check = check_capacity(None, 1);
        assert!(!check.allowed);
    }

    #[test]
    fn test_unknown_tier_grants_no_capacity() {
        let check = check_capacity(Some("platinum"), 0);
        assert!(!check.allowed);
        assert_eq!(check.limit, 0);
    }

    #[test]
    fn test_olympian_is_effectively_unlimited() {
        let check = check_capacity(Some("olympian"), 500);
        assert!(check.allowed);
        assert_eq!(check.limit, 999);
    }
}
