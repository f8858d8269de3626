//! Subscription invariants
//!
//! Runnable consistency checks over the subscription and assignment data.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::tiers;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Account(s) affected
    pub user_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - data the billing rules depend on is wrong
    Critical,
    /// High - inconsistency that needs attention
    High,
    /// Low - expected under the advisory rules, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct PeriodOrderRow {
    id: Uuid,
    subscription_start: Option<OffsetDateTime>,
    subscription_end: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
struct MultiCoachRow {
    trainee_id: Uuid,
    coach_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CoachLoadRow {
    coach_id: Uuid,
    subscription_tier: String,
    trainee_count: i64,
}

/// Service running subscription invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return a summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_active_has_end_date().await?);
        violations.extend(self.check_period_order().await?);
        violations.extend(self.check_single_coach_per_trainee().await?);
        violations.extend(self.check_capacity_overruns().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: an active subscription carries an end date
    ///
    /// The update path self-heals this on contact; rows surfacing here have
    /// not been touched since the inconsistency appeared.
    async fn check_active_has_end_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM users
            WHERE role = 'coach'
              AND subscription_status = 'active'
              AND subscription_end IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids
            .iter()
            .map(|id| InvariantViolation {
                invariant: "active_has_end_date".to_string(),
                user_ids: vec![*id],
                description: "Active subscription has no end date".to_string(),
                context: serde_json::json!({ "user_id": id }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 2: the subscription period is ordered (end >= start)
    async fn check_period_order(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PeriodOrderRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_start, subscription_end
            FROM users
            WHERE subscription_start IS NOT NULL
              AND subscription_end IS NOT NULL
              AND subscription_end < subscription_start
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| InvariantViolation {
                invariant: "period_order".to_string(),
                user_ids: vec![row.id],
                description: "Subscription ends before it starts".to_string(),
                context: serde_json::json!({
                    "user_id": row.id,
                    "start": row.subscription_start.map(|d| d.to_string()),
                    "end": row.subscription_end.map(|d| d.to_string()),
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: a trainee is attached to at most one coach
    ///
    /// The unique index on trainee_id enforces this at the datastore; a hit
    /// here means the index was dropped or bypassed.
    async fn check_single_coach_per_trainee(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultiCoachRow> = sqlx::query_as(
            r#"
            SELECT trainee_id, COUNT(*) as coach_count
            FROM coach_trainees
            GROUP BY trainee_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| InvariantViolation {
                invariant: "single_coach_per_trainee".to_string(),
                user_ids: vec![row.trainee_id],
                description: format!("Trainee is attached to {} coaches", row.coach_count),
                context: serde_json::json!({
                    "trainee_id": row.trainee_id,
                    "coach_count": row.coach_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 4: assignment counts within tier capacity
    ///
    /// Low severity: the gate is advisory and applies to new assignments
    /// only, so a coach who downgraded tiers legitimately exceeds the limit.
    async fn check_capacity_overruns(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CoachLoadRow> = sqlx::query_as(
            r#"
            SELECT u.id as coach_id, u.subscription_tier, COUNT(ct.trainee_id) as trainee_count
            FROM users u
            JOIN coach_trainees ct ON ct.coach_id = u.id
            WHERE u.role = 'coach'
            GROUP BY u.id, u.subscription_tier
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter(|row| row.trainee_count > i64::from(tiers::capacity_of(&row.subscription_tier)))
            .map(|row| InvariantViolation {
                invariant: "capacity_overrun".to_string(),
                user_ids: vec![row.coach_id],
                description: format!(
                    "Coach holds {} trainees on the {} plan (limit {})",
                    row.trainee_count,
                    row.subscription_tier,
                    tiers::capacity_of(&row.subscription_tier)
                ),
                context: serde_json::json!({
                    "coach_id": row.coach_id,
                    "tier": row.subscription_tier,
                    "trainee_count": row.trainee_count,
                }),
                severity: ViolationSeverity::Low,
            })
            .collect())
    }
}
