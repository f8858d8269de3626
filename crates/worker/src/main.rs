//! CoachDesk Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription expiry sweep: downgrade lapsed subscriptions and send
//!   3-day / 1-day renewal reminders (daily at 2:00 AM UTC)
//! - Subscription invariant checks (daily at 3:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)
//!
//! The sweep must run at most once per calendar day: reminder matching is
//! date-only with no dedup guard, so a second run on the same day would
//! double-send.

use std::sync::Arc;
use std::time::Duration;

use coachdesk_billing::BillingService;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting CoachDesk Worker");

    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = coachdesk_shared::create_pool(&database_url).await?;
    coachdesk_shared::run_migrations(&pool).await?;

    let billing = Arc::new(BillingService::new(pool));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription expiry sweep (daily at 2:00 AM UTC)
    // Downgrades lapsed subscriptions and sends 3-day / 1-day reminders.
    let sweeper = billing.sweeper.clone();
    scheduler
        .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                info!("Running daily subscription expiry sweep");
                match sweeper.run_daily().await {
                    Ok(summary) => info!(
                        downgraded = summary.downgraded,
                        reminders_3d = summary.reminders_3d,
                        reminders_1d = summary.reminders_1d,
                        "Expiry sweep cycle complete"
                    ),
                    Err(e) => error!(error = %e, "Expiry sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription expiry sweep (daily at 2:00 AM UTC)");

    // Job 2: Subscription invariant checks (daily at 3:00 AM UTC)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                info!("Running subscription invariant checks");
                match billing.invariants.run_all_checks().await {
                    Ok(summary) if summary.healthy => info!(
                        checks_run = summary.checks_run,
                        "Invariant checks passed"
                    ),
                    Ok(summary) => {
                        for violation in &summary.violations {
                            warn!(
                                invariant = %violation.invariant,
                                severity = %violation.severity,
                                description = %violation.description,
                                "Invariant violation"
                            );
                        }
                        warn!(
                            checks_failed = summary.checks_failed,
                            violations = summary.violations.len(),
                            "Invariant checks found violations"
                        );
                    }
                    Err(e) => error!(error = %e, "Invariant checks failed to run"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription invariant checks (daily at 3:00 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("CoachDesk Worker started successfully with 3 scheduled jobs");

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
