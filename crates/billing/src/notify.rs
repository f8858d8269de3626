//! Notification sink
//!
//! Fire-and-forget: callers never observe the result. Failed inserts are
//! logged and swallowed so a notification outage can never fail the
//! operation that triggered it.

use sqlx::PgPool;
use uuid::Uuid;

/// Notification kind discriminators stored with each row
pub const KIND_SUBSCRIPTION_EXPIRED: &str = "subscription_expired";
pub const KIND_RENEWAL_REMINDER: &str = "renewal_reminder";

#[derive(Clone)]
pub struct NotificationSink {
    pool: PgPool,
}

impl NotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Queue a notification for a user
    pub async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        kind: &str,
        related_id: Option<Uuid>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, message, kind, related_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(kind)
        .bind(related_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                user_id = %user_id,
                kind = kind,
                error = %e,
                "Failed to queue notification"
            );
        }
    }
}
