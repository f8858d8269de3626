//! Billing error types
//!
//! Rejections and conflicts carry human-readable messages sufficient to
//! render directly; datastore failures surface as a generic server-side
//! failure without leaking internal detail beyond a message string.

use thiserror::Error;

/// Errors surfaced by the billing core
#[derive(Debug, Error)]
pub enum BillingError {
    /// Bad input (tier id, status value, duration code, date string),
    /// rejected before any mutation
    #[error("{0}")]
    Validation(String),

    /// Trainee capacity gate rejection; carries enough context for the
    /// caller to render an upgrade prompt
    #[error("Trainee limit reached: {current_count} of {max_allowed} on the {tier} plan")]
    CapacityExceeded {
        current_count: i64,
        max_allowed: u32,
        tier: String,
    },

    /// The requested relation already exists (trainee attached to a coach)
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Datastore failure; the triggering unit of work was rolled back
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
