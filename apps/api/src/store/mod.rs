//! Persistence layer for users, payments and analyses.
//!
//! `AppState` carries an `Arc<dyn Store>`, built once at startup:
//! `PgStore` when `DATABASE_URL` is set, `MemoryStore` otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Analysis, Payment, PaymentStatus, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A unique field (`email` or `username`) is already taken.
    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// A conditional status change for a single pending payment.
///
/// Applies only when the payment belongs to `user_id`, carries `order_id`
/// and is still `pending`. Anything else matches nothing.
#[derive(Debug, Clone)]
pub struct PaymentTransition<'a> {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub order_id: &'a str,
    pub to: PaymentStatus,
    pub gateway_payment_id: Option<&'a str>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for health reporting.
    fn kind(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Fails with `StoreError::Duplicate` when email or username is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// First user whose email or username matches.
    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn find_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// Newest first.
    async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Returns the updated payment, or `None` when no pending payment matched.
    async fn transition_payment(
        &self,
        transition: PaymentTransition<'_>,
    ) -> Result<Option<Payment>, StoreError>;

    /// A successful monthly payment whose window ends strictly after `now`.
    async fn find_active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Payment>, StoreError>;

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_analyses(&self, user_id: Uuid) -> Result<Vec<Analysis>, StoreError>;

    /// Releases connections. Called once on shutdown.
    async fn close(&self) {}
}
