use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::{PaymentTransition, Store, StoreError};
use crate::models::{Analysis, Payment, PaymentStatus, SubscriptionType, User};

const PAYMENT_COLUMNS: &str = "id, user_id, amount, status, description, order_id, \
    gateway_payment_id, subscription_type, valid_until, created_at, updated_at";

/// PostgreSQL-backed store. Owns the pool; `close` drains it on shutdown.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    status: String,
    description: String,
    order_id: Option<String>,
    gateway_payment_id: Option<String>,
    subscription_type: Option<String>,
    valid_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("payment status '{}'", row.status)))?;
        let subscription_type = match row.subscription_type.as_deref() {
            Some(raw) => Some(
                SubscriptionType::parse(raw)
                    .ok_or_else(|| StoreError::Corrupt(format!("subscription type '{raw}'")))?,
            ),
            None => None,
        };

        Ok(Payment {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            status,
            description: row.description,
            order_id: row.order_id,
            gateway_payment_id: row.gateway_payment_id,
            subscription_type,
            valid_until: row.valid_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Maps a unique-constraint violation to the field that clashed.
fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some("users_username_key") => StoreError::Duplicate("username"),
                _ => StoreError::Duplicate("email"),
            };
        }
    }
    StoreError::Sqlx(err)
}

#[async_trait]
impl Store for PgStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = $1 OR username = $2 LIMIT 1",
        )
        .bind(email)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, user_id, amount, status, description, order_id,
                 gateway_payment_id, subscription_type, valid_until, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.description)
        .bind(&payment.order_id)
        .bind(&payment.gateway_payment_id)
        .bind(payment.subscription_type.map(|s| s.as_str()))
        .bind(payment.valid_until)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 AND user_id = $2"
        ))
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn transition_payment(
        &self,
        transition: PaymentTransition<'_>,
    ) -> Result<Option<Payment>, StoreError> {
        // Single conditional UPDATE: a concurrent verify of the same payment
        // finds it no longer pending and matches nothing.
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payments
            SET status = $1,
                gateway_payment_id = COALESCE($2, gateway_payment_id),
                updated_at = $3
            WHERE id = $4 AND user_id = $5 AND order_id = $6 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(transition.to.as_str())
        .bind(transition.gateway_payment_id)
        .bind(transition.at)
        .bind(transition.payment_id)
        .bind(transition.user_id)
        .bind(transition.order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE user_id = $1
              AND status = 'successful'
              AND subscription_type = 'monthly'
              AND valid_until > $2
            ORDER BY valid_until DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, user_id, pdf_file_name, zip_file_name, target_tier,
                 analysis_text, report_url, payment_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(analysis.id)
        .bind(analysis.user_id)
        .bind(&analysis.pdf_file_name)
        .bind(&analysis.zip_file_name)
        .bind(&analysis.target_tier)
        .bind(&analysis.analysis_text)
        .bind(&analysis.report_url)
        .bind(analysis.payment_id)
        .bind(analysis.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_analyses(&self, user_id: Uuid) -> Result<Vec<Analysis>, StoreError> {
        let analyses = sqlx::query_as::<_, Analysis>(
            "SELECT * FROM analyses WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(analyses)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}
