use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PaymentTransition, Store, StoreError};
use crate::models::{Analysis, Payment, User};

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    payments: HashMap<Uuid, Payment>,
    analyses: HashMap<Uuid, Analysis>,
}

/// In-process store. Used when no database is configured and by tests.
/// Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for existing in inner.users.values() {
            if existing.email == user.email {
                return Err(StoreError::Duplicate("email"));
            }
            if existing.username == user.username {
                return Err(StoreError::Duplicate("username"));
            }
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .payments
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .get(&payment_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let inner = self.inner.read().await;
        let payments = inner
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(payments, |p| p.created_at))
    }

    async fn transition_payment(
        &self,
        transition: PaymentTransition<'_>,
    ) -> Result<Option<Payment>, StoreError> {
        // Check and write under one lock, mirroring the conditional UPDATE in Postgres.
        let mut inner = self.inner.write().await;
        let Some(payment) = inner.payments.get_mut(&transition.payment_id) else {
            return Ok(None);
        };
        if payment.user_id != transition.user_id
            || payment.order_id.as_deref() != Some(transition.order_id)
            || !payment.status.can_transition_to(transition.to)
        {
            return Ok(None);
        }

        payment.status = transition.to;
        if let Some(gateway_id) = transition.gateway_payment_id {
            payment.gateway_payment_id = Some(gateway_id.to_string());
        }
        payment.updated_at = Some(transition.at);
        Ok(Some(payment.clone()))
    }

    async fn find_active_subscription(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Payment>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.user_id == user_id && p.grants_subscription_at(now))
            .max_by_key(|p| p.valid_until)
            .cloned())
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .analyses
            .insert(analysis.id, analysis.clone());
        Ok(())
    }

    async fn list_analyses(&self, user_id: Uuid) -> Result<Vec<Analysis>, StoreError> {
        let inner = self.inner.read().await;
        let analyses = inner
            .analyses
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(analyses, |a| a.created_at))
    }
}
