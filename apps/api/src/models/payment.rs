use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a monthly subscription window.
pub const SUBSCRIPTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(PaymentStatus::Pending),
            "successful" => Some(PaymentStatus::Successful),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    /// Only `pending` payments may move; both settled states are terminal.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Successful)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Monthly,
    Yearly,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Monthly => "monthly",
            SubscriptionType::Yearly => "yearly",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "monthly" => Some(SubscriptionType::Monthly),
            "yearly" => Some(SubscriptionType::Yearly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Whole rupees.
    pub amount: i64,
    pub status: PaymentStatus,
    pub description: String,
    pub order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub subscription_type: Option<SubscriptionType>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// A manually recorded payment with no gateway order attached.
    pub fn record(user_id: Uuid, amount: i64, status: PaymentStatus, description: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            status,
            description,
            order_id: None,
            gateway_payment_id: None,
            subscription_type: None,
            valid_until: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// A pending monthly subscription payment awaiting gateway confirmation.
    /// The validity window is tentative until the payment is verified.
    pub fn pending_monthly(
        user_id: Uuid,
        amount: i64,
        description: String,
        order_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            status: PaymentStatus::Pending,
            description,
            order_id: Some(order_id),
            gateway_payment_id: None,
            subscription_type: Some(SubscriptionType::Monthly),
            valid_until: Some(now + Duration::days(SUBSCRIPTION_DAYS)),
            created_at: now,
            updated_at: None,
        }
    }

    /// True when this record alone satisfies the active-subscription predicate.
    pub fn grants_subscription_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Successful
            && self.subscription_type == Some(SubscriptionType::Monthly)
            && self.valid_until.is_some_and(|until| until > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_transitions() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Successful));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Successful.can_transition_to(Failed));
        assert!(!Successful.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Successful));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_pending_monthly_window_is_thirty_days() {
        let now = Utc::now();
        let payment =
            Payment::pending_monthly(Uuid::new_v4(), 1, "sub".into(), "order_1".into(), now);
        assert_eq!(payment.valid_until, Some(now + Duration::days(30)));
        assert_eq!(payment.status, PaymentStatus::Pending);
        // Pending never grants access, even inside the window.
        assert!(!payment.grants_subscription_at(now));
    }

    #[test]
    fn test_grant_requires_window_strictly_in_future() {
        let now = Utc::now();
        let mut payment =
            Payment::pending_monthly(Uuid::new_v4(), 1, "sub".into(), "order_1".into(), now);
        payment.status = PaymentStatus::Successful;

        assert!(payment.grants_subscription_at(now + Duration::days(29)));
        assert!(!payment.grants_subscription_at(now + Duration::days(30)));
        assert!(!payment.grants_subscription_at(now + Duration::days(31)));
    }

    #[test]
    fn test_yearly_does_not_grant_monthly_access() {
        let now = Utc::now();
        let mut payment =
            Payment::pending_monthly(Uuid::new_v4(), 1, "sub".into(), "order_1".into(), now);
        payment.status = PaymentStatus::Successful;
        payment.subscription_type = Some(SubscriptionType::Yearly);
        assert!(!payment.grants_subscription_at(now));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(PaymentStatus::Successful).unwrap(),
            "successful"
        );
        assert_eq!(PaymentStatus::parse("failed"), Some(PaymentStatus::Failed));
        assert_eq!(PaymentStatus::parse("refunded"), None);
    }
}
