use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::service::current_user;
use crate::auth::Session;
use crate::errors::AppError;
use crate::models::{Payment, PaymentStatus};
use crate::payments::gateway::{GatewayError, PaymentGateway};
use crate::store::{PaymentTransition, Store};

const DEFAULT_ORDER_DESCRIPTION: &str = "Document Analysis Subscription";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    /// Gateway order id.
    pub id: String,
    /// Minor units (paise).
    pub amount: i64,
    pub currency: &'static str,
    pub receipt: String,
    pub payment_id: Uuid,
    pub key_id: String,
}

/// Checkout callback payload. Field names follow the gateway widget.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
    #[serde(default, rename = "paymentId")]
    pub payment_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub has_active_subscription: bool,
    pub subscription: Option<Payment>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Option<i64>,
    pub status: Option<String>,
    pub description: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ────────────────────────────────────────────────────────────────────────────

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Mints a gateway order and stores the matching `pending` monthly payment.
pub async fn create_order(
    store: &dyn Store,
    gateway: &PaymentGateway,
    session: Session,
    request: CreateOrderRequest,
    now: DateTime<Utc>,
) -> Result<CreateOrderResponse, AppError> {
    let amount = request
        .amount
        .ok_or_else(|| AppError::Validation("Amount is required".to_string()))?;
    let order = gateway.create_order(amount, now)?;
    current_user(store, session).await?;

    let description =
        non_empty(request.description).unwrap_or_else(|| DEFAULT_ORDER_DESCRIPTION.to_string());
    let payment =
        Payment::pending_monthly(session.user_id, amount, description, order.id.clone(), now);
    store.insert_payment(&payment).await?;

    info!(
        "Created order {} for user {} (payment {})",
        order.id, session.user_id, payment.id
    );

    Ok(CreateOrderResponse {
        id: order.id,
        amount: order.amount,
        currency: order.currency,
        receipt: order.receipt,
        payment_id: payment.id,
        key_id: gateway.key_id().to_string(),
    })
}

/// Settles a pending payment from the checkout callback.
///
/// A valid signature moves the payment to `successful`; an invalid one moves
/// it to `failed`. Either way the payment must be the caller's, still pending,
/// and bound to the same order.
pub async fn verify(
    store: &dyn Store,
    gateway: &PaymentGateway,
    session: Session,
    request: VerifyRequest,
    now: DateTime<Utc>,
) -> Result<Payment, AppError> {
    let VerifyRequest {
        razorpay_order_id: order_id,
        razorpay_payment_id: gateway_payment_id,
        razorpay_signature: signature,
        payment_id,
    } = request;

    if [&order_id, &gateway_payment_id, &signature, &payment_id]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(AppError::Validation("Missing required fields".to_string()));
    }

    let not_found = || AppError::NotFound("Payment not found".to_string());
    let payment_id = Uuid::parse_str(payment_id.trim()).map_err(|_| not_found())?;

    let verdict = gateway.verify_signature(&order_id, &gateway_payment_id, &signature);
    let to = match verdict {
        Ok(()) => PaymentStatus::Successful,
        Err(_) => PaymentStatus::Failed,
    };

    let settled = store
        .transition_payment(PaymentTransition {
            payment_id,
            user_id: session.user_id,
            order_id: &order_id,
            to,
            gateway_payment_id: Some(&gateway_payment_id),
            at: now,
        })
        .await?;

    match (verdict, settled) {
        (Ok(()), Some(payment)) => {
            info!(
                "Payment {} verified for user {}, valid until {:?}",
                payment.id, session.user_id, payment.valid_until
            );
            Ok(payment)
        }
        (Err(GatewayError::InvalidSignature), settled) => {
            warn!(
                "Invalid signature for payment {payment_id} (user {}), marked failed: {}",
                session.user_id,
                settled.is_some()
            );
            Err(GatewayError::InvalidSignature.into())
        }
        (Err(other), _) => Err(other.into()),
        (Ok(()), None) => Err(not_found()),
    }
}

/// Evaluates the active-subscription predicate for the caller.
pub async fn check_active_subscription(
    store: &dyn Store,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<SubscriptionStatus, AppError> {
    let subscription = store.find_active_subscription(user_id, now).await?;
    Ok(SubscriptionStatus {
        has_active_subscription: subscription.is_some(),
        subscription,
    })
}

/// Stores a payment record with an explicit status, outside the gateway flow.
pub async fn record_payment(
    store: &dyn Store,
    session: Session,
    request: RecordPaymentRequest,
) -> Result<Payment, AppError> {
    let missing = || AppError::Validation("Missing required fields".to_string());

    let amount = request.amount.filter(|a| *a != 0).ok_or_else(missing)?;
    if amount < 0 {
        return Err(GatewayError::InvalidAmount.into());
    }
    let status = non_empty(request.status).ok_or_else(missing)?;
    let description = non_empty(request.description).ok_or_else(missing)?;
    let status = PaymentStatus::parse(&status)
        .ok_or_else(|| AppError::Validation(format!("Unknown payment status '{status}'")))?;
    current_user(store, session).await?;

    let payment = Payment::record(session.user_id, amount, status, description);
    store.insert_payment(&payment).await?;
    Ok(payment)
}

pub async fn list_payments(store: &dyn Store, session: Session) -> Result<Vec<Payment>, AppError> {
    Ok(store.list_payments(session.user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::SUBSCRIPTION_DAYS;
    use crate::models::User;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn gateway() -> PaymentGateway {
        PaymentGateway::new("rzp_test_key".into(), "test_secret")
    }

    /// A session backed by a stored account.
    async fn session(store: &MemoryStore) -> Session {
        let tag = Uuid::new_v4().simple().to_string();
        let user = User::new(tag.clone(), format!("{tag}@example.org"), "$argon2id$x".into());
        store.insert_user(&user).await.unwrap();
        Session { user_id: user.id }
    }

    async fn order(
        store: &MemoryStore,
        gw: &PaymentGateway,
        session: Session,
        now: DateTime<Utc>,
    ) -> CreateOrderResponse {
        create_order(
            store,
            gw,
            session,
            CreateOrderRequest {
                amount: Some(1),
                description: None,
            },
            now,
        )
        .await
        .unwrap()
    }

    fn signed(gw: &PaymentGateway, order: &CreateOrderResponse, pay_id: &str) -> VerifyRequest {
        VerifyRequest {
            razorpay_order_id: order.id.clone(),
            razorpay_payment_id: pay_id.to_string(),
            razorpay_signature: gw.sign(&order.id, pay_id),
            payment_id: order.payment_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_order_then_verify_activates_thirty_days() {
        let store = MemoryStore::new();
        let gw = gateway();
        let session = session(&store).await;
        let created_at = Utc::now();

        let order = order(&store, &gw, session, created_at).await;
        assert_eq!(order.amount, 100);
        assert_eq!(order.key_id, "rzp_test_key");

        let pending = store
            .find_payment(session.user_id, order.payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);
        assert_eq!(pending.description, DEFAULT_ORDER_DESCRIPTION);

        let before = check_active_subscription(&store, session.user_id, created_at)
            .await
            .unwrap();
        assert!(!before.has_active_subscription);

        let payment = verify(&store, &gw, session, signed(&gw, &order, "pay_1"), created_at)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Successful);
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(
            payment.valid_until,
            Some(created_at + Duration::days(SUBSCRIPTION_DAYS))
        );

        let after = check_active_subscription(&store, session.user_id, created_at)
            .await
            .unwrap();
        assert!(after.has_active_subscription);
        assert_eq!(after.subscription.unwrap().id, payment.id);
    }

    #[tokio::test]
    async fn test_subscription_lapses_after_window() {
        let store = MemoryStore::new();
        let gw = gateway();
        let session = session(&store).await;
        let created_at = Utc::now() - Duration::days(31);

        let order = order(&store, &gw, session, created_at).await;
        verify(&store, &gw, session, signed(&gw, &order, "pay_1"), created_at)
            .await
            .unwrap();

        let status = check_active_subscription(&store, session.user_id, Utc::now())
            .await
            .unwrap();
        assert!(!status.has_active_subscription);
        assert!(status.subscription.is_none());

        let at_boundary = created_at + Duration::days(SUBSCRIPTION_DAYS);
        let status = check_active_subscription(&store, session.user_id, at_boundary)
            .await
            .unwrap();
        assert!(!status.has_active_subscription);
    }

    #[tokio::test]
    async fn test_bad_signature_marks_failed() {
        let store = MemoryStore::new();
        let gw = gateway();
        let session = session(&store).await;
        let order = order(&store, &gw, session, Utc::now()).await;

        let mut request = signed(&gw, &order, "pay_1");
        request.razorpay_signature = "00".repeat(32);
        let err = verify(&store, &gw, session, request, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "Invalid payment signature"));

        let payment = store
            .find_payment(session.user_id, order.payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);

        // Failed is terminal: a correct signature afterwards cannot revive it.
        let err = verify(&store, &gw, session, signed(&gw, &order, "pay_1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_verify_is_not_found() {
        let store = MemoryStore::new();
        let gw = gateway();
        let session = session(&store).await;
        let order = order(&store, &gw, session, Utc::now()).await;

        verify(&store, &gw, session, signed(&gw, &order, "pay_1"), Utc::now())
            .await
            .unwrap();
        let err = verify(&store, &gw, session, signed(&gw, &order, "pay_1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_scoped_to_owner() {
        let store = MemoryStore::new();
        let gw = gateway();
        let owner = session(&store).await;
        let order = order(&store, &gw, owner, Utc::now()).await;

        let intruder = session(&store).await;
        let err = verify(&store, &gw, intruder, signed(&gw, &order, "pay_1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let payment = store
            .find_payment(owner.user_id, order.payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_verify_requires_every_field() {
        let store = MemoryStore::new();
        let gw = gateway();
        let session = session(&store).await;
        let order = order(&store, &gw, session, Utc::now()).await;

        let mut request = signed(&gw, &order, "pay_1");
        request.razorpay_payment_id = String::new();
        let err = verify(&store, &gw, session, request, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "Missing required fields"));
    }

    #[tokio::test]
    async fn test_create_order_requires_amount() {
        let store = MemoryStore::new();
        let err = create_order(
            &store,
            &gateway(),
            session(&store).await,
            CreateOrderRequest::default(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "Amount is required"));
    }

    #[tokio::test]
    async fn test_record_payment_validates_status() {
        let store = MemoryStore::new();
        let session = session(&store).await;

        let err = record_payment(
            &store,
            session,
            RecordPaymentRequest {
                amount: Some(1),
                status: Some("refunded".into()),
                description: Some("x".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let payment = record_payment(
            &store,
            session,
            RecordPaymentRequest {
                amount: Some(1),
                status: Some("successful".into()),
                description: Some("Document Analysis Service".into()),
            },
        )
        .await
        .unwrap();
        // A recorded payment carries no subscription window.
        assert!(payment.subscription_type.is_none());

        let listed = list_payments(&store, session).await.unwrap();
        assert_eq!(listed.len(), 1);
        let status = check_active_subscription(&store, session.user_id, Utc::now())
            .await
            .unwrap();
        assert!(!status.has_active_subscription);
    }

    #[tokio::test]
    async fn test_writes_reject_session_without_account() {
        let store = MemoryStore::new();
        let stray = Session {
            user_id: Uuid::new_v4(),
        };

        let err = create_order(
            &store,
            &gateway(),
            stray,
            CreateOrderRequest {
                amount: Some(1),
                description: None,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = record_payment(
            &store,
            stray,
            RecordPaymentRequest {
                amount: Some(1),
                status: Some("successful".into()),
                description: Some("Document Analysis Service".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(store.list_payments(stray.user_id).await.unwrap().is_empty());
    }
}
