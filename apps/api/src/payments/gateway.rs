//! Razorpay-style gateway: order minting and payment signature verification.
//!
//! Orders are minted locally; the checkout widget runs client-side and hands
//! back `(order_id, payment_id, signature)`, where the signature is
//! `hex(HMAC-SHA256(key_secret, "<order_id>|<payment_id>"))`.

use chrono::{DateTime, Utc};
use ring::hmac;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const CURRENCY: &str = "INR";
/// Paise per rupee.
const MINOR_UNITS: i64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("invalid payment signature")]
    InvalidSignature,

    #[error("amount must be a positive number")]
    InvalidAmount,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor units (paise).
    pub amount: i64,
    pub currency: &'static str,
    pub receipt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PaymentGateway {
    key_id: String,
    key: hmac::Key,
}

impl PaymentGateway {
    pub fn new(key_id: String, key_secret: &str) -> Self {
        Self {
            key_id,
            key: hmac::Key::new(hmac::HMAC_SHA256, key_secret.as_bytes()),
        }
    }

    /// Public key id handed to the checkout widget.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Mints an order for `amount` whole rupees.
    pub fn create_order(
        &self,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<GatewayOrder, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::InvalidAmount);
        }
        let minor = amount
            .checked_mul(MINOR_UNITS)
            .ok_or(GatewayError::InvalidAmount)?;
        let suffix = Uuid::new_v4().simple().to_string();

        Ok(GatewayOrder {
            id: format!("order_{}", &suffix[..14]),
            amount: minor,
            currency: CURRENCY,
            receipt: format!("receipt_{}", now.timestamp_millis()),
            created_at: now,
        })
    }

    /// Signature the gateway issues for a completed payment.
    #[cfg(test)]
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        let tag = hmac::sign(&self.key, format!("{order_id}|{payment_id}").as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Constant-time check of a checkout signature.
    pub fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), GatewayError> {
        let expected = hex::decode(signature.trim()).map_err(|_| GatewayError::InvalidSignature)?;
        hmac::verify(
            &self.key,
            format!("{order_id}|{payment_id}").as_bytes(),
            &expected,
        )
        .map_err(|_| GatewayError::InvalidSignature)
    }
}
