//! Razorpay payment bridge
//!
//! Orders are created and read through the provider's REST API. Checkout
//! signatures are `HMAC_SHA256(key_secret, "<order_id>|<payment_id>")` in
//! lowercase hex.

use std::{env, sync::Arc, time::Duration};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{DomainError, DomainResult},
    ledger::{Ledger, validate_amount},
    models::{Transaction, TransactionKind, transaction::reference},
    store::{LedgerStore, Store},
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";

/// Configuration for the Razorpay client
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl RazorpayConfig {
    /// Load from RAZORPAY_KEY_ID, RAZORPAY_KEY_SECRET and RAZORPAY_BASE_URL
    pub fn from_env() -> DomainResult<Self> {
        let key_id = env::var("RAZORPAY_KEY_ID")
            .map_err(|_| DomainError::Validation("RAZORPAY_KEY_ID is not set".to_string()))?;
        let key_secret = env::var("RAZORPAY_KEY_SECRET")
            .map_err(|_| DomainError::Validation("RAZORPAY_KEY_SECRET is not set".to_string()))?;
        let base_url = env::var("RAZORPAY_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            key_id,
            key_secret,
            base_url,
            timeout: Duration::from_secs(10),
        })
    }
}

/// Provider-held order. Amounts are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Order as returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub receipt: String,
    pub key_id: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

/// Payment provider operations
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> DomainResult<ProviderOrder>;

    async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder>;

    fn key_id(&self) -> &str;

    fn key_secret(&self) -> &str;
}

/// Gateway talking to the Razorpay REST API
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::Upstream(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn read_order(&self, response: reqwest::Response) -> DomainResult<ProviderOrder> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Razorpay request failed");
            return Err(DomainError::Upstream(format!(
                "provider returned {}",
                status
            )));
        }

        response
            .json::<ProviderOrder>()
            .await
            .map_err(|e| DomainError::Upstream(format!("unreadable provider response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> DomainResult<ProviderOrder> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.config.base_url))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&CreateOrderRequest {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(|e| DomainError::Upstream(e.to_string()))?;

        self.read_order(response).await
    }

    async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder> {
        let response = self
            .client
            .get(format!("{}/v1/orders/{}", self.config.base_url, order_id))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await
            .map_err(|e| DomainError::Upstream(e.to_string()))?;

        self.read_order(response).await
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    fn key_secret(&self) -> &str {
        &self.config.key_secret
    }
}

/// Hex HMAC-SHA256 of `"<order_id>|<payment_id>"`
pub fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
    new_mac(secret, order_id, payment_id)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

fn new_mac(
    secret: &str,
    order_id: &str,
    payment_id: &str,
) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(mac)
}

/// Check a checkout signature in constant time.
///
/// Only 64 lowercase hex characters are accepted, so every single-bit
/// change to a valid signature is rejected.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    if signature.len() != 64
        || !signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }

    let (Ok(expected), Ok(mac)) = (hex::decode(signature), new_mac(secret, order_id, payment_id))
    else {
        return false;
    };

    mac.verify_slice(&expected).is_ok()
}

/// Convert a decimal amount to the provider's minor unit (paise)
pub fn to_minor_units(amount: Decimal) -> DomainResult<i64> {
    validate_amount(amount)?;
    (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| DomainError::Validation("amount is too large".to_string()))
}

pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

/// Checkout result posted back by the client
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutResult {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Creates orders and turns verified payments into wallet credits
#[derive(Clone)]
pub struct PaymentBridge {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Ledger,
    store: Arc<dyn Store>,
}

impl PaymentBridge {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn Store>) -> Self {
        Self {
            gateway,
            ledger: Ledger::new(store.clone()),
            store,
        }
    }

    pub async fn create_order(
        &self,
        amount: Decimal,
        currency: Option<&str>,
        receipt: Option<String>,
    ) -> DomainResult<PaymentOrder> {
        let minor = to_minor_units(amount)?;
        let currency = currency.unwrap_or(DEFAULT_CURRENCY);
        let receipt = receipt.unwrap_or_else(|| format!("rcpt_{}", Uuid::new_v4().simple()));

        let order = self.gateway.create_order(minor, currency, &receipt).await?;
        info!(order_id = %order.id, amount = %amount, "Payment order created");

        Ok(PaymentOrder {
            order_id: order.id,
            amount: from_minor_units(order.amount),
            currency: order.currency,
            receipt: order.receipt.unwrap_or(receipt),
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Verify a checkout and credit `user_id` with the amount the provider
    /// holds for the order. Verifying the same payment again returns the
    /// existing entry.
    pub async fn verify(&self, user_id: Uuid, checkout: &CheckoutResult) -> DomainResult<Transaction> {
        if !verify_signature(
            self.gateway.key_secret(),
            &checkout.razorpay_order_id,
            &checkout.razorpay_payment_id,
            &checkout.razorpay_signature,
        ) {
            warn!(
                order_id = %checkout.razorpay_order_id,
                "Rejected payment with bad signature"
            );
            return Err(DomainError::SignatureMismatch);
        }

        let reference = reference::provider_payment(&checkout.razorpay_payment_id);
        if let Some(existing) = self.store.find_transaction_by_reference(&reference).await? {
            if existing.user_id != Some(user_id) {
                return Err(DomainError::Conflict(
                    "payment already recorded".to_string(),
                ));
            }
            return Ok(existing);
        }

        let order = self.gateway.fetch_order(&checkout.razorpay_order_id).await?;
        let amount = from_minor_units(order.amount);
        if validate_amount(amount).is_err() {
            warn!(order_id = %order.id, amount = order.amount, "Provider order amount out of range");
            return Err(DomainError::Upstream(format!(
                "order {} has an unusable amount",
                order.id
            )));
        }

        match self
            .ledger
            .credit(user_id, amount, TransactionKind::Payment, "razorpay", reference.clone(), None)
            .await
        {
            Ok(tx) => Ok(tx),
            // A concurrent verification won the race
            Err(DomainError::Conflict(_)) => self
                .store
                .find_transaction_by_reference(&reference)
                .await?
                .ok_or_else(|| DomainError::Conflict("payment already recorded".to_string())),
            Err(e) => Err(e),
        }
    }
}

/// In-process gateway for tests
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use tokio::sync::Mutex;

    pub const TEST_KEY_ID: &str = "rzp_test_key";
    pub const TEST_KEY_SECRET: &str = "rzp_test_secret";

    /// Gateway holding orders in memory
    #[derive(Default)]
    pub struct FakeGateway {
        orders: Mutex<Vec<ProviderOrder>>,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_order(
            &self,
            amount_minor: i64,
            currency: &str,
            receipt: &str,
        ) -> DomainResult<ProviderOrder> {
            let mut orders = self.orders.lock().await;
            let order = ProviderOrder {
                id: format!("order_{}", orders.len() + 1),
                amount: amount_minor,
                currency: currency.to_string(),
                receipt: Some(receipt.to_string()),
                status: Some("created".to_string()),
            };
            orders.push(order.clone());
            Ok(order)
        }

        async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder> {
            self.orders
                .lock()
                .await
                .iter()
                .find(|o| o.id == order_id)
                .cloned()
                .ok_or_else(|| DomainError::Upstream("no such order".to_string()))
        }

        fn key_id(&self) -> &str {
            TEST_KEY_ID
        }

        fn key_secret(&self) -> &str {
            TEST_KEY_SECRET
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeGateway, TEST_KEY_SECRET};
    use super::*;
    use crate::models::{NewUser, Role};
    use crate::store::{LedgerStore, MemoryStore, UserStore};

    const SECRET: &str = TEST_KEY_SECRET;

    #[test]
    fn test_signature_matches_known_vector() {
        let signature = sign(SECRET, "order_1", "pay_1");
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(SECRET, "order_1", "pay_1", &signature));
        assert!(!verify_signature("other", "order_1", "pay_1", &signature));
        assert!(!verify_signature(SECRET, "order_1", "pay_2", &signature));
    }

    #[test]
    fn test_every_single_bit_mutation_fails() {
        let signature = sign(SECRET, "order_9", "pay_9");

        for i in 0..signature.len() {
            for bit in 0..8 {
                let mut bytes = signature.clone().into_bytes();
                bytes[i] ^= 1 << bit;
                let mutated = String::from_utf8_lossy(&bytes).into_owned();
                assert!(
                    !verify_signature(SECRET, "order_9", "pay_9", &mutated),
                    "byte {} bit {}",
                    i,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_malformed_signatures_fail() {
        let signature = sign(SECRET, "order_1", "pay_1");
        assert!(!verify_signature(SECRET, "order_1", "pay_1", ""));
        assert!(!verify_signature(SECRET, "order_1", "pay_1", &signature[..62]));
        assert!(!verify_signature(
            SECRET,
            "order_1",
            "pay_1",
            &signature.to_uppercase()
        ));
    }

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(to_minor_units("599".parse().unwrap()).unwrap(), 59900);
        assert_eq!(to_minor_units("0.01".parse().unwrap()).unwrap(), 1);
        assert!(to_minor_units(Decimal::ZERO).is_err());
        assert!(to_minor_units("1.001".parse().unwrap()).is_err());
        assert!(to_minor_units("10000000000".parse().unwrap()).is_err());
        assert_eq!(from_minor_units(11980), "119.80".parse::<Decimal>().unwrap());
    }

    #[tokio::test]
    async fn test_verified_payment_credits_provider_amount_once() {
        let store = Arc::new(MemoryStore::new());
        let bridge = PaymentBridge::new(Arc::new(FakeGateway::default()), store.clone());
        let user = store
            .insert_user(
                NewUser {
                    name: "Asha".to_string(),
                    email: "asha@example.com".to_string(),
                    password_hash: "x".to_string(),
                    role: Role::Customer,
                    phone: None,
                },
                None,
            )
            .await
            .unwrap();

        let order = bridge
            .create_order("750".parse().unwrap(), None, None)
            .await
            .unwrap();
        assert_eq!(order.currency, "INR");
        assert_eq!(order.amount, "750".parse::<Decimal>().unwrap());

        let checkout = CheckoutResult {
            razorpay_order_id: order.order_id.clone(),
            razorpay_payment_id: "pay_42".to_string(),
            razorpay_signature: sign(SECRET, &order.order_id, "pay_42"),
        };

        let first = bridge.verify(user.id, &checkout).await.unwrap();
        let again = bridge.verify(user.id, &checkout).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(
            store.wallet_balance(user.id).await.unwrap(),
            "750".parse::<Decimal>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_bad_signature_credits_nothing() {
        let store = Arc::new(MemoryStore::new());
        let bridge = PaymentBridge::new(Arc::new(FakeGateway::default()), store.clone());
        let user = store
            .insert_user(
                NewUser {
                    name: "Asha".to_string(),
                    email: "asha@example.com".to_string(),
                    password_hash: "x".to_string(),
                    role: Role::Customer,
                    phone: None,
                },
                None,
            )
            .await
            .unwrap();
        let order = bridge
            .create_order("100".parse().unwrap(), None, None)
            .await
            .unwrap();

        let checkout = CheckoutResult {
            razorpay_order_id: order.order_id.clone(),
            razorpay_payment_id: "pay_1".to_string(),
            razorpay_signature: sign("wrong-secret", &order.order_id, "pay_1"),
        };

        assert!(matches!(
            bridge.verify(user.id, &checkout).await,
            Err(DomainError::SignatureMismatch)
        ));
        assert_eq!(store.wallet_balance(user.id).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_oversized_provider_order_credits_nothing() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let bridge = PaymentBridge::new(gateway.clone(), store.clone());
        let user = store
            .insert_user(
                NewUser {
                    name: "Asha".to_string(),
                    email: "asha@example.com".to_string(),
                    password_hash: "x".to_string(),
                    role: Role::Customer,
                    phone: None,
                },
                None,
            )
            .await
            .unwrap();

        // 10^10 rupees in paise, one past what a wallet column holds
        let order = gateway
            .create_order(1_000_000_000_000, "INR", "receipt_big")
            .await
            .unwrap();
        let checkout = CheckoutResult {
            razorpay_order_id: order.id.clone(),
            razorpay_payment_id: "pay_big".to_string(),
            razorpay_signature: sign(SECRET, &order.id, "pay_big"),
        };

        assert!(matches!(
            bridge.verify(user.id, &checkout).await,
            Err(DomainError::Upstream(_))
        ));
        assert_eq!(store.wallet_balance(user.id).await.unwrap(), Decimal::ZERO);
    }
}
