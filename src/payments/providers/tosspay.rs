use crate::config::ConfigError;
use crate::payments::client::GatewayHttpClient;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    CancelAck, CancelPaymentRequest, CheckoutSession, InitializePaymentRequest,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Toss Payments configuration
#[derive(Debug, Clone)]
pub struct TossPayConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl TossPayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: env::var("TOSSPAY_SECRET_KEY")
                .map_err(|_| ConfigError::MissingVariable("TOSSPAY_SECRET_KEY".to_string()))?,
            base_url: env::var("TOSSPAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.tosspayments.com".to_string()),
            timeout_secs: env::var("TOSSPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_retries: env::var("TOSSPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TossCheckoutData {
    payment_id: String,
    payment_key: String,
    order_id: String,
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TossCancelData {
    transaction_key: Option<String>,
    cancel_amount: i64,
}

/// Toss Payments gateway adapter
pub struct TossPayGateway {
    config: TossPayConfig,
    client: GatewayHttpClient,
}

impl TossPayGateway {
    pub fn new(config: TossPayConfig) -> GatewayResult<Self> {
        let client = GatewayHttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, client })
    }

    fn order_id(request: &InitializePaymentRequest) -> String {
        // Gateway-unique order id; a retried initialize opens a fresh order
        format!(
            "rsv-{}-{}-{}",
            request.reservation_id,
            request.stage.as_str(),
            Uuid::new_v4().simple()
        )
    }
}

#[async_trait]
impl PaymentGateway for TossPayGateway {
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> GatewayResult<CheckoutSession> {
        request.validate()?;

        let order_id = Self::order_id(&request);
        let mut payload = json!({
            "orderId": order_id,
            "orderName": request.order_name,
            "amount": request.amount,
            "customerName": request.customer.name,
            "customerEmail": request.customer.email,
            "customerMobilePhone": request.customer.phone,
        });
        if let Some(metadata) = &request.metadata {
            payload["metadata"] = metadata.clone();
        }

        let url = format!("{}/v1/payments", self.config.base_url);
        let data: TossCheckoutData = self
            .client
            .request_json(
                reqwest::Method::POST,
                &url,
                Some(&self.config.secret_key),
                Some(&payload),
                &[],
            )
            .await?;

        info!(
            reservation_id = %request.reservation_id,
            stage = %request.stage,
            order_id = %data.order_id,
            amount = request.amount,
            "opened checkout session"
        );

        Ok(CheckoutSession {
            payment_id: data.payment_id,
            payment_key: data.payment_key,
            order_id: data.order_id,
            checkout_url: data.checkout_url,
            amount: request.amount,
            stage: request.stage,
        })
    }

    async fn cancel_payment(&self, request: CancelPaymentRequest) -> GatewayResult<CancelAck> {
        if request.amount <= 0 {
            return Err(GatewayError::ValidationError {
                message: "cancel amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let payload = json!({
            "cancelReason": request.reason,
            "cancelAmount": request.amount,
        });

        // The gateway deduplicates cancels by payment key, which keeps queue
        // retries from double-refunding.
        let idempotency_key = format!("cancel-{}", request.payment_key);
        let url = format!(
            "{}/v1/payments/{}/cancel",
            self.config.base_url, request.payment_key
        );
        let data: TossCancelData = self
            .client
            .request_json(
                reqwest::Method::POST,
                &url,
                Some(&self.config.secret_key),
                Some(&payload),
                &[("Idempotency-Key", idempotency_key.as_str())],
            )
            .await?;

        info!(
            payment_key = %request.payment_key,
            cancelled_amount = data.cancel_amount,
            "gateway cancel acknowledged"
        );

        Ok(CancelAck {
            transaction_id: data.transaction_key,
            cancelled_amount: data.cancel_amount,
        })
    }

    fn name(&self) -> &'static str {
        "tosspay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CustomerContact, PaymentStage};

    fn test_config() -> TossPayConfig {
        TossPayConfig {
            secret_key: "test_sk".to_string(),
            base_url: "https://api.tosspayments.com".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn order_ids_embed_reservation_and_stage() {
        let request = InitializePaymentRequest {
            reservation_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            amount: 25_000,
            stage: PaymentStage::Deposit,
            order_name: "deposit".to_string(),
            customer: CustomerContact::default(),
            metadata: None,
        };
        let order_id = TossPayGateway::order_id(&request);
        assert!(order_id.starts_with(&format!("rsv-{}-deposit-", Uuid::nil())));
    }

    #[test]
    fn order_ids_are_unique_per_attempt() {
        let request = InitializePaymentRequest {
            reservation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: 75_000,
            stage: PaymentStage::Final,
            order_name: "final payment".to_string(),
            customer: CustomerContact::default(),
            metadata: None,
        };
        assert_ne!(
            TossPayGateway::order_id(&request),
            TossPayGateway::order_id(&request)
        );
    }

    #[tokio::test]
    async fn cancel_rejects_non_positive_amount() {
        let gateway = TossPayGateway::new(test_config()).expect("client should build");
        let result = gateway
            .cancel_payment(CancelPaymentRequest {
                payment_key: "key".to_string(),
                reason: "test".to_string(),
                amount: 0,
            })
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::ValidationError { .. })
        ));
    }
}
