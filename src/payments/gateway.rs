use crate::payments::error::GatewayResult;
use crate::payments::types::{
    CancelAck, CancelPaymentRequest, CheckoutSession, InitializePaymentRequest,
};
use async_trait::async_trait;

/// External payment gateway contract.
///
/// `cancel_payment` must be idempotent per payment key so that queue retries
/// after a partial failure never double-refund.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_payment(
        &self,
        request: InitializePaymentRequest,
    ) -> GatewayResult<CheckoutSession>;

    async fn cancel_payment(&self, request: CancelPaymentRequest) -> GatewayResult<CancelAck>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{CustomerContact, PaymentStage};
    use uuid::Uuid;

    struct MockGateway;

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn initialize_payment(
            &self,
            request: InitializePaymentRequest,
        ) -> GatewayResult<CheckoutSession> {
            request.validate()?;
            Ok(CheckoutSession {
                payment_id: "pay_mock".to_string(),
                payment_key: "key_mock".to_string(),
                order_id: format!("order_{}", request.reservation_id),
                checkout_url: "https://example.com/checkout".to_string(),
                amount: request.amount,
                stage: request.stage,
            })
        }

        async fn cancel_payment(&self, request: CancelPaymentRequest) -> GatewayResult<CancelAck> {
            Ok(CancelAck {
                transaction_id: Some(format!("cancel_{}", request.payment_key)),
                cancelled_amount: request.amount,
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn PaymentGateway> = Box::new(MockGateway);

        let session = gateway
            .initialize_payment(InitializePaymentRequest {
                reservation_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                amount: 25_000,
                stage: PaymentStage::Deposit,
                order_name: "reservation deposit".to_string(),
                customer: CustomerContact {
                    name: Some("Test".to_string()),
                    email: Some("test@example.com".to_string()),
                    phone: None,
                },
                metadata: None,
            })
            .await
            .expect("checkout should open");
        assert_eq!(session.amount, 25_000);
        assert_eq!(session.stage, PaymentStage::Deposit);

        let ack = gateway
            .cancel_payment(CancelPaymentRequest {
                payment_key: "key_mock".to_string(),
                reason: "customer cancellation".to_string(),
                amount: 25_000,
            })
            .await
            .expect("cancel should ack");
        assert_eq!(ack.cancelled_amount, 25_000);
        assert!(ack.transaction_id.is_some());
    }
}
