pub mod notification;
pub mod payment_orchestrator;
pub mod refund_eligibility;
pub mod refund_policy;
pub mod refund_processor;
